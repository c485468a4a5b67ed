//! Engine core: canonical models, ports, and the three analysis pipelines.

pub mod baseline;
pub mod collector;
pub mod config;
pub mod events;
pub mod logging;
pub mod models;
pub mod patterns;
pub mod ports;
pub mod pricing;
pub mod provider;
pub mod reconcile;
pub mod vault;

pub use baseline::BaselineAnalyzer;
pub use collector::Collector;
pub use config::EngineConfig;
pub use patterns::PatternAnalyzer;
pub use reconcile::ReconcileEngine;
