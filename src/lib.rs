//! cape - Cost Analytics & Pattern Engine
//!
//! Ingests cloud-spend line items from multiple providers into a canonical,
//! deduplicated cost ledger, flags per-service spend anomalies against
//! trailing baselines, and mines the ledger for per-resource savings
//! recommendations with dedup/merge semantics.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{CapeError, ExitCode, Result};
