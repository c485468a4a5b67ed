//! Utility functions.

pub mod format;

pub use format::{format_cost, format_percent};
