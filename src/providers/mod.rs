//! Provider adapter surface.
//!
//! Real per-cloud billing adapters live outside the core and are supplied
//! through the `AdapterFactory` port. This module defines the raw record
//! shape every adapter returns and ships the file-backed fixture adapter
//! used by the CLI demo path and the integration tests.

pub mod fixture;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use fixture::{FixtureAdapter, FixtureAdapterFactory};

/// One raw cost record as returned by a provider's billing API.
///
/// Provider-agnostic: the collection orchestrator stamps tenant, account,
/// and provider in when normalizing to a ledger line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCostRecord {
    pub date: NaiveDate,
    pub service: String,
    pub amount: f64,
    pub currency: String,
    pub usage_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}
