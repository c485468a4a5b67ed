//! Test utilities for cape.
//!
//! Shared factories and capture helpers for unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cape::test_utils::*;
//!
//! let items = daily_items("2026-02-01", 28, "Amazon EC2", 5.0, Some("i-1"));
//! let sink = CapturingSink::default();
//! ```

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{Duration, NaiveDate};

use crate::core::events::{DomainEvent, EventSink};
use crate::core::models::{
    AccountStatus, CloudAccount, CostLineItem, DateRange, EncryptedBlob, ProviderCredentials,
};
use crate::core::provider::CloudProvider;
use crate::core::vault::LocalVault;

// =============================================================================
// Event Capture
// =============================================================================

/// Event sink that records every emitted event for assertions.
#[derive(Default)]
pub struct CapturingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl CapturingSink {
    /// Snapshot of the captured events.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for CapturingSink {
    fn emit(&self, event: &DomainEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// =============================================================================
// Data Factories
// =============================================================================

/// Parse a `YYYY-MM-DD` date.
///
/// # Panics
/// Panics on malformed input.
#[must_use]
pub fn date(s: &str) -> NaiveDate {
    s.parse().expect("valid test date")
}

/// A window of `days` days ending on `end` inclusive.
///
/// # Panics
/// Panics on malformed input.
#[must_use]
pub fn window_ending(end: &str, days: u32) -> DateRange {
    DateRange::last_days(date(end), days)
}

/// One AWS cost line item for tenant `t1`, account `a1`.
///
/// # Panics
/// Panics on a malformed date.
#[must_use]
pub fn line_item(
    item_date: &str,
    service: &str,
    amount: f64,
    resource_id: Option<&str>,
) -> CostLineItem {
    CostLineItem {
        tenant_id: "t1".to_string(),
        account_id: "a1".to_string(),
        date: date(item_date),
        provider: CloudProvider::Aws,
        service: service.to_string(),
        usage_type: "BoxUsage".to_string(),
        amount,
        currency: "USD".to_string(),
        resource_id: resource_id.map(String::from),
        tags: BTreeMap::new(),
        metadata: serde_json::Map::new(),
    }
}

/// `days` consecutive daily line items starting at `start`.
///
/// # Panics
/// Panics on a malformed start date.
#[must_use]
pub fn daily_items(
    start: &str,
    days: u32,
    service: &str,
    amount_per_day: f64,
    resource_id: Option<&str>,
) -> Vec<CostLineItem> {
    let first = date(start);
    (0..days)
        .map(|offset| {
            let mut item = line_item(start, service, amount_per_day, resource_id);
            item.date = first + Duration::days(i64::from(offset));
            item
        })
        .collect()
}

/// A registered active account with credentials sealed by `vault`.
///
/// # Panics
/// Panics if sealing fails.
#[must_use]
pub fn test_account(
    id: &str,
    tenant_id: &str,
    provider: &str,
    vault: &LocalVault,
    credentials: &ProviderCredentials,
) -> CloudAccount {
    CloudAccount {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        provider: provider.to_string(),
        status: AccountStatus::Active,
        last_synced_at: None,
        credentials: vault.seal(credentials).expect("seal test credentials"),
    }
}

/// An opaque blob that no vault can decrypt, for failure-path tests.
#[must_use]
pub fn garbage_blob() -> EncryptedBlob {
    EncryptedBlob {
        ciphertext: "bm90LXJlYWwtY2lwaGVydGV4dA==".to_string(),
        iv: "bm90LWFuLWl2".to_string(),
        auth_tag: "bm90LWEtdGFn".to_string(),
    }
}
