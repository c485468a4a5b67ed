//! External collaborator interfaces.
//!
//! The engine is composed against these ports; concrete adapters (per-cloud
//! billing clients, the production vault, the SQLite store) are wired in at
//! the call site. Every store handle must be shareable across concurrent
//! per-account invocations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::core::models::{
    Anomaly, CloudAccount, CostLineItem, DateRange, EncryptedBlob, Priority, ProviderCredentials,
    Recommendation, RecommendationKind, ServiceDailyTotal,
};
use crate::core::provider::CloudProvider;
use crate::error::Result;
use crate::providers::RawCostRecord;

// =============================================================================
// Provider Adapter
// =============================================================================

/// Per-cloud billing client. Implemented once per provider, outside the core.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Check the credentials against the provider without fetching data.
    async fn validate_credentials(&self) -> Result<bool>;

    /// Fetch raw cost records for the inclusive date range.
    async fn fetch_costs(&self, range: DateRange) -> Result<Vec<RawCostRecord>>;
}

/// Resolves the adapter for an account's provider.
pub trait AdapterFactory: Send + Sync {
    /// Build an adapter bound to the given credentials.
    ///
    /// # Errors
    /// Returns `UnsupportedProvider` when no adapter is registered for the
    /// provider.
    fn adapter_for(
        &self,
        provider: CloudProvider,
        credentials: &ProviderCredentials,
    ) -> Result<Box<dyn ProviderAdapter>>;
}

// =============================================================================
// Credential Vault
// =============================================================================

/// Decrypts stored provider credentials.
///
/// Implementations must fail with `DecryptionFailure` on authentication-tag
/// mismatch or malformed input, and must never log decrypted output.
pub trait CredentialVault: Send + Sync {
    /// Decrypt an account's credential blob.
    fn decrypt(&self, blob: &EncryptedBlob) -> Result<ProviderCredentials>;
}

// =============================================================================
// Stores
// =============================================================================

/// Append-only cost ledger.
pub trait CostLedger: Send + Sync {
    /// Insert a batch atomically, deduplicating on the natural key.
    ///
    /// Returns the number of rows actually inserted; re-inserts are silent
    /// no-ops. A failure inserts nothing.
    fn insert_batch(&self, records: &[CostLineItem]) -> Result<usize>;

    /// Per-(service, provider) totals for one account and day.
    fn sum_by_service(
        &self,
        tenant_id: &str,
        account_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ServiceDailyTotal>>;

    /// All line items for one account in the inclusive range.
    fn find_in_range(
        &self,
        tenant_id: &str,
        account_id: &str,
        range: DateRange,
    ) -> Result<Vec<CostLineItem>>;

    /// Delete line items older than the retention window. Returns rows
    /// deleted.
    fn prune(&self, retention_days: i64) -> Result<usize>;
}

/// Registered cloud accounts. The engine writes only the sync watermark.
pub trait AccountStore: Send + Sync {
    /// Look up an account by id.
    fn find_account(&self, account_id: &str) -> Result<Option<CloudAccount>>;

    /// All active accounts for a tenant.
    fn active_accounts(&self, tenant_id: &str) -> Result<Vec<CloudAccount>>;

    /// Advance the last-sync watermark after a successful collection.
    fn update_last_sync(&self, account_id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Detected anomalies.
pub trait AnomalyStore: Send + Sync {
    /// Find the anomaly for a dedup key, if any.
    fn find_anomaly(
        &self,
        tenant_id: &str,
        service: &str,
        date: NaiveDate,
        provider: CloudProvider,
    ) -> Result<Option<Anomaly>>;

    /// Persist a new anomaly. Returns its row id, or `None` when a
    /// concurrent writer already holds the dedup key.
    fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<Option<i64>>;
}

/// Savings recommendations.
pub trait RecommendationStore: Send + Sync {
    /// Find the open recommendation for a dedup key, if any.
    fn find_open(
        &self,
        tenant_id: &str,
        resource_id: &str,
        kind: RecommendationKind,
    ) -> Result<Option<Recommendation>>;

    /// Find the most recent recommendation for a dedup key regardless of
    /// status. Used to keep applied/dismissed keys frozen: a re-run must
    /// neither reopen nor duplicate them.
    fn find_latest(
        &self,
        tenant_id: &str,
        resource_id: &str,
        kind: RecommendationKind,
    ) -> Result<Option<Recommendation>>;

    /// Persist a new recommendation. Returns its row id.
    fn insert(&self, recommendation: &Recommendation) -> Result<i64>;

    /// Update savings, priority, and description of an open row in place.
    fn update_in_place(
        &self,
        id: i64,
        savings: f64,
        priority: Priority,
        description: &str,
    ) -> Result<()>;
}
