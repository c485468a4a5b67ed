//! Collection orchestrator.
//!
//! Per-account pipeline: resolve the account, decrypt credentials, select
//! the provider adapter, validate, fetch, normalize, persist the batch
//! atomically with dedup, and advance the sync watermark.
//!
//! `collect` never returns an error to its caller for per-account failures;
//! it reports them in the outcome so a batch driver can continue with other
//! accounts. Only a store-unavailable condition propagates, since it implies
//! the whole engine is non-functional.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::time::{Duration, timeout};

use crate::core::models::{
    AccountStatus, BatchOutcome, CloudAccount, CollectionOutcome, CostLineItem, DateRange,
};
use crate::core::ports::{AccountStore, AdapterFactory, CostLedger, CredentialVault};
use crate::core::provider::CloudProvider;
use crate::core::vault::fingerprint;
use crate::error::{CapeError, Result};
use crate::providers::RawCostRecord;

/// Default per-account time budget when the caller does not override it.
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Collection orchestrator, composed against the engine's ports.
pub struct Collector {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn CostLedger>,
    vault: Arc<dyn CredentialVault>,
    adapters: Arc<dyn AdapterFactory>,
}

impl Collector {
    /// Compose a collector from its collaborators.
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        ledger: Arc<dyn CostLedger>,
        vault: Arc<dyn CredentialVault>,
        adapters: Arc<dyn AdapterFactory>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            vault,
            adapters,
        }
    }

    /// Collect cost records for one account over a date range.
    ///
    /// # Errors
    /// Only store-unavailable conditions surface as `Err`; every other
    /// failure is recorded in the returned outcome.
    pub async fn collect(&self, account_id: &str, range: DateRange) -> Result<CollectionOutcome> {
        let start = Instant::now();
        let result = self.run_pipeline(account_id, range).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok((obtained, saved)) => {
                tracing::info!(
                    account = account_id,
                    records_obtained = obtained,
                    records_saved = saved,
                    duration_ms,
                    "collection succeeded"
                );
                Ok(CollectionOutcome::success(
                    account_id.to_string(),
                    obtained,
                    saved,
                    duration_ms,
                ))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(
                    account = account_id,
                    error = %e,
                    code = e.error_code(),
                    duration_ms,
                    "collection failed"
                );
                Ok(CollectionOutcome::failure(
                    account_id.to_string(),
                    duration_ms,
                    &e,
                ))
            }
        }
    }

    /// Collect many accounts concurrently with a per-account time budget.
    ///
    /// Sibling failures never abort the batch; a fatal store error does.
    ///
    /// # Errors
    /// Propagates the first store-unavailable error encountered.
    pub async fn collect_many(
        &self,
        account_ids: &[String],
        range: DateRange,
        per_account_timeout: Option<Duration>,
    ) -> Result<BatchOutcome> {
        let budget = per_account_timeout.unwrap_or(DEFAULT_COLLECT_TIMEOUT);

        let futures: Vec<_> = account_ids
            .iter()
            .map(|id| self.collect_with_timeout(id, range, budget))
            .collect();

        let mut outcomes = Vec::with_capacity(account_ids.len());
        for result in futures::future::join_all(futures).await {
            outcomes.push(result?);
        }
        Ok(BatchOutcome::from_outcomes(outcomes))
    }

    async fn collect_with_timeout(
        &self,
        account_id: &str,
        range: DateRange,
        budget: Duration,
    ) -> Result<CollectionOutcome> {
        match timeout(budget, self.collect(account_id, range)).await {
            Ok(outcome) => outcome,
            Err(_) => Ok(CollectionOutcome::failure(
                account_id.to_string(),
                u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                &CapeError::ProviderTimeout {
                    provider: "unknown".to_string(),
                    seconds: budget.as_secs(),
                },
            )),
        }
    }

    async fn run_pipeline(&self, account_id: &str, range: DateRange) -> Result<(usize, usize)> {
        let account = self
            .accounts
            .find_account(account_id)?
            .ok_or_else(|| CapeError::AccountNotFound {
                account_id: account_id.to_string(),
            })?;

        if account.status == AccountStatus::Inactive {
            return Err(CapeError::AccountInactive {
                account_id: account_id.to_string(),
            });
        }

        let provider = CloudProvider::parse(&account.provider).map_err(|_| {
            CapeError::UnsupportedProvider {
                provider: account.provider.clone(),
            }
        })?;

        tracing::debug!(
            account = account_id,
            provider = %provider,
            credentials = %fingerprint(&account.credentials),
            "decrypting credentials"
        );
        let credentials = self.vault.decrypt(&account.credentials)?;

        let adapter = self.adapters.adapter_for(provider, &credentials)?;

        if !adapter.validate_credentials().await? {
            return Err(CapeError::InvalidCredentials {
                provider: provider.name().to_string(),
            });
        }

        let records = adapter.fetch_costs(range).await?;
        let obtained = records.len();

        let items = normalize(&account, provider, records);
        // Single transactional insert: a partial fetch failure above never
        // reaches this point, so an aborted run leaves zero new rows.
        let saved = self.ledger.insert_batch(&items)?;

        self.accounts.update_last_sync(account_id, Utc::now())?;

        Ok((obtained, saved))
    }
}

/// Map raw provider records into ledger line items, stamping in tenant,
/// account, and provider.
fn normalize(
    account: &CloudAccount,
    provider: CloudProvider,
    records: Vec<RawCostRecord>,
) -> Vec<CostLineItem> {
    let mut items = Vec::with_capacity(records.len());
    for record in records {
        if record.amount < 0.0 {
            // Credits/refund lines violate the ledger invariant; skip them.
            tracing::warn!(
                account = %account.id,
                service = %record.service,
                amount = record.amount,
                "skipping negative cost record"
            );
            continue;
        }

        let mut metadata = record.metadata;
        if let Some(operation) = record.operation {
            metadata.insert(
                "operation".to_string(),
                serde_json::Value::String(operation),
            );
        }

        items.push(CostLineItem {
            tenant_id: account.tenant_id.clone(),
            account_id: account.id.clone(),
            date: record.date,
            provider,
            service: record.service,
            usage_type: record.usage_type,
            amount: record.amount,
            currency: record.currency,
            resource_id: record.resource_id,
            tags: record.tags,
            metadata,
        });
    }
    items
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::core::models::ProviderCredentials;
    use crate::core::ports::ProviderAdapter;
    use crate::core::vault::LocalVault;
    use crate::storage::SqliteStore;

    struct StubAdapter {
        valid: bool,
        records: Vec<RawCostRecord>,
        fail_fetch: bool,
    }

    #[async_trait]
    impl ProviderAdapter for StubAdapter {
        async fn validate_credentials(&self) -> crate::error::Result<bool> {
            Ok(self.valid)
        }

        async fn fetch_costs(
            &self,
            _range: DateRange,
        ) -> crate::error::Result<Vec<RawCostRecord>> {
            if self.fail_fetch {
                return Err(CapeError::UpstreamProvider {
                    provider: "aws".to_string(),
                    message: "throttled".to_string(),
                });
            }
            Ok(self.records.clone())
        }
    }

    struct StubFactory {
        valid: bool,
        records: Vec<RawCostRecord>,
        fail_fetch: bool,
    }

    impl AdapterFactory for StubFactory {
        fn adapter_for(
            &self,
            _provider: CloudProvider,
            _credentials: &ProviderCredentials,
        ) -> crate::error::Result<Box<dyn ProviderAdapter>> {
            Ok(Box::new(StubAdapter {
                valid: self.valid,
                records: self.records.clone(),
                fail_fetch: self.fail_fetch,
            }))
        }
    }

    fn record(date: &str, service: &str, amount: f64) -> RawCostRecord {
        RawCostRecord {
            date: date.parse().unwrap(),
            service: service.to_string(),
            amount,
            currency: "USD".to_string(),
            usage_type: "BoxUsage".to_string(),
            operation: None,
            resource_id: Some("i-0abc".to_string()),
            tags: BTreeMap::new(),
            metadata: serde_json::Map::new(),
        }
    }

    fn register(store: &SqliteStore, vault: &LocalVault, provider: &str) {
        let credentials = ProviderCredentials::new(BTreeMap::from([(
            "access_key_id".to_string(),
            "AKIA".to_string(),
        )]));
        store
            .register_account(&CloudAccount {
                id: "acct-1".to_string(),
                tenant_id: "t1".to_string(),
                provider: provider.to_string(),
                status: AccountStatus::Active,
                last_synced_at: None,
                credentials: vault.seal(&credentials).unwrap(),
            })
            .unwrap();
    }

    fn collector(store: Arc<SqliteStore>, vault: LocalVault, factory: StubFactory) -> Collector {
        Collector::new(
            store.clone(),
            store,
            Arc::new(vault),
            Arc::new(factory),
        )
    }

    fn range() -> DateRange {
        DateRange::new(
            "2026-01-01".parse().unwrap(),
            "2026-01-31".parse().unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn collect_happy_path_saves_and_watermarks() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vault = LocalVault::new(b"k".to_vec());
        register(&store, &vault, "aws");

        let collector = collector(
            store.clone(),
            vault,
            StubFactory {
                valid: true,
                records: vec![
                    record("2026-01-10", "Amazon EC2", 1.0),
                    record("2026-01-11", "Amazon EC2", 2.0),
                ],
                fail_fetch: false,
            },
        );

        let outcome = collector.collect("acct-1", range()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.records_obtained, 2);
        assert_eq!(outcome.records_saved, 2);
        assert!(outcome.errors.is_empty());

        assert_eq!(store.ledger_count().unwrap(), 2);
        let account = store.find_account("acct-1").unwrap().unwrap();
        assert!(account.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn collect_is_idempotent_across_runs() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vault = LocalVault::new(b"k".to_vec());
        register(&store, &vault, "aws");

        let collector = collector(
            store.clone(),
            vault,
            StubFactory {
                valid: true,
                records: vec![record("2026-01-10", "Amazon EC2", 1.0)],
                fail_fetch: false,
            },
        );

        let first = collector.collect("acct-1", range()).await.unwrap();
        assert_eq!(first.records_saved, 1);
        let second = collector.collect("acct-1", range()).await.unwrap();
        assert!(second.success);
        assert_eq!(second.records_obtained, 1);
        assert_eq!(second.records_saved, 0);
        assert_eq!(store.ledger_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_account_is_reported_not_thrown() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let collector = collector(
            store,
            LocalVault::new(b"k".to_vec()),
            StubFactory {
                valid: true,
                records: vec![],
                fail_fetch: false,
            },
        );

        let outcome = collector.collect("missing", range()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.errors[0].starts_with("CAPE-C001"));
    }

    #[tokio::test]
    async fn unsupported_provider_is_reported() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vault = LocalVault::new(b"k".to_vec());
        register(&store, &vault, "oraclecloud");

        let collector = collector(
            store.clone(),
            vault,
            StubFactory {
                valid: true,
                records: vec![record("2026-01-10", "Amazon EC2", 1.0)],
                fail_fetch: false,
            },
        );

        let outcome = collector.collect("acct-1", range()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.errors[0].starts_with("CAPE-P001"));
        assert_eq!(store.ledger_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn tampered_credentials_are_reported() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vault = LocalVault::new(b"k".to_vec());
        // Seal with a different key so decryption fails
        let wrong_vault = LocalVault::new(b"other".to_vec());
        let credentials = ProviderCredentials::default();
        store
            .register_account(&CloudAccount {
                id: "acct-1".to_string(),
                tenant_id: "t1".to_string(),
                provider: "aws".to_string(),
                status: AccountStatus::Active,
                last_synced_at: None,
                credentials: wrong_vault.seal(&credentials).unwrap(),
            })
            .unwrap();

        let collector = collector(
            store.clone(),
            vault,
            StubFactory {
                valid: true,
                records: vec![],
                fail_fetch: false,
            },
        );

        let outcome = collector.collect("acct-1", range()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.errors[0].starts_with("CAPE-A001"));
    }

    #[tokio::test]
    async fn rejected_credentials_leave_no_rows() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vault = LocalVault::new(b"k".to_vec());
        register(&store, &vault, "aws");

        let collector = collector(
            store.clone(),
            vault,
            StubFactory {
                valid: false,
                records: vec![record("2026-01-10", "Amazon EC2", 1.0)],
                fail_fetch: false,
            },
        );

        let outcome = collector.collect("acct-1", range()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.errors[0].starts_with("CAPE-A002"));
        assert_eq!(store.ledger_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_no_rows_and_no_watermark() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vault = LocalVault::new(b"k".to_vec());
        register(&store, &vault, "aws");

        let collector = collector(
            store.clone(),
            vault,
            StubFactory {
                valid: true,
                records: vec![],
                fail_fetch: true,
            },
        );

        let outcome = collector.collect("acct-1", range()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.errors[0].starts_with("CAPE-P002"));
        assert_eq!(store.ledger_count().unwrap(), 0);
        let account = store.find_account("acct-1").unwrap().unwrap();
        assert!(account.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn negative_amounts_are_skipped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vault = LocalVault::new(b"k".to_vec());
        register(&store, &vault, "aws");

        let collector = collector(
            store.clone(),
            vault,
            StubFactory {
                valid: true,
                records: vec![
                    record("2026-01-10", "Amazon EC2", 1.0),
                    record("2026-01-10", "Amazon EC2", -0.5),
                ],
                fail_fetch: false,
            },
        );

        let outcome = collector.collect("acct-1", range()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.records_obtained, 2);
        assert_eq!(outcome.records_saved, 1);
    }

    #[tokio::test]
    async fn batch_isolates_sibling_failures() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vault = LocalVault::new(b"k".to_vec());
        register(&store, &vault, "aws");

        let collector = collector(
            store,
            vault,
            StubFactory {
                valid: true,
                records: vec![record("2026-01-10", "Amazon EC2", 1.0)],
                fail_fetch: false,
            },
        );

        let batch = collector
            .collect_many(
                &["acct-1".to_string(), "missing".to_string()],
                range(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(batch.succeeded, 1);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.errors(10).len(), 1);
    }
}
