//! Shared harness for integration tests.
//!
//! Wires an in-memory store, the local vault, and the fixture adapter
//! factory into one test engine, the same composition the CLI uses.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use cape::core::baseline::BaselineAnalyzer;
use cape::core::collector::Collector;
use cape::core::config::EngineConfig;
use cape::core::models::{AccountStatus, CloudAccount, ProviderCredentials};
use cape::core::patterns::PatternAnalyzer;
use cape::core::pricing::PricingTable;
use cape::core::reconcile::ReconcileEngine;
use cape::core::vault::LocalVault;
use cape::providers::FixtureAdapterFactory;
use cape::storage::SqliteStore;
use cape::test_utils::CapturingSink;

pub const VAULT_KEY: &[u8] = b"integration-test-key";

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub sink: Arc<CapturingSink>,
    pub config: EngineConfig,
    dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(SqliteStore::open_in_memory().expect("open store")),
            sink: Arc::new(CapturingSink::default()),
            config: EngineConfig::default(),
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Register an account whose adapter replays `records_json` from disk.
    pub fn register_fixture_account(
        &self,
        id: &str,
        tenant: &str,
        provider: &str,
        records_json: &str,
    ) -> PathBuf {
        let path = self.dir.path().join(format!("{id}-records.json"));
        std::fs::write(&path, records_json).expect("write records");

        let credentials = ProviderCredentials::new(BTreeMap::from([(
            "records_path".to_string(),
            path.display().to_string(),
        )]));
        let vault = LocalVault::new(VAULT_KEY.to_vec());
        self.store
            .register_account(&CloudAccount {
                id: id.to_string(),
                tenant_id: tenant.to_string(),
                provider: provider.to_string(),
                status: AccountStatus::Active,
                last_synced_at: None,
                credentials: vault.seal(&credentials).expect("seal"),
            })
            .expect("register account");
        path
    }

    pub fn collector(&self) -> Collector {
        Collector::new(
            self.store.clone(),
            self.store.clone(),
            Arc::new(LocalVault::new(VAULT_KEY.to_vec())),
            Arc::new(FixtureAdapterFactory),
        )
    }

    pub fn baseline(&self) -> BaselineAnalyzer {
        BaselineAnalyzer::new(
            self.store.clone(),
            self.store.clone(),
            self.sink.clone(),
            self.config.baseline.clone(),
        )
    }

    pub fn patterns(&self) -> PatternAnalyzer {
        PatternAnalyzer::new(
            self.store.clone(),
            self.store.clone(),
            self.config.patterns.clone(),
            PricingTable::current(),
        )
    }

    pub fn reconciler(&self) -> ReconcileEngine {
        ReconcileEngine::new(
            self.store.clone(),
            self.sink.clone(),
            self.config.reconcile.clone(),
        )
    }
}

/// Build a JSON array of daily raw records for the fixture adapter.
pub fn daily_records_json(
    start: &str,
    days: u32,
    service: &str,
    usage_type: &str,
    amount: f64,
    resource_id: Option<&str>,
) -> String {
    let start: chrono::NaiveDate = start.parse().expect("valid date");
    let records: Vec<serde_json::Value> = (0..days)
        .map(|offset| {
            let date = start + chrono::Duration::days(i64::from(offset));
            let mut record = serde_json::json!({
                "date": date.to_string(),
                "service": service,
                "amount": amount,
                "currency": "USD",
                "usageType": usage_type,
            });
            if let Some(id) = resource_id {
                record["resourceId"] = id.into();
            }
            record
        })
        .collect();
    serde_json::to_string(&records).expect("serialize records")
}
