//! File-backed fixture adapter.
//!
//! Serves cost records from a JSON file named in the account's decrypted
//! credentials (`records_path`). Used by the CLI demo path and integration
//! tests; real deployments register per-cloud adapters instead.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::models::{DateRange, ProviderCredentials};
use crate::core::ports::{AdapterFactory, ProviderAdapter};
use crate::core::provider::CloudProvider;
use crate::error::{CapeError, Result};
use crate::providers::RawCostRecord;

/// Credential field naming the records file.
pub const RECORDS_PATH_FIELD: &str = "records_path";

/// Adapter that replays cost records from a JSON file.
#[derive(Debug)]
pub struct FixtureAdapter {
    provider: CloudProvider,
    records_path: PathBuf,
}

impl FixtureAdapter {
    /// Create an adapter reading from the given file.
    #[must_use]
    pub const fn new(provider: CloudProvider, records_path: PathBuf) -> Self {
        Self {
            provider,
            records_path,
        }
    }

    fn load(&self) -> Result<Vec<RawCostRecord>> {
        let content =
            std::fs::read_to_string(&self.records_path).map_err(|e| CapeError::UpstreamProvider {
                provider: self.provider.name().to_string(),
                message: format!("read {}: {e}", self.records_path.display()),
            })?;
        serde_json::from_str(&content).map_err(|e| CapeError::UpstreamProvider {
            provider: self.provider.name().to_string(),
            message: format!("parse {}: {e}", self.records_path.display()),
        })
    }
}

#[async_trait]
impl ProviderAdapter for FixtureAdapter {
    async fn validate_credentials(&self) -> Result<bool> {
        // The file standing in for the provider account must exist.
        Ok(self.records_path.exists())
    }

    async fn fetch_costs(&self, range: DateRange) -> Result<Vec<RawCostRecord>> {
        let records = self.load()?;
        Ok(records
            .into_iter()
            .filter(|r| range.contains(r.date))
            .collect())
    }
}

/// Factory serving fixture adapters for every known provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureAdapterFactory;

impl AdapterFactory for FixtureAdapterFactory {
    fn adapter_for(
        &self,
        provider: CloudProvider,
        credentials: &ProviderCredentials,
    ) -> Result<Box<dyn ProviderAdapter>> {
        let path = credentials
            .get(RECORDS_PATH_FIELD)
            .ok_or_else(|| CapeError::InvalidCredentials {
                provider: provider.name().to_string(),
            })?;
        Ok(Box::new(FixtureAdapter::new(provider, PathBuf::from(path))))
    }
}
