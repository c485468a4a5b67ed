//! CLI argument parsing and command dispatch.
//!
//! Thin plumbing around the engine: each command wires the SQLite store, the
//! local vault, and the fixture adapter factory into the relevant pipeline
//! and prints either a human summary or a robot JSON envelope.

pub mod account;
pub mod analyze;
pub mod args;
pub mod collect;
pub mod recommend;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::core::config::EngineConfig;
use crate::core::models::RobotOutput;
use crate::core::vault::LocalVault;
use crate::error::Result;
use crate::storage::SqliteStore;

pub use args::{Cli, Commands};

/// Environment variable holding the local vault key.
pub const ENV_VAULT_KEY: &str = "CAPE_VAULT_KEY";

/// Shared command context: resolved config plus an open store.
pub struct CliContext {
    pub config: EngineConfig,
    pub store: Arc<SqliteStore>,
    pub json: bool,
    pub pretty: bool,
}

impl CliContext {
    /// Resolve config and open the database for a CLI invocation.
    ///
    /// # Errors
    /// Returns config and persistence errors.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = EngineConfig::load(cli.config.as_deref())?;
        let db_path: PathBuf = config.database_path(cli.db.as_deref());
        let store = Arc::new(SqliteStore::open(&db_path)?);
        Ok(Self {
            config,
            store,
            json: cli.json,
            pretty: cli.pretty,
        })
    }

    /// The local development vault, keyed from `CAPE_VAULT_KEY`.
    #[must_use]
    pub fn vault(&self) -> LocalVault {
        let key = std::env::var(ENV_VAULT_KEY)
            .unwrap_or_else(|_| "cape-dev-vault-key".to_string());
        LocalVault::new(key.into_bytes())
    }

    /// Print command output: robot JSON envelope or a human summary.
    ///
    /// # Errors
    /// Returns a JSON error if serialization fails.
    pub fn print<T: Serialize>(
        &self,
        command: &str,
        data: &T,
        human: &str,
        errors: Vec<String>,
    ) -> Result<()> {
        if self.json {
            let envelope = RobotOutput::with_errors(command, data, errors);
            let rendered = if self.pretty {
                serde_json::to_string_pretty(&envelope)?
            } else {
                serde_json::to_string(&envelope)?
            };
            println!("{rendered}");
        } else {
            println!("{human}");
            for error in errors {
                eprintln!("error: {error}");
            }
        }
        Ok(())
    }
}

/// Execute the `prune` command.
///
/// # Errors
/// Returns config and persistence errors.
pub fn prune(ctx: &CliContext, args: &args::PruneArgs) -> Result<()> {
    use crate::core::ports::CostLedger;

    let days = args
        .days
        .unwrap_or(ctx.config.retention.ledger_retention_days);
    let deleted = ctx.store.prune(days)?;
    ctx.print(
        "prune",
        &serde_json::json!({ "retentionDays": days, "deleted": deleted }),
        &format!("Deleted {deleted} line items older than {days} days"),
        Vec::new(),
    )
}
