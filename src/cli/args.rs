//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cost Analytics & Pattern Engine - multi-cloud spend analysis.
#[derive(Parser, Debug)]
#[command(name = "cape")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Emit results as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Database path override
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect cost records for accounts over a date range
    Collect(CollectArgs),

    /// Detect spend anomalies for one account and date
    Analyze(AnalyzeArgs),

    /// Generate and reconcile savings recommendations
    Recommend(RecommendArgs),

    /// Manage registered cloud accounts
    #[command(subcommand)]
    Account(AccountCommand),

    /// Delete cost line items past the retention window
    Prune(PruneArgs),
}

/// Arguments for the `collect` command.
#[derive(Parser, Debug)]
pub struct CollectArgs {
    /// Account ids to collect (repeatable)
    #[arg(long = "account", value_name = "ID", required = true)]
    pub accounts: Vec<String>,

    /// Range start date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub start: String,

    /// Range end date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub end: String,

    /// Per-account timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

/// Arguments for the `analyze` command.
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Tenant id
    #[arg(long, value_name = "ID")]
    pub tenant: String,

    /// Account id
    #[arg(long, value_name = "ID")]
    pub account: String,

    /// Analysis date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date: String,
}

/// Arguments for the `recommend` command.
#[derive(Parser, Debug)]
pub struct RecommendArgs {
    /// Tenant id
    #[arg(long, value_name = "ID")]
    pub tenant: String,

    /// Restrict to one account
    #[arg(long, value_name = "ID")]
    pub account: Option<String>,

    /// Window end date (YYYY-MM-DD), defaults to today
    #[arg(long, value_name = "DATE")]
    pub as_of: Option<String>,
}

/// Account management subcommands.
#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// Register an account with credentials from a JSON file
    Add(AccountAddArgs),

    /// List active accounts for a tenant
    List {
        /// Tenant id
        #[arg(long, value_name = "ID")]
        tenant: String,
    },
}

/// Arguments for `account add`.
#[derive(Parser, Debug)]
pub struct AccountAddArgs {
    /// Account id
    #[arg(long, value_name = "ID")]
    pub id: String,

    /// Tenant id
    #[arg(long, value_name = "ID")]
    pub tenant: String,

    /// Provider name (aws, azure, gcp)
    #[arg(long, value_name = "NAME")]
    pub provider: String,

    /// JSON file with credential fields to seal into the vault
    #[arg(long, value_name = "PATH")]
    pub credentials_file: PathBuf,
}

/// Arguments for the `prune` command.
#[derive(Parser, Debug)]
pub struct PruneArgs {
    /// Retention window in days (defaults to the configured value)
    #[arg(long, value_name = "DAYS")]
    pub days: Option<i64>,
}
