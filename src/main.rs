//! cape - Cost Analytics & Pattern Engine
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use cape::cli::{Cli, CliContext, Commands};
use cape::core::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::level_from_env)
        .unwrap_or(if cli.verbose {
            logging::LogLevel::Debug
        } else {
            logging::LogLevel::default()
        });
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::format_from_env().unwrap_or_default()
    };
    logging::init(log_level, log_format, logging::file_from_env());

    // Execute command
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("{}: {e}", e.error_code());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> cape::Result<()> {
    let Some(command) = &cli.command else {
        print_quickstart();
        return Ok(());
    };

    let ctx = CliContext::from_cli(&cli)?;

    match command {
        Commands::Collect(args) => cape::cli::collect::execute(&ctx, args).await,
        Commands::Analyze(args) => cape::cli::analyze::execute(&ctx, args),
        Commands::Recommend(args) => cape::cli::recommend::execute(&ctx, args),
        Commands::Account(command) => cape::cli::account::execute(&ctx, command),
        Commands::Prune(args) => cape::cli::prune(&ctx, args),
    }
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r#"cape - Cost Analytics & Pattern Engine

Ingest multi-cloud billing data, flag spend anomalies, and generate
cost-saving recommendations.

USAGE:
    cape [OPTIONS] <COMMAND>

COMMANDS:
    collect      Collect cost records for accounts over a date range
    analyze      Detect spend anomalies for one account and date
    recommend    Generate and reconcile savings recommendations
    account      Manage registered cloud accounts
    prune        Delete cost line items past the retention window

QUICK START:
    cape account add --id acct-1 --tenant t1 --provider aws \
        --credentials-file creds.json
    cape collect --account acct-1 --start 2026-01-01 --end 2026-01-31
    cape analyze --tenant t1 --account acct-1 --date 2026-01-31
    cape recommend --tenant t1

ROBOT MODE (for schedulers):
    cape collect --json ...       # JSON envelope on stdout
    cape --json-output ...        # JSONL logs on stderr

For more help: cape --help
"#
    );
}
