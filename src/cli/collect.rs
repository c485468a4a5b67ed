//! `cape collect` - run the collection orchestrator for accounts.

use std::sync::Arc;

use tokio::time::Duration;

use crate::cli::CliContext;
use crate::cli::args::CollectArgs;
use crate::core::collector::Collector;
use crate::core::models::DateRange;
use crate::error::{CapeError, Result};
use crate::providers::FixtureAdapterFactory;

/// Execute the collect command.
///
/// # Errors
/// Returns argument errors and store-unavailable errors; per-account
/// failures are reported in the batch outcome instead.
pub async fn execute(ctx: &CliContext, args: &CollectArgs) -> Result<()> {
    let range = DateRange::new(parse_date(&args.start)?, parse_date(&args.end)?)?;
    let timeout = args.timeout.map(Duration::from_secs);

    let collector = Collector::new(
        ctx.store.clone(),
        ctx.store.clone(),
        Arc::new(ctx.vault()),
        Arc::new(FixtureAdapterFactory),
    );

    let batch = collector.collect_many(&args.accounts, range, timeout).await?;

    let saved: usize = batch.outcomes.iter().map(|o| o.records_saved).sum();
    let human = format!(
        "Collected {} account(s): {} succeeded, {} failed, {} records saved",
        batch.outcomes.len(),
        batch.succeeded,
        batch.failed,
        saved,
    );
    let errors = batch.errors(20);
    ctx.print("collect", &batch, &human, errors)
}

fn parse_date(s: &str) -> Result<chrono::NaiveDate> {
    s.parse().map_err(|_| CapeError::ConfigInvalid {
        key: "date".to_string(),
        message: format!("expected YYYY-MM-DD, got {s}"),
    })
}
