//! `cape analyze` - run the baseline analyzer for one account and date.

use std::sync::Arc;

use crate::cli::CliContext;
use crate::cli::args::AnalyzeArgs;
use crate::core::baseline::BaselineAnalyzer;
use crate::core::events::TracingSink;
use crate::error::{CapeError, Result};

/// Execute the analyze command.
///
/// # Errors
/// Returns argument errors and store failures.
pub fn execute(ctx: &CliContext, args: &AnalyzeArgs) -> Result<()> {
    let date = args.date.parse().map_err(|_| CapeError::ConfigInvalid {
        key: "date".to_string(),
        message: format!("expected YYYY-MM-DD, got {}", args.date),
    })?;

    let analyzer = BaselineAnalyzer::new(
        ctx.store.clone(),
        ctx.store.clone(),
        Arc::new(TracingSink),
        ctx.config.baseline.clone(),
    );

    let report = analyzer.analyze(&args.tenant, &args.account, date)?;

    let mut human = format!(
        "Detected {} anomalies for {} / {} on {date}",
        report.anomalies_detected, args.tenant, args.account,
    );
    for anomaly in &report.anomalies {
        human.push_str(&format!(
            "\n  [{}] {}: expected {}, actual {} ({:+.0}%)",
            anomaly.severity.as_str(),
            anomaly.service,
            crate::util::format_cost(anomaly.expected_cost),
            crate::util::format_cost(anomaly.actual_cost),
            anomaly.deviation_pct,
        ));
    }
    ctx.print("analyze", &report, &human, Vec::new())
}
