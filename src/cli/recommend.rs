//! `cape recommend` - generate savings candidates and reconcile them.

use std::sync::Arc;

use serde::Serialize;

use crate::cli::CliContext;
use crate::cli::args::RecommendArgs;
use crate::core::events::TracingSink;
use crate::core::models::{RecommendationCandidate, ReconcileReport};
use crate::core::patterns::PatternAnalyzer;
use crate::core::pricing::PricingTable;
use crate::core::reconcile::ReconcileEngine;
use crate::error::{CapeError, Result};

/// Combined output of one recommendation run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecommendReport {
    candidates: Vec<RecommendationCandidate>,
    reconcile: ReconcileReport,
}

/// Execute the recommend command.
///
/// # Errors
/// Returns argument errors and store failures.
pub fn execute(ctx: &CliContext, args: &RecommendArgs) -> Result<()> {
    let analyzer = PatternAnalyzer::new(
        ctx.store.clone(),
        ctx.store.clone(),
        ctx.config.patterns.clone(),
        PricingTable::current(),
    );

    let candidates = match &args.as_of {
        Some(raw) => {
            let as_of = raw.parse().map_err(|_| CapeError::ConfigInvalid {
                key: "as-of".to_string(),
                message: format!("expected YYYY-MM-DD, got {raw}"),
            })?;
            analyzer.generate_as_of(&args.tenant, args.account.as_deref(), as_of)?
        }
        None => analyzer.generate(&args.tenant, args.account.as_deref())?,
    };

    let engine = ReconcileEngine::new(
        ctx.store.clone(),
        Arc::new(TracingSink),
        ctx.config.reconcile.clone(),
    );
    let reconcile = engine.reconcile(&args.tenant, &candidates)?;

    let mut human = format!(
        "{} candidate(s): {} created, {} updated, {} unchanged",
        candidates.len(),
        reconcile.created,
        reconcile.updated,
        reconcile.unchanged,
    );
    for candidate in &candidates {
        human.push_str(&format!(
            "\n  [{}] {} {} -> save {}/month",
            candidate.priority().as_str(),
            candidate.kind.as_str(),
            candidate.resource_id,
            crate::util::format_cost(candidate.estimated_monthly_savings),
        ));
    }

    let report = RecommendReport {
        candidates,
        reconcile,
    };
    ctx.print("recommend", &report, &human, Vec::new())
}
