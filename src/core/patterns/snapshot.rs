//! Stale-snapshot detector.
//!
//! A snapshot billing through the entire analysis window has been around at
//! least that long; full-window presence stands in for "older than ~90 days"
//! since billing data carries no creation date. Heuristic by design.

use crate::core::config::PatternConfig;
use crate::core::models::{RecommendationCandidate, RecommendationKind};
use crate::core::patterns::ResourceProfile;
use crate::core::pricing::PricingTable;
use crate::core::provider::ServiceFamily;
use crate::util::format::format_cost;

pub(crate) fn detect(
    profile: &ResourceProfile,
    config: &PatternConfig,
    _pricing: &PricingTable,
) -> Option<RecommendationCandidate> {
    if !profile.only_family(ServiceFamily::Snapshot) {
        return None;
    }
    if profile.days_present() < config.snapshot_min_days as usize {
        return None;
    }

    let savings = profile.avg_daily_cost() * 30.0;
    if savings <= config.snapshot_min_monthly_usd {
        return None;
    }

    let mut metadata = serde_json::Map::new();
    metadata.insert(
        "avgDailyCost".to_string(),
        profile.avg_daily_cost().into(),
    );
    metadata.insert(
        "daysObserved".to_string(),
        (profile.days_present() as u64).into(),
    );
    metadata.insert(
        "windowDays".to_string(),
        u64::from(config.window_days).into(),
    );

    Some(RecommendationCandidate {
        tenant_id: profile.tenant_id.clone(),
        kind: RecommendationKind::StaleSnapshot,
        provider: profile.provider,
        service: profile.service.clone(),
        resource_id: profile.resource_id.clone(),
        estimated_monthly_savings: savings,
        description: format!(
            "{} has billed for {} of the last {} days and predates the whole \
             analysis window; pruning it would save about {}/month.",
            profile.resource_id,
            profile.days_present(),
            config.window_days,
            format_cost(savings),
        ),
        metadata,
    })
}
