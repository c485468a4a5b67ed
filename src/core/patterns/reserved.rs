//! Reserved/committed-use detector.
//!
//! An on-demand compute resource billing every single day for four weeks is
//! a steady-state workload; committed-use pricing would cover it. Savings
//! use a fixed discount estimate rather than live reservation quotes.

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
    if !profile.has_family(ServiceFamily::Compute) {
        return None;
    }
    if profile.has_reserved_marker {
        return None;
    }
    if profile.longest_consecutive_run() < config.reserved_min_consecutive_days as usize {
        return None;
    }

    let avg_daily = profile.avg_daily_cost();
    if avg_daily <= config.reserved_min_avg_daily_usd {
        return None;
    }

    let savings = avg_daily * 30.0 * config.reserved_discount;

    let mut metadata = serde_json::Map::new();
    metadata.insert("avgDailyCost".to_string(), avg_daily.into());
    metadata.insert(
        "consecutiveDays".to_string(),
        (profile.longest_consecutive_run() as u64).into(),
    );
    metadata.insert(
        "discountEstimate".to_string(),
        config.reserved_discount.into(),
    );

    Some(RecommendationCandidate {
        tenant_id: profile.tenant_id.clone(),
        kind: RecommendationKind::ReservedCapacity,
        provider: profile.provider,
        service: profile.service.clone(),
        resource_id: profile.resource_id.clone(),
        estimated_monthly_savings: savings,
        description: format!(
            "{} has billed on-demand for {} consecutive days at {}/day; a \
             reserved or committed-use plan would save about {}/month.",
            profile.resource_id,
            profile.longest_consecutive_run(),
            format_cost(avg_daily),
            format_cost(savings),
        ),
        metadata,
    })
}
