//! Rightsizing detector.
//!
//! A steadily billed, non-idle instance whose size tag maps to a strictly
//! cheaper one-tier-down size can be shrunk. Cost consistency is judged by
//! the coefficient of variation of the daily totals; spiky workloads are
//! left alone.

use crate::core::config::PatternConfig;
use crate::core::models::{RecommendationCandidate, RecommendationKind};
use crate::core::patterns::{ResourceProfile, idle};
use crate::core::pricing::PricingTable;
use crate::core::provider::ServiceFamily;
use crate::util::format::format_cost;

pub(crate) fn detect(
    profile: &ResourceProfile,
    config: &PatternConfig,
    pricing: &PricingTable,
) -> Option<RecommendationCandidate> {
    if !profile.has_family(ServiceFamily::Compute) {
        return None;
    }
    if profile.days_present() < config.rightsize_min_days as usize {
        return None;
    }
    // Idle resources get a stop recommendation, not a smaller size.
    if idle::is_cost_idle(profile, config, pricing) {
        return None;
    }
    if profile.daily_cost_cv() > config.rightsize_max_cv {
        return None;
    }

    let size = profile.size_tag()?;
    let current_hourly = pricing.hourly_rate(size)?;
    let (target_size, target_hourly) = pricing.one_tier_down(size)?;

    let savings = (current_hourly - target_hourly) * 24.0 * 30.0;

    let mut metadata = serde_json::Map::new();
    metadata.insert("currentSize".to_string(), size.into());
    metadata.insert("targetSize".to_string(), target_size.into());
    metadata.insert("currentHourlyRate".to_string(), current_hourly.into());
    metadata.insert("targetHourlyRate".to_string(), target_hourly.into());
    metadata.insert(
        "daysObserved".to_string(),
        (profile.days_present() as u64).into(),
    );

    Some(RecommendationCandidate {
        tenant_id: profile.tenant_id.clone(),
        kind: RecommendationKind::Rightsize,
        provider: profile.provider,
        service: profile.service.clone(),
        resource_id: profile.resource_id.clone(),
        estimated_monthly_savings: savings,
        description: format!(
            "{} has run {} for {} days with steady cost; downsizing to \
             {target_size} would save about {}/month.",
            profile.resource_id,
            size,
            profile.days_present(),
            format_cost(savings),
        ),
        metadata,
    })
}
