//! Idle-resource detector.
//!
//! A compute resource whose average daily cost sits far below the expected
//! minimum cost of simply running it is almost certainly stopped, orphaned,
//! or billing for residue. Proposes stopping it, recovering most of the
//! residual spend.

use crate::core::config::PatternConfig;
use crate::core::models::{RecommendationCandidate, RecommendationKind};
use crate::core::patterns::ResourceProfile;
use crate::core::pricing::PricingTable;
use crate::core::provider::ServiceFamily;
use crate::util::format::format_cost;

/// Ratio predicate shared with the rightsizing detector's non-idle gate.
pub(crate) fn is_cost_idle(
    profile: &ResourceProfile,
    config: &PatternConfig,
    pricing: &PricingTable,
) -> bool {
    let expected_minimum = pricing.minimum_daily_cost(profile.size_tag());
    if expected_minimum <= 0.0 {
        return false;
    }
    profile.avg_daily_cost() / expected_minimum < config.idle_cost_ratio
}

pub(crate) fn detect(
    profile: &ResourceProfile,
    config: &PatternConfig,
    pricing: &PricingTable,
) -> Option<RecommendationCandidate> {
    if !profile.has_family(ServiceFamily::Compute) {
        return None;
    }
    if profile.days_present() < config.idle_min_days as usize {
        return None;
    }
    if !is_cost_idle(profile, config, pricing) {
        return None;
    }

    let avg_daily = profile.avg_daily_cost();
    let expected_minimum = pricing.minimum_daily_cost(profile.size_tag());
    let savings = avg_daily * 30.0 * config.idle_recovery_factor;

    let mut metadata = serde_json::Map::new();
    metadata.insert("avgDailyCost".to_string(), avg_daily.into());
    metadata.insert(
        "expectedMinimumDailyCost".to_string(),
        expected_minimum.into(),
    );
    metadata.insert(
        "daysObserved".to_string(),
        (profile.days_present() as u64).into(),
    );

    Some(RecommendationCandidate {
        tenant_id: profile.tenant_id.clone(),
        kind: RecommendationKind::Idle,
        provider: profile.provider,
        service: profile.service.clone(),
        resource_id: profile.resource_id.clone(),
        estimated_monthly_savings: savings,
        description: format!(
            "{} averaged {}/day over {} days, well below the {}/day expected \
             minimum for a running instance; consider stopping or terminating it.",
            profile.resource_id,
            format_cost(avg_daily),
            profile.days_present(),
            format_cost(expected_minimum),
        ),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Priority;
    use crate::core::patterns::build_profiles;
    use crate::test_utils::{daily_items, window_ending};

    #[test]
    fn near_zero_cost_instance_is_idle() {
        let window = window_ending("2026-03-01", 30);
        let items = daily_items("2026-02-04", 26, "Amazon EC2", 0.005, Some("i-idle"));
        let profiles = build_profiles("t1", window, &items);

        let candidate = detect(
            &profiles[0],
            &PatternConfig::default(),
            &PricingTable::current(),
        )
        .expect("idle candidate");

        assert_eq!(candidate.kind, RecommendationKind::Idle);
        // 0.005 * 30 * 0.95
        assert!((candidate.estimated_monthly_savings - 0.1425).abs() < 1e-9);
        assert_eq!(candidate.priority(), Priority::Low);
    }

    #[test]
    fn too_few_days_is_not_idle() {
        let window = window_ending("2026-03-01", 30);
        let items = daily_items("2026-02-10", 20, "Amazon EC2", 0.005, Some("i-new"));
        let profiles = build_profiles("t1", window, &items);

        assert!(
            detect(
                &profiles[0],
                &PatternConfig::default(),
                &PricingTable::current(),
            )
            .is_none()
        );
    }

    #[test]
    fn normally_billed_instance_is_not_idle() {
        let window = window_ending("2026-03-01", 30);
        let items = daily_items("2026-02-01", 28, "Amazon EC2", 2.0, Some("i-busy"));
        let profiles = build_profiles("t1", window, &items);

        assert!(
            detect(
                &profiles[0],
                &PatternConfig::default(),
                &PricingTable::current(),
            )
            .is_none()
        );
    }

    #[test]
    fn storage_resources_are_ignored() {
        let window = window_ending("2026-03-01", 30);
        let mut items = daily_items("2026-02-01", 28, "Amazon S3", 0.001, Some("bucket-1"));
        for item in &mut items {
            item.usage_type = "TimedStorage-ByteHrs".to_string();
        }
        let profiles = build_profiles("t1", window, &items);

        assert!(
            detect(
                &profiles[0],
                &PatternConfig::default(),
                &PricingTable::current(),
            )
            .is_none()
        );
    }

    #[test]
    fn size_tag_raises_expected_minimum() {
        let window = window_ending("2026-03-01", 30);
        // $0.05/day is 0.4% of an m5.xlarge's $4.61/day: idle for a tagged
        // xlarge even though it exceeds 5% of the untagged floor.
        let mut items = daily_items("2026-02-01", 26, "Amazon EC2", 0.05, Some("i-big"));
        for item in &mut items {
            item.tags
                .insert("instance_type".to_string(), "m5.xlarge".to_string());
        }
        let profiles = build_profiles("t1", window, &items);

        let candidate = detect(
            &profiles[0],
            &PatternConfig::default(),
            &PricingTable::current(),
        );
        assert!(candidate.is_some());
    }
}
