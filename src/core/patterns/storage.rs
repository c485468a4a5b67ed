//! Unused-storage detector.
//!
//! A resource that bills only storage-family line items for weeks with no
//! compute signal on the same resource is likely an unattached volume or a
//! forgotten bucket. Presence duration is a heuristic proxy for attachment
//! state; there is no authoritative resource-state signal in billing data.

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
    if !profile.only_family(ServiceFamily::Storage) {
        return None;
    }
    if profile.days_present() < config.unused_min_days as usize {
        return None;
    }

    let savings = profile.avg_daily_cost() * 30.0;
    if savings <= config.unused_min_monthly_usd {
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

    Some(RecommendationCandidate {
        tenant_id: profile.tenant_id.clone(),
        kind: RecommendationKind::Unused,
        provider: profile.provider,
        service: profile.service.clone(),
        resource_id: profile.resource_id.clone(),
        estimated_monthly_savings: savings,
        description: format!(
            "{} billed storage for {} days with no paired compute activity; \
             deleting or archiving it would save about {}/month.",
            profile.resource_id,
            profile.days_present(),
            format_cost(savings),
        ),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patterns::build_profiles;
    use crate::test_utils::{daily_items, window_ending};

    fn storage_items(
        start: &str,
        days: u32,
        amount: f64,
        resource: &str,
    ) -> Vec<crate::core::models::CostLineItem> {
        let mut items = daily_items(start, days, "Amazon EBS", amount, Some(resource));
        for item in &mut items {
            item.usage_type = "VolumeUsage.gp3".to_string();
        }
        items
    }

    #[test]
    fn long_lived_storage_without_compute_is_flagged() {
        let window = window_ending("2026-03-01", 30);
        let items = storage_items("2026-02-05", 22, 0.40, "vol-1");
        let profiles = build_profiles("t1", window, &items);

        let candidate = detect(
            &profiles[0],
            &PatternConfig::default(),
            &PricingTable::current(),
        )
        .expect("unused storage candidate");

        assert_eq!(candidate.kind, RecommendationKind::Unused);
        assert!((candidate.estimated_monthly_savings - 12.0).abs() < 1e-9);
    }

    #[test]
    fn cheap_storage_is_below_floor() {
        let window = window_ending("2026-03-01", 30);
        // $0.10/day -> $3/month, under the $5 floor
        let items = storage_items("2026-02-05", 22, 0.10, "vol-small");
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
    fn paired_compute_signal_suppresses() {
        let window = window_ending("2026-03-01", 30);
        let mut items = storage_items("2026-02-05", 22, 0.40, "vol-attached");
        items.extend(daily_items(
            "2026-02-05",
            22,
            "Amazon EC2",
            1.0,
            Some("vol-attached"),
        ));
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
    fn short_presence_is_ignored() {
        let window = window_ending("2026-03-01", 30);
        let items = storage_items("2026-02-15", 10, 1.0, "vol-new");
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
}
