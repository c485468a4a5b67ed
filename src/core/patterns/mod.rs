//! Resource pattern analyzer.
//!
//! Per-account pipeline: pull the trailing cost window from the ledger,
//! group line items into per-resource usage profiles, then run the detector
//! table over every profile. Detectors are independent and read-only; one
//! detector declining (or a resource being ineligible) never affects the
//! others. Persistence of the resulting candidates is the dedup/merge
//! engine's job.

pub mod idle;
pub mod reserved;
pub mod rightsize;
pub mod snapshot;
pub mod storage;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::core::config::PatternConfig;
use crate::core::models::{CostLineItem, DateRange, RecommendationCandidate};
use crate::core::ports::{AccountStore, CostLedger};
use crate::core::pricing::{PricingTable, resolve_size_tag};
use crate::core::provider::{CloudProvider, ServiceFamily};
use crate::error::{CapeError, Result};

// =============================================================================
// Resource Profile
// =============================================================================

/// Aggregated usage view of one resource over the analysis window.
#[derive(Debug, Clone)]
pub struct ResourceProfile {
    pub tenant_id: String,
    pub resource_id: String,
    pub provider: CloudProvider,
    /// Service name of the resource's costliest line items.
    pub service: String,
    /// Window the profile was built over.
    pub window: DateRange,
    /// Total cost per day, across all of the resource's line items.
    pub daily_totals: BTreeMap<NaiveDate, f64>,
    /// Service families observed on this resource.
    pub families: BTreeSet<ServiceFamily>,
    /// Merged tags (later items win on key conflicts).
    pub tags: BTreeMap<String, String>,
    /// Whether any line item carried a reserved/commitment marker.
    pub has_reserved_marker: bool,
}

impl ResourceProfile {
    /// Distinct days with at least one line item.
    #[must_use]
    pub fn days_present(&self) -> usize {
        self.daily_totals.len()
    }

    /// Total cost over the window.
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.daily_totals.values().sum()
    }

    /// Mean cost over the days the resource was present.
    #[must_use]
    pub fn avg_daily_cost(&self) -> f64 {
        let days = self.days_present();
        if days == 0 {
            0.0
        } else {
            self.total_cost() / days as f64
        }
    }

    /// Length of the longest run of consecutive days with cost.
    #[must_use]
    pub fn longest_consecutive_run(&self) -> usize {
        let mut longest = 0usize;
        let mut current = 0usize;
        let mut previous: Option<NaiveDate> = None;
        for date in self.daily_totals.keys() {
            current = match previous {
                Some(prev) if (*date - prev).num_days() == 1 => current + 1,
                _ => 1,
            };
            longest = longest.max(current);
            previous = Some(*date);
        }
        longest
    }

    /// Coefficient of variation of the daily totals (stddev / mean).
    ///
    /// Returns 0 for constant cost and infinity when the mean is 0.
    #[must_use]
    pub fn daily_cost_cv(&self) -> f64 {
        let days = self.days_present();
        if days == 0 {
            return f64::INFINITY;
        }
        let mean = self.avg_daily_cost();
        if mean == 0.0 {
            return f64::INFINITY;
        }
        let variance = self
            .daily_totals
            .values()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / days as f64;
        variance.sqrt() / mean
    }

    /// Whether every observed line item belongs to the given family.
    #[must_use]
    pub fn only_family(&self, family: ServiceFamily) -> bool {
        self.families.len() == 1 && self.families.contains(&family)
    }

    /// Whether any observed line item belongs to the given family.
    #[must_use]
    pub fn has_family(&self, family: ServiceFamily) -> bool {
        self.families.contains(&family)
    }

    /// Resolved size tag, if any.
    #[must_use]
    pub fn size_tag(&self) -> Option<&str> {
        resolve_size_tag(&self.tags)
    }
}

/// Group window line items into per-resource profiles.
///
/// Line items without a resolvable resource id (absent, empty, or the
/// literal `"unknown"`) are dropped: no detector may propose action against
/// an ambiguous resource.
#[must_use]
pub fn build_profiles(
    tenant_id: &str,
    window: DateRange,
    items: &[CostLineItem],
) -> Vec<ResourceProfile> {
    struct Accumulator {
        profile: ResourceProfile,
        service_costs: HashMap<String, f64>,
    }

    let mut by_resource: BTreeMap<String, Accumulator> = BTreeMap::new();

    for item in items {
        let Some(resource_id) = item.resolved_resource_id() else {
            continue;
        };

        let acc = by_resource
            .entry(resource_id.to_string())
            .or_insert_with(|| Accumulator {
                profile: ResourceProfile {
                    tenant_id: tenant_id.to_string(),
                    resource_id: resource_id.to_string(),
                    provider: item.provider,
                    service: item.service.clone(),
                    window,
                    daily_totals: BTreeMap::new(),
                    families: BTreeSet::new(),
                    tags: BTreeMap::new(),
                    has_reserved_marker: false,
                },
                service_costs: HashMap::new(),
            });

        *acc.profile.daily_totals.entry(item.date).or_insert(0.0) += item.amount;
        acc.profile
            .families
            .insert(ServiceFamily::classify(&item.service, &item.usage_type));
        acc.profile
            .tags
            .extend(item.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        acc.profile.has_reserved_marker |= has_reserved_marker(item);
        *acc.service_costs.entry(item.service.clone()).or_insert(0.0) += item.amount;
    }

    by_resource
        .into_values()
        .map(|mut acc| {
            if let Some((service, _)) = acc
                .service_costs
                .drain()
                .max_by(|a, b| a.1.total_cmp(&b.1))
            {
                acc.profile.service = service;
            }
            acc.profile
        })
        .collect()
}

fn has_reserved_marker(item: &CostLineItem) -> bool {
    let usage = item.usage_type.to_lowercase();
    if usage.contains("reserved") || usage.contains("savingsplan") || usage.contains("commitment") {
        return true;
    }
    ["pricing_model", "purchase_option"].iter().any(|key| {
        item.tags
            .get(*key)
            .is_some_and(|v| !v.eq_ignore_ascii_case("on-demand") && !v.eq_ignore_ascii_case("ondemand"))
    })
}

// =============================================================================
// Detector Table
// =============================================================================

/// One registered detector rule.
pub struct Detector {
    /// Stable identifier for logging.
    pub id: &'static str,
    /// Rule implementation. Read-only over the profile.
    pub run: fn(&ResourceProfile, &PatternConfig, &PricingTable) -> Option<RecommendationCandidate>,
}

/// All detector rules, in evaluation order.
pub const DETECTORS: &[Detector] = &[
    Detector {
        id: "idle-resource",
        run: idle::detect,
    },
    Detector {
        id: "unused-storage",
        run: storage::detect,
    },
    Detector {
        id: "stale-snapshot",
        run: snapshot::detect,
    },
    Detector {
        id: "rightsize",
        run: rightsize::detect,
    },
    Detector {
        id: "reserved-capacity",
        run: reserved::detect,
    },
];

// =============================================================================
// Pattern Analyzer
// =============================================================================

/// Resource pattern analyzer, composed against the engine's ports.
pub struct PatternAnalyzer {
    ledger: Arc<dyn CostLedger>,
    accounts: Arc<dyn AccountStore>,
    config: PatternConfig,
    pricing: PricingTable,
}

impl PatternAnalyzer {
    /// Compose an analyzer from its collaborators.
    pub fn new(
        ledger: Arc<dyn CostLedger>,
        accounts: Arc<dyn AccountStore>,
        config: PatternConfig,
        pricing: PricingTable,
    ) -> Self {
        Self {
            ledger,
            accounts,
            config,
            pricing,
        }
    }

    /// Generate savings candidates for a tenant, optionally narrowed to one
    /// account, over the trailing window ending today.
    ///
    /// # Errors
    /// Propagates store failures and unknown account references.
    pub fn generate(
        &self,
        tenant_id: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<RecommendationCandidate>> {
        self.generate_as_of(tenant_id, account_id, Utc::now().date_naive())
    }

    /// Deterministic variant of [`generate`](Self::generate) with an
    /// explicit window end date.
    ///
    /// # Errors
    /// Propagates store failures and unknown account references.
    pub fn generate_as_of(
        &self,
        tenant_id: &str,
        account_id: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<Vec<RecommendationCandidate>> {
        let account_ids = self.eligible_accounts(tenant_id, account_id)?;
        let window = DateRange::last_days(as_of, self.config.window_days);

        let mut candidates = Vec::new();
        for account in &account_ids {
            let items = self.ledger.find_in_range(tenant_id, account, window)?;
            let profiles = build_profiles(tenant_id, window, &items);
            tracing::debug!(
                tenant = tenant_id,
                account = %account,
                resources = profiles.len(),
                line_items = items.len(),
                "built resource profiles"
            );

            for profile in &profiles {
                for detector in DETECTORS {
                    if let Some(candidate) = (detector.run)(profile, &self.config, &self.pricing) {
                        tracing::debug!(
                            detector = detector.id,
                            resource = %profile.resource_id,
                            savings = candidate.estimated_monthly_savings,
                            "detector proposed candidate"
                        );
                        candidates.push(candidate);
                    }
                }
            }
        }

        tracing::info!(
            tenant = tenant_id,
            accounts = account_ids.len(),
            candidates = candidates.len(),
            "pattern analysis complete"
        );
        Ok(candidates)
    }

    fn eligible_accounts(
        &self,
        tenant_id: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<String>> {
        match account_id {
            Some(id) => {
                let account =
                    self.accounts
                        .find_account(id)?
                        .ok_or_else(|| CapeError::AccountNotFound {
                            account_id: id.to_string(),
                        })?;
                if account.tenant_id != tenant_id {
                    return Err(CapeError::AccountNotFound {
                        account_id: id.to_string(),
                    });
                }
                Ok(vec![account.id])
            }
            None => Ok(self
                .accounts
                .active_accounts(tenant_id)?
                .into_iter()
                .map(|a| a.id)
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{line_item, window_ending};

    #[test]
    fn profiles_skip_unresolvable_resources() {
        let window = window_ending("2026-03-01", 30);
        let items = vec![
            line_item("2026-02-10", "Amazon EC2", 1.0, Some("i-1")),
            line_item("2026-02-10", "Amazon EC2", 1.0, Some("unknown")),
            line_item("2026-02-10", "Amazon EC2", 1.0, None),
        ];
        let profiles = build_profiles("t1", window, &items);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].resource_id, "i-1");
    }

    #[test]
    fn profile_aggregates_days_and_families() {
        let window = window_ending("2026-03-01", 30);
        let mut snapshot = line_item("2026-02-11", "Amazon EC2", 0.2, Some("i-1"));
        snapshot.usage_type = "EBS:SnapshotUsage".to_string();
        let items = vec![
            line_item("2026-02-10", "Amazon EC2", 1.0, Some("i-1")),
            line_item("2026-02-10", "Amazon EC2", 2.0, Some("i-1")),
            line_item("2026-02-11", "Amazon EC2", 3.0, Some("i-1")),
            snapshot,
        ];
        let profiles = build_profiles("t1", window, &items);
        assert_eq!(profiles.len(), 1);

        let profile = &profiles[0];
        assert_eq!(profile.days_present(), 2);
        assert!((profile.total_cost() - 6.2).abs() < 1e-9);
        assert!(profile.has_family(ServiceFamily::Compute));
        assert!(profile.has_family(ServiceFamily::Snapshot));
        assert!(!profile.only_family(ServiceFamily::Compute));
    }

    #[test]
    fn longest_run_spans_gaps() {
        let window = window_ending("2026-03-01", 30);
        let items = vec![
            line_item("2026-02-01", "Amazon EC2", 1.0, Some("i-1")),
            line_item("2026-02-02", "Amazon EC2", 1.0, Some("i-1")),
            line_item("2026-02-03", "Amazon EC2", 1.0, Some("i-1")),
            // gap
            line_item("2026-02-06", "Amazon EC2", 1.0, Some("i-1")),
            line_item("2026-02-07", "Amazon EC2", 1.0, Some("i-1")),
        ];
        let profiles = build_profiles("t1", window, &items);
        assert_eq!(profiles[0].longest_consecutive_run(), 3);
        assert_eq!(profiles[0].days_present(), 5);
    }

    #[test]
    fn cv_is_zero_for_constant_cost() {
        let window = window_ending("2026-03-01", 30);
        let items = vec![
            line_item("2026-02-01", "Amazon EC2", 2.0, Some("i-1")),
            line_item("2026-02-02", "Amazon EC2", 2.0, Some("i-1")),
        ];
        let profiles = build_profiles("t1", window, &items);
        assert!(profiles[0].daily_cost_cv() < 1e-9);
    }

    #[test]
    fn reserved_marker_detected_from_usage_type() {
        let window = window_ending("2026-03-01", 30);
        let mut reserved = line_item("2026-02-01", "Amazon EC2", 1.0, Some("i-1"));
        reserved.usage_type = "HeavyUsage:Reserved".to_string();
        let profiles = build_profiles("t1", window, &[reserved]);
        assert!(profiles[0].has_reserved_marker);

        let on_demand = line_item("2026-02-01", "Amazon EC2", 1.0, Some("i-2"));
        let profiles = build_profiles("t1", window, &[on_demand]);
        assert!(!profiles[0].has_reserved_marker);
    }

    #[test]
    fn dominant_service_wins() {
        let window = window_ending("2026-03-01", 30);
        let mut transfer = line_item("2026-02-01", "AWS Data Transfer", 0.1, Some("i-1"));
        transfer.usage_type = "DataTransfer-Out".to_string();
        let items = vec![
            line_item("2026-02-01", "Amazon EC2", 5.0, Some("i-1")),
            transfer,
        ];
        let profiles = build_profiles("t1", window, &items);
        assert_eq!(profiles[0].service, "Amazon EC2");
    }
}
