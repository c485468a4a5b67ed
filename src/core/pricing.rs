//! Instance size pricing for the rightsizing and idle detectors.
//!
//! A static on-demand price table keyed by normalized size name, plus the
//! "one tier down" mapping used to cost rightsizing proposals. Rates are
//! approximate published on-demand hourly prices; the detectors only need
//! them for savings estimates, not billing-grade accuracy.

use std::collections::{BTreeMap, HashMap};

/// Fallback minimum daily running cost for a compute resource whose size
/// cannot be resolved from its tags. Matches the smallest tier in the table
/// (hourly rate x 24).
pub const DEFAULT_MIN_RUNNING_DAILY_USD: f64 = 0.125;

/// Tag keys checked, in order, when resolving a resource's size.
const SIZE_TAG_KEYS: &[&str] = &[
    "instance_type",
    "instanceType",
    "size",
    "vm_size",
    "machine_type",
];

/// On-demand price table with a downsize mapping.
#[derive(Debug, Clone)]
pub struct PricingTable {
    /// Normalized size name to hourly USD rate.
    hourly: HashMap<String, f64>,
    /// Normalized size name to the next size down in the same family.
    downsize: HashMap<String, String>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::current()
    }
}

impl PricingTable {
    /// Build the current static table.
    #[must_use]
    pub fn current() -> Self {
        let mut table = Self {
            hourly: HashMap::new(),
            downsize: HashMap::new(),
        };

        // AWS burstable and general-purpose tiers
        table.add_family(&[
            ("t3.nano", 0.0052),
            ("t3.micro", 0.0104),
            ("t3.small", 0.0208),
            ("t3.medium", 0.0416),
            ("t3.large", 0.0832),
            ("t3.xlarge", 0.1664),
            ("t3.2xlarge", 0.3328),
        ]);
        table.add_family(&[
            ("m5.large", 0.096),
            ("m5.xlarge", 0.192),
            ("m5.2xlarge", 0.384),
            ("m5.4xlarge", 0.768),
        ]);

        // Azure B-series and Dsv3
        table.add_family(&[("standard_b1s", 0.0104), ("standard_b2s", 0.0416)]);
        table.add_family(&[
            ("standard_d2s_v3", 0.096),
            ("standard_d4s_v3", 0.192),
            ("standard_d8s_v3", 0.384),
        ]);

        // GCP e2 shared-core and standard
        table.add_family(&[
            ("e2-micro", 0.0084),
            ("e2-small", 0.0168),
            ("e2-medium", 0.0335),
        ]);
        table.add_family(&[
            ("e2-standard-2", 0.067),
            ("e2-standard-4", 0.134),
            ("e2-standard-8", 0.268),
        ]);

        table
    }

    /// Register a family ordered smallest to largest; each size downsizes to
    /// its left neighbor.
    fn add_family(&mut self, sizes: &[(&str, f64)]) {
        for (i, (size, rate)) in sizes.iter().enumerate() {
            self.hourly.insert((*size).to_string(), *rate);
            if i > 0 {
                self.downsize
                    .insert((*size).to_string(), sizes[i - 1].0.to_string());
            }
        }
    }

    /// Hourly on-demand rate for a size, if known.
    #[must_use]
    pub fn hourly_rate(&self, size: &str) -> Option<f64> {
        self.hourly.get(&normalize(size)).copied()
    }

    /// The next size down with a strictly lower rate, if one exists.
    ///
    /// Returns the target size name and its hourly rate. The smallest tier
    /// of each family has no downsize target.
    #[must_use]
    pub fn one_tier_down(&self, size: &str) -> Option<(&str, f64)> {
        let current = self.hourly_rate(size)?;
        let target = self.downsize.get(&normalize(size))?;
        let target_rate = self.hourly.get(target).copied()?;
        (target_rate < current).then_some((target.as_str(), target_rate))
    }

    /// Expected minimum daily running cost for a resource.
    ///
    /// Resolvable size: its hourly rate x 24. Otherwise the smallest-tier
    /// floor, so the idle test stays meaningful for untagged resources.
    #[must_use]
    pub fn minimum_daily_cost(&self, size: Option<&str>) -> f64 {
        size.and_then(|s| self.hourly_rate(s))
            .map_or(DEFAULT_MIN_RUNNING_DAILY_USD, |rate| rate * 24.0)
    }
}

/// Find a resource's size from its tags, checking the known tag keys in
/// order.
#[must_use]
pub fn resolve_size_tag(tags: &BTreeMap<String, String>) -> Option<&str> {
    SIZE_TAG_KEYS
        .iter()
        .find_map(|key| tags.get(*key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn normalize(size: &str) -> String {
    size.trim().to_lowercase()
}
