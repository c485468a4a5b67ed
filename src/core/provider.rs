//! Cloud provider descriptors and service family taxonomy.
//!
//! Defines the supported cloud providers and the coarse service families the
//! pattern detectors reason about. Family classification works from the
//! service name and usage type of a line item; it is a best-effort mapping
//! and unknown services fall into `Other`.

use serde::{Deserialize, Serialize};

use crate::error::{CapeError, Result};

// =============================================================================
// Provider Enum
// =============================================================================

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
}

impl CloudProvider {
    /// All providers in display order.
    pub const ALL: &'static [Self] = &[Self::Aws, Self::Azure, Self::Gcp];

    /// Canonical lowercase name, used in natural keys and storage.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Azure => "Azure",
            Self::Gcp => "Google Cloud",
        }
    }

    /// Parse from an account's provider field.
    ///
    /// # Errors
    /// Returns `InvalidProviderName` for values with no known provider.
    pub fn parse(name: &str) -> Result<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.name() == lower)
            .copied()
            .ok_or_else(|| CapeError::InvalidProviderName(name.to_string()))
    }

    /// Default per-account fetch timeout in seconds for this provider's
    /// billing APIs.
    #[must_use]
    pub const fn default_timeout_secs(self) -> u64 {
        match self {
            // Cost Explorer is slow on wide date ranges
            Self::Aws => 60,
            Self::Azure | Self::Gcp => 45,
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Service Families
// =============================================================================

/// Coarse classification of a billed service, used by the pattern detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceFamily {
    /// Instances/VMs and other always-on compute.
    Compute,
    /// Block/object storage volumes and buckets.
    Storage,
    /// Point-in-time snapshots and machine images.
    Snapshot,
    /// Managed databases.
    Database,
    /// Everything else.
    Other,
}

impl ServiceFamily {
    /// Classify a line item by service name and usage type.
    ///
    /// Usage type wins over service name: an EBS snapshot bills under the
    /// EC2 service but carries a snapshot usage type.
    #[must_use]
    pub fn classify(service: &str, usage_type: &str) -> Self {
        let service = service.to_lowercase();
        let usage = usage_type.to_lowercase();

        if usage.contains("snapshot") || service.contains("snapshot") {
            return Self::Snapshot;
        }
        if Self::is_compute(&service) {
            return Self::Compute;
        }
        if Self::is_storage(&service, &usage) {
            return Self::Storage;
        }
        if Self::is_database(&service) {
            return Self::Database;
        }
        Self::Other
    }

    fn is_compute(service: &str) -> bool {
        const MARKERS: &[&str] = &[
            "ec2",
            "elastic compute",
            "virtual machines",
            "compute engine",
        ];
        MARKERS.iter().any(|m| service.contains(m))
    }

    fn is_storage(service: &str, usage: &str) -> bool {
        const MARKERS: &[&str] = &[
            "s3",
            "simple storage",
            "ebs",
            "blob storage",
            "managed disks",
            "cloud storage",
            "persistent disk",
        ];
        MARKERS.iter().any(|m| service.contains(m)) || usage.contains("volumeusage")
    }

    fn is_database(service: &str) -> bool {
        const MARKERS: &[&str] = &["rds", "dynamodb", "sql database", "cosmos", "cloud sql"];
        MARKERS.iter().any(|m| service.contains(m))
    }
}
