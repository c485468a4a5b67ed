//! Engine configuration.
//!
//! Loads configuration from a TOML file with built-in defaults for every
//! tunable. Resolution precedence (highest first):
//!
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `CAPE_CONFIG`: Override config file path
//! - `CAPE_DB_PATH`: Override database path
//! - `CAPE_LOG`, `CAPE_LOG_FORMAT`, `CAPE_LOG_FILE`: see the logging module

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{CapeError, Result};

/// Environment variable to override the config file path.
pub const ENV_CONFIG: &str = "CAPE_CONFIG";
/// Environment variable to override the database path.
pub const ENV_DB_PATH: &str = "CAPE_DB_PATH";

// =============================================================================
// Baseline Analyzer
// =============================================================================

/// Tunables for the baseline analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BaselineConfig {
    /// Trailing window length in days.
    pub window_days: u32,
    /// Absolute deviation percentage above which an anomaly is created.
    pub deviation_threshold_pct: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            deviation_threshold_pct: 50.0,
        }
    }
}

// =============================================================================
// Resource Pattern Analyzer
// =============================================================================

/// Tunables for the pattern detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PatternConfig {
    /// Analysis window length in days.
    pub window_days: u32,

    /// Minimum days of data before a resource can be called idle.
    pub idle_min_days: u32,
    /// Idle when `avg_daily / expected_minimum` is below this ratio.
    pub idle_cost_ratio: f64,
    /// Fraction of the idle resource's spend recoverable by stopping it.
    pub idle_recovery_factor: f64,

    /// Minimum days of storage-only presence for an unused-storage finding.
    pub unused_min_days: u32,
    /// Minimum monthly savings before an unused-storage finding is emitted.
    pub unused_min_monthly_usd: f64,

    /// Minimum days of presence (of the window) for a stale snapshot.
    pub snapshot_min_days: u32,
    /// Minimum monthly savings before a stale-snapshot finding is emitted.
    pub snapshot_min_monthly_usd: f64,

    /// Minimum days of data before rightsizing is considered.
    pub rightsize_min_days: u32,
    /// Maximum coefficient of variation of daily cost to call it consistent.
    pub rightsize_max_cv: f64,

    /// Minimum consecutive days of cost for a reserved-capacity finding.
    pub reserved_min_consecutive_days: u32,
    /// Minimum average daily cost for a reserved-capacity finding.
    pub reserved_min_avg_daily_usd: f64,
    /// Fixed discount estimate applied for committed use.
    pub reserved_discount: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            idle_min_days: 25,
            idle_cost_ratio: 0.05,
            idle_recovery_factor: 0.95,
            unused_min_days: 20,
            unused_min_monthly_usd: 5.0,
            snapshot_min_days: 28,
            snapshot_min_monthly_usd: 2.0,
            rightsize_min_days: 25,
            rightsize_max_cv: 0.30,
            reserved_min_consecutive_days: 28,
            reserved_min_avg_daily_usd: 1.0,
            reserved_discount: 0.35,
        }
    }
}

// =============================================================================
// Reconcile + Retention
// =============================================================================

/// Tunables for the dedup/merge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReconcileConfig {
    /// Relative savings change below which an open recommendation is left
    /// untouched.
    pub update_tolerance: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            update_tolerance: 0.10,
        }
    }
}

/// Ledger retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetentionConfig {
    /// Days of cost line items kept before pruning.
    pub ledger_retention_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ledger_retention_days: 400,
        }
    }
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub baseline: BaselineConfig,
    pub patterns: PatternConfig,
    pub reconcile: ReconcileConfig,
    pub retention: RetentionConfig,

    /// Database path override. Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

impl EngineConfig {
    /// Load configuration, merging the config file over built-in defaults.
    ///
    /// An explicit `path` must exist; the default path is optional and falls
    /// back to defaults when absent.
    ///
    /// # Errors
    /// Returns `ConfigNotFound` for a missing explicit path and `ConfigParse`
    /// for invalid TOML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match std::env::var(ENV_CONFIG) {
                Ok(p) if !p.trim().is_empty() => (PathBuf::from(p), true),
                _ => (Self::default_config_path(), false),
            },
        };

        if !path.exists() {
            if required {
                return Err(CapeError::ConfigNotFound {
                    path: path.display().to_string(),
                });
            }
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content).map_err(|e| CapeError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        fn positive(key: &str, value: f64) -> Result<()> {
            if value > 0.0 {
                Ok(())
            } else {
                Err(CapeError::ConfigInvalid {
                    key: key.to_string(),
                    message: format!("must be greater than 0, got {value}"),
                })
            }
        }
        fn ratio(key: &str, value: f64) -> Result<()> {
            if value > 0.0 && value < 1.0 {
                Ok(())
            } else {
                Err(CapeError::ConfigInvalid {
                    key: key.to_string(),
                    message: format!("must be between 0 and 1 exclusive, got {value}"),
                })
            }
        }

        positive("baseline.window-days", f64::from(self.baseline.window_days))?;
        positive(
            "baseline.deviation-threshold-pct",
            self.baseline.deviation_threshold_pct,
        )?;
        positive("patterns.window-days", f64::from(self.patterns.window_days))?;
        ratio("patterns.idle-cost-ratio", self.patterns.idle_cost_ratio)?;
        ratio(
            "patterns.idle-recovery-factor",
            self.patterns.idle_recovery_factor,
        )?;
        ratio("patterns.reserved-discount", self.patterns.reserved_discount)?;
        ratio("reconcile.update-tolerance", self.reconcile.update_tolerance)?;
        positive("patterns.rightsize-max-cv", self.patterns.rightsize_max_cv)?;
        positive(
            "retention.ledger-retention-days",
            self.retention.ledger_retention_days as f64,
        )?;

        if self.patterns.snapshot_min_days > self.patterns.window_days {
            return Err(CapeError::ConfigInvalid {
                key: "patterns.snapshot-min-days".to_string(),
                message: "cannot exceed patterns.window-days".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved database path: CLI/env override first, then config file,
    /// then the platform default.
    #[must_use]
    pub fn database_path(&self, cli_override: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_override {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var(ENV_DB_PATH) {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        self.database
            .clone()
            .unwrap_or_else(Self::default_db_path)
    }

    /// Default config file location.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        ProjectDirs::from("com", "capelabs", "cape").map_or_else(
            || PathBuf::from("cape.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Default database location.
    #[must_use]
    pub fn default_db_path() -> PathBuf {
        ProjectDirs::from("com", "capelabs", "cape").map_or_else(
            || PathBuf::from("cape.db"),
            |dirs| dirs.data_dir().join("cape.db"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.baseline.window_days, 30);
        assert!((config.baseline.deviation_threshold_pct - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.patterns.reserved_min_consecutive_days, 28);
    }

    #[test]
    fn parse_partial_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            [baseline]
            window-days = 14
            [patterns]
            idle-cost-ratio = 0.10
            "#,
        )
        .unwrap();
        assert_eq!(config.baseline.window_days, 14);
        // Untouched fields keep defaults
        assert!((config.baseline.deviation_threshold_pct - 50.0).abs() < f64::EPSILON);
        assert!((config.patterns.idle_cost_ratio - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.patterns.unused_min_days, 20);
    }

    #[test]
    fn invalid_ratio_rejected() {
        let mut config = EngineConfig::default();
        config.patterns.idle_cost_ratio = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("idle-cost-ratio"));
    }

    #[test]
    fn snapshot_days_cannot_exceed_window() {
        let mut config = EngineConfig::default();
        config.patterns.snapshot_min_days = 45;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_explicit_config_errors() {
        let err = EngineConfig::load(Some(Path::new("/nonexistent/cape.toml"))).unwrap_err();
        assert!(matches!(err, CapeError::ConfigNotFound { .. }));
    }

    #[test]
    fn malformed_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "baseline = 'not a table'").unwrap();
        let err = EngineConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, CapeError::ConfigParse { .. }));
    }
}
