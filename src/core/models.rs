//! Canonical cost model.
//!
//! These types are the shared vocabulary of the engine: the cost ledger line
//! item, detected anomalies, savings recommendations, and the structured
//! outcome types returned by each pipeline so a batch driver can aggregate
//! partial success without exceptions.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::provider::CloudProvider;
use crate::error::{CapeError, Result};

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive day-granularity date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, validating ordering.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(CapeError::ConfigInvalid {
                key: "dateRange".to_string(),
                message: format!("start {start} is after end {end}"),
            });
        }
        Ok(Self { start, end })
    }

    /// The trailing window of `days` days ending the day before `date`.
    ///
    /// The reference date itself is excluded so an analysis never compares a
    /// day against itself.
    #[must_use]
    pub fn trailing_window(date: NaiveDate, days: u32) -> Self {
        let end = date - Duration::days(1);
        let start = date - Duration::days(i64::from(days));
        Self { start, end }
    }

    /// The window of `days` days ending on `end` inclusive.
    #[must_use]
    pub fn last_days(end: NaiveDate, days: u32) -> Self {
        let start = end - Duration::days(i64::from(days) - 1);
        Self { start, end }
    }

    /// Number of days covered, inclusive.
    #[must_use]
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Iterate the days in the range.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    /// Whether `date` falls inside the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

// =============================================================================
// Cost Line Item
// =============================================================================

/// One billed usage record for a service on a given day.
///
/// Immutable and append-only. The natural key is
/// `(tenant, account, date, provider, service, usage type, resource id)`;
/// re-inserting an item with the same natural key is a silent no-op at the
/// store layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLineItem {
    pub tenant_id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub provider: CloudProvider,
    pub service: String,
    pub usage_type: String,
    /// Billed amount. Always >= 0.
    pub amount: f64,
    pub currency: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl CostLineItem {
    /// Composite natural key used for idempotent persistence.
    ///
    /// A missing resource id contributes an empty segment so that two items
    /// differing only in resource presence still get distinct keys.
    #[must_use]
    pub fn natural_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.tenant_id,
            self.account_id,
            self.date,
            self.provider.name(),
            self.service,
            self.usage_type,
            self.resource_id.as_deref().unwrap_or("")
        )
    }

    /// Resource id when present and resolvable.
    ///
    /// The literal `"unknown"` marker some providers emit counts as
    /// unresolved, so no detector ever proposes action against it.
    #[must_use]
    pub fn resolved_resource_id(&self) -> Option<&str> {
        match self.resource_id.as_deref() {
            None | Some("" | "unknown") => None,
            Some(id) => Some(id),
        }
    }
}

/// Per-service daily total, as returned by the ledger's grouped query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDailyTotal {
    pub service: String,
    pub provider: CloudProvider,
    pub total: f64,
}

// =============================================================================
// Cloud Account
// =============================================================================

/// Lifecycle status of a registered cloud account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Inactive,
}

impl AccountStatus {
    /// Canonical storage string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Parse from storage string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("inactive") {
            Self::Inactive
        } else {
            Self::Active
        }
    }
}

/// Encrypted credential blob as stored alongside an account.
///
/// All three fields are base64. The core never inspects the plaintext; it
/// hands the blob to the vault and receives structured credentials back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlob {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

/// Decrypted provider credentials.
///
/// An open map keyed by provider-specific field names (access keys, tenant
/// ids, service-account JSON). Deliberately opaque to the engine and
/// intentionally without a `Debug` representation of its values.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(flatten)]
    fields: BTreeMap<String, String>,
}

impl ProviderCredentials {
    /// Build from raw fields.
    #[must_use]
    pub const fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    /// Fetch a credential field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// True when no fields were decrypted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// Redacted: credential values must never reach logs or error messages.
impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("fields", &format!("<{} redacted>", self.fields.len()))
            .finish()
    }
}

/// A cloud-provider account registered under a tenant.
///
/// External entity: the engine reads it and writes only the last-sync
/// watermark after a successful collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudAccount {
    pub id: String,
    pub tenant_id: String,
    /// Raw provider field as registered. Parsed at collection time so an
    /// unknown value surfaces as `UnsupportedProvider` in the outcome,
    /// not as a load failure.
    pub provider: String,
    pub status: AccountStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,

    pub credentials: EncryptedBlob,
}

// =============================================================================
// Anomaly
// =============================================================================

/// Deviation-magnitude bucket for anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Classify by absolute deviation percentage.
    ///
    /// Thresholds are strict: a deviation of exactly 200% is `High`'s lower
    /// neighbor `Medium`, never both and never none.
    #[must_use]
    pub fn from_deviation(deviation_pct: f64) -> Self {
        let magnitude = deviation_pct.abs();
        if magnitude > 500.0 {
            Self::Critical
        } else if magnitude > 200.0 {
            Self::High
        } else if magnitude > 100.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Canonical storage string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse from storage string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Investigation status of an anomaly. Transitions after creation are made
/// by external actors, not the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStatus {
    #[default]
    Open,
    Investigating,
    Resolved,
    Dismissed,
}

impl AnomalyStatus {
    /// Canonical storage string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }

    /// Parse from storage string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "investigating" => Self::Investigating,
            "resolved" => Self::Resolved,
            "dismissed" => Self::Dismissed,
            _ => Self::Open,
        }
    }
}

/// A flagged deviation of actual vs. baseline cost for a service/day.
///
/// At most one exists per `(tenant, service, date, provider)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub tenant_id: String,
    pub date: NaiveDate,
    pub service: String,
    pub provider: CloudProvider,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    pub expected_cost: f64,
    pub actual_cost: f64,
    pub deviation_pct: f64,
    pub severity: Severity,
    pub status: AnomalyStatus,
    pub detected_at: DateTime<Utc>,
}

// =============================================================================
// Recommendation
// =============================================================================

/// Kind of savings opportunity a detector proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationKind {
    Idle,
    Rightsize,
    Unused,
    StaleSnapshot,
    ReservedCapacity,
}

impl RecommendationKind {
    /// Canonical storage string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Rightsize => "rightsize",
            Self::Unused => "unused",
            Self::StaleSnapshot => "stale-snapshot",
            Self::ReservedCapacity => "reserved-capacity",
        }
    }

    /// Parse from storage string.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` for unknown kinds.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(Self::Idle),
            "rightsize" => Ok(Self::Rightsize),
            "unused" => Ok(Self::Unused),
            "stale-snapshot" => Ok(Self::StaleSnapshot),
            "reserved-capacity" => Ok(Self::ReservedCapacity),
            other => Err(CapeError::ConfigInvalid {
                key: "recommendationKind".to_string(),
                message: format!("unknown kind: {other}"),
            }),
        }
    }
}

/// Savings-magnitude urgency bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Derive priority from estimated monthly savings.
    #[must_use]
    pub fn from_monthly_savings(savings: f64) -> Self {
        if savings >= 500.0 {
            Self::High
        } else if savings >= 100.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Canonical storage string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parse from storage string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Application status of a recommendation. Once applied or dismissed by an
/// external actor, the engine treats the row as frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    #[default]
    Open,
    Applied,
    Dismissed,
}

impl RecommendationStatus {
    /// Canonical storage string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Applied => "applied",
            Self::Dismissed => "dismissed",
        }
    }

    /// Parse from storage string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "applied" => Self::Applied,
            "dismissed" => Self::Dismissed,
            _ => Self::Open,
        }
    }
}

/// A persisted cost-saving proposal for a specific resource.
///
/// At most one **open** row exists per `(tenant, resource id, kind)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub tenant_id: String,
    pub kind: RecommendationKind,
    pub priority: Priority,
    pub provider: CloudProvider,
    pub service: String,
    pub resource_id: String,
    /// Estimated monthly savings in USD. Always >= 0.
    pub estimated_monthly_savings: f64,
    pub savings_period: String,
    pub status: RecommendationStatus,
    pub description: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A not-yet-persisted recommendation produced by a detector.
///
/// The dedup/merge engine decides whether it becomes a new row, an in-place
/// update, or a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationCandidate {
    pub tenant_id: String,
    pub kind: RecommendationKind,
    pub provider: CloudProvider,
    pub service: String,
    pub resource_id: String,
    pub estimated_monthly_savings: f64,
    pub description: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RecommendationCandidate {
    /// Priority derived from the candidate's savings estimate.
    #[must_use]
    pub fn priority(&self) -> Priority {
        Priority::from_monthly_savings(self.estimated_monthly_savings)
    }
}

// =============================================================================
// Pipeline Outcomes
// =============================================================================

/// Structured result of one account collection run.
///
/// The orchestrator never throws at its caller; failures are recorded here
/// so a batch driver can continue with other accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionOutcome {
    pub account_id: String,
    pub success: bool,
    pub records_obtained: usize,
    pub records_saved: usize,
    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl CollectionOutcome {
    /// Successful outcome.
    #[must_use]
    pub const fn success(
        account_id: String,
        records_obtained: usize,
        records_saved: usize,
        duration_ms: u64,
    ) -> Self {
        Self {
            account_id,
            success: true,
            records_obtained,
            records_saved,
            duration_ms,
            errors: Vec::new(),
        }
    }

    /// Failed outcome carrying the error that stopped the pipeline.
    #[must_use]
    pub fn failure(account_id: String, duration_ms: u64, error: &CapeError) -> Self {
        Self {
            account_id,
            success: false,
            records_obtained: 0,
            records_saved: 0,
            duration_ms,
            errors: vec![format!("{}: {error}", error.error_code())],
        }
    }
}

/// Aggregate view over a multi-account batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<CollectionOutcome>,
}

impl BatchOutcome {
    /// Aggregate individual outcomes into batch counts.
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<CollectionOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;
        Self {
            succeeded,
            failed,
            outcomes,
        }
    }

    /// Bounded list of human-readable error strings across the batch.
    #[must_use]
    pub fn errors(&self, limit: usize) -> Vec<String> {
        self.outcomes
            .iter()
            .flat_map(|o| o.errors.iter().cloned())
            .take(limit)
            .collect()
    }
}

/// Result of one baseline analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineReport {
    pub anomalies_detected: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Result of one reconcile pass over recommendation candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// New recommendations persisted.
    pub created: usize,
    /// Existing open recommendations updated in place.
    pub updated: usize,
    /// Candidates that matched an open row within tolerance.
    pub unchanged: usize,
}

impl ReconcileReport {
    /// Newly created rows only; updates and no-ops do not count.
    #[must_use]
    pub const fn saved_count(&self) -> usize {
        self.created
    }
}

// =============================================================================
// Robot Output Envelope
// =============================================================================

/// Top-level JSON envelope for robot mode output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,

    #[serde(default)]
    pub errors: Vec<String>,
}

impl<T> RobotOutput<T> {
    /// Create a new robot output envelope.
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: "cape.v1".to_string(),
            generated_at: Utc::now(),
            command: command.into(),
            data,
            errors: Vec::new(),
        }
    }

    /// Create with errors.
    pub fn with_errors(command: impl Into<String>, data: T, errors: Vec<String>) -> Self {
        Self {
            errors,
            ..Self::new(command, data)
        }
    }
}
