//! Domain events and sinks.
//!
//! Events are handed to an explicit sink injected into each component; there
//! is no global emitter. Delivery is fire-and-forget: a sink must never fail
//! the operation that produced the event.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::models::{Priority, RecommendationKind, Severity};
use crate::core::provider::CloudProvider;

// =============================================================================
// Events
// =============================================================================

/// Domain events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A new anomaly was created by the baseline analyzer.
    #[serde(rename = "cost.anomaly.detected")]
    #[serde(rename_all = "camelCase")]
    AnomalyDetected {
        tenant_id: String,
        anomaly_id: i64,
        provider: CloudProvider,
        severity: Severity,
        expected_cost: f64,
        actual_cost: f64,
        service: String,
        date: NaiveDate,
    },

    /// A new recommendation was created by the dedup/merge engine.
    #[serde(rename = "recommendation.generated")]
    #[serde(rename_all = "camelCase")]
    RecommendationGenerated {
        tenant_id: String,
        recommendation_id: i64,
        kind: RecommendationKind,
        estimated_savings: f64,
        priority: Priority,
        provider: CloudProvider,
        service: String,
        resource_id: String,
    },
}

impl DomainEvent {
    /// Dotted event name for routing.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AnomalyDetected { .. } => "cost.anomaly.detected",
            Self::RecommendationGenerated { .. } => "recommendation.generated",
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Fan-out target for domain events.
///
/// Infallible by contract: implementations swallow and log their own delivery
/// failures.
pub trait EventSink: Send + Sync {
    /// Deliver one event, best-effort.
    fn emit(&self, event: &DomainEvent);
}

/// Sink that logs every event as a structured tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &DomainEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                tracing::info!(event = event.name(), payload = %payload, "domain event");
            }
            Err(e) => {
                tracing::warn!(event = event.name(), error = %e, "failed to serialize event");
            }
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &DomainEvent) {}
}
