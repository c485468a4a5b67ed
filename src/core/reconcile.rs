//! Dedup/merge engine for recommendation candidates.
//!
//! Reconciles each candidate against the existing open recommendation for
//! its `(tenant, resource, kind)` key: create when absent, update in place
//! when the savings estimate moved beyond tolerance, no-op otherwise. Keys
//! already applied or dismissed by an external actor are frozen and never
//! reopened or duplicated.

use std::sync::Arc;

use crate::core::config::ReconcileConfig;
use crate::core::events::{DomainEvent, EventSink};
use crate::core::models::{
    Recommendation, RecommendationCandidate, RecommendationStatus, ReconcileReport,
};
use crate::core::ports::RecommendationStore;
use crate::error::Result;

/// Dedup/merge engine, composed against the engine's ports.
pub struct ReconcileEngine {
    recommendations: Arc<dyn RecommendationStore>,
    events: Arc<dyn EventSink>,
    config: ReconcileConfig,
}

impl ReconcileEngine {
    /// Compose the engine from its collaborators.
    pub fn new(
        recommendations: Arc<dyn RecommendationStore>,
        events: Arc<dyn EventSink>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            recommendations,
            events,
            config,
        }
    }

    /// Reconcile candidates into the recommendation store.
    ///
    /// Idempotent: re-running against an unchanged ledger creates zero rows
    /// and performs zero updates on the second pass.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn reconcile(
        &self,
        tenant_id: &str,
        candidates: &[RecommendationCandidate],
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for candidate in candidates {
            if candidate.tenant_id != tenant_id {
                tracing::warn!(
                    tenant = tenant_id,
                    candidate_tenant = %candidate.tenant_id,
                    resource = %candidate.resource_id,
                    "skipping candidate from another tenant"
                );
                continue;
            }

            match self.recommendations.find_open(
                tenant_id,
                &candidate.resource_id,
                candidate.kind,
            )? {
                Some(existing) => self.merge(candidate, &existing, &mut report)?,
                None => self.create_unless_frozen(tenant_id, candidate, &mut report)?,
            }
        }

        tracing::info!(
            tenant = tenant_id,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            "reconcile complete"
        );
        Ok(report)
    }

    fn merge(
        &self,
        candidate: &RecommendationCandidate,
        existing: &Recommendation,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let old = existing.estimated_monthly_savings;
        let new = candidate.estimated_monthly_savings;
        let changed_beyond_tolerance = if old == 0.0 {
            new != 0.0
        } else {
            ((new - old) / old).abs() > self.config.update_tolerance
        };

        if !changed_beyond_tolerance {
            report.unchanged += 1;
            return Ok(());
        }

        let Some(id) = existing.id else {
            report.unchanged += 1;
            return Ok(());
        };

        self.recommendations
            .update_in_place(id, new, candidate.priority(), &candidate.description)?;
        tracing::debug!(
            recommendation = id,
            resource = %candidate.resource_id,
            old_savings = old,
            new_savings = new,
            "updated recommendation in place"
        );
        report.updated += 1;
        Ok(())
    }

    fn create_unless_frozen(
        &self,
        tenant_id: &str,
        candidate: &RecommendationCandidate,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        // An applied/dismissed row holds the key frozen: never reopen it,
        // never create a sibling.
        if let Some(frozen) = self.recommendations.find_latest(
            tenant_id,
            &candidate.resource_id,
            candidate.kind,
        )? {
            tracing::debug!(
                resource = %candidate.resource_id,
                kind = candidate.kind.as_str(),
                status = frozen.status.as_str(),
                "key is frozen, skipping candidate"
            );
            report.unchanged += 1;
            return Ok(());
        }

        let recommendation = Recommendation {
            id: None,
            tenant_id: tenant_id.to_string(),
            kind: candidate.kind,
            priority: candidate.priority(),
            provider: candidate.provider,
            service: candidate.service.clone(),
            resource_id: candidate.resource_id.clone(),
            estimated_monthly_savings: candidate.estimated_monthly_savings,
            savings_period: "monthly".to_string(),
            status: RecommendationStatus::Open,
            description: candidate.description.clone(),
            metadata: candidate.metadata.clone(),
        };

        let id = self.recommendations.insert(&recommendation)?;
        self.events.emit(&DomainEvent::RecommendationGenerated {
            tenant_id: tenant_id.to_string(),
            recommendation_id: id,
            kind: candidate.kind,
            estimated_savings: candidate.estimated_monthly_savings,
            priority: candidate.priority(),
            provider: candidate.provider,
            service: candidate.service.clone(),
            resource_id: candidate.resource_id.clone(),
        });
        report.created += 1;
        Ok(())
    }
}
