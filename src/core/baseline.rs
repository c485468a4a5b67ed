//! Baseline analyzer.
//!
//! Per-(tenant, account, date) pipeline: sum the day's costs per service,
//! compare each against the mean of that service's daily totals over the
//! trailing window ending the day before, and create an anomaly for every
//! deviation beyond the threshold. Dedup by existence check backed by the
//! store's unique key, so re-running the same day never adds anomalies.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::core::config::BaselineConfig;
use crate::core::events::{DomainEvent, EventSink};
use crate::core::models::{Anomaly, AnomalyStatus, BaselineReport, DateRange, Severity};
use crate::core::ports::{AnomalyStore, CostLedger};
use crate::core::provider::CloudProvider;
use crate::error::Result;

/// Baseline analyzer, composed against the engine's ports.
pub struct BaselineAnalyzer {
    ledger: Arc<dyn CostLedger>,
    anomalies: Arc<dyn AnomalyStore>,
    events: Arc<dyn EventSink>,
    config: BaselineConfig,
}

impl BaselineAnalyzer {
    /// Compose an analyzer from its collaborators.
    pub fn new(
        ledger: Arc<dyn CostLedger>,
        anomalies: Arc<dyn AnomalyStore>,
        events: Arc<dyn EventSink>,
        config: BaselineConfig,
    ) -> Self {
        Self {
            ledger,
            anomalies,
            events,
            config,
        }
    }

    /// Analyze one account's costs on `date` against trailing baselines.
    ///
    /// Idempotent: a second run over unchanged ledger contents detects
    /// nothing new. Deterministic given identical ledger contents.
    ///
    /// # Errors
    /// Propagates store failures; everything else is handled per service.
    pub fn analyze(
        &self,
        tenant_id: &str,
        account_id: &str,
        date: NaiveDate,
    ) -> Result<BaselineReport> {
        let totals = self.ledger.sum_by_service(tenant_id, account_id, date)?;
        if totals.is_empty() {
            tracing::debug!(tenant = tenant_id, account = account_id, %date, "no costs on date");
            return Ok(BaselineReport {
                anomalies_detected: 0,
                anomalies: Vec::new(),
            });
        }

        let window = DateRange::trailing_window(date, self.config.window_days);
        let history = self.baselines(tenant_id, account_id, window)?;

        let mut anomalies = Vec::new();
        for total in totals {
            if total.total <= 0.0 {
                continue;
            }

            let baseline = history
                .get(&service_key(&total.service, total.provider))
                .copied()
                .unwrap_or(0.0);
            // No history: a brand-new service is not an anomaly.
            if baseline == 0.0 {
                continue;
            }

            let deviation_pct = (total.total - baseline) / baseline * 100.0;
            if deviation_pct.abs() <= self.config.deviation_threshold_pct {
                continue;
            }

            if let Some(anomaly) = self.create_anomaly(
                tenant_id,
                date,
                &total.service,
                total.provider,
                baseline,
                total.total,
                deviation_pct,
            )? {
                anomalies.push(anomaly);
            }
        }

        tracing::info!(
            tenant = tenant_id,
            account = account_id,
            %date,
            anomalies_detected = anomalies.len(),
            "baseline analysis complete"
        );
        Ok(BaselineReport {
            anomalies_detected: anomalies.len(),
            anomalies,
        })
    }

    /// Mean daily total per service over the window, considering only days
    /// that have totals. An absent service yields no entry (baseline 0).
    fn baselines(
        &self,
        tenant_id: &str,
        account_id: &str,
        window: DateRange,
    ) -> Result<HashMap<String, f64>> {
        let items = self.ledger.find_in_range(tenant_id, account_id, window)?;

        // service key -> date -> daily total
        let mut daily: HashMap<String, HashMap<NaiveDate, f64>> = HashMap::new();
        for item in items {
            *daily
                .entry(service_key(&item.service, item.provider))
                .or_default()
                .entry(item.date)
                .or_insert(0.0) += item.amount;
        }

        Ok(daily
            .into_iter()
            .map(|(key, days)| {
                let sum: f64 = days.values().sum();
                let mean = sum / days.len() as f64;
                (key, mean)
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn create_anomaly(
        &self,
        tenant_id: &str,
        date: NaiveDate,
        service: &str,
        provider: CloudProvider,
        expected: f64,
        actual: f64,
        deviation_pct: f64,
    ) -> Result<Option<Anomaly>> {
        // Existence check first; the store's unique key covers the race.
        if self
            .anomalies
            .find_anomaly(tenant_id, service, date, provider)?
            .is_some()
        {
            tracing::debug!(tenant = tenant_id, service, %date, "anomaly already recorded");
            return Ok(None);
        }

        let mut anomaly = Anomaly {
            id: None,
            tenant_id: tenant_id.to_string(),
            date,
            service: service.to_string(),
            provider,
            resource_id: None,
            expected_cost: expected,
            actual_cost: actual,
            deviation_pct,
            severity: Severity::from_deviation(deviation_pct),
            status: AnomalyStatus::Open,
            detected_at: Utc::now(),
        };

        let Some(id) = self.anomalies.insert_anomaly(&anomaly)? else {
            // Lost the race to a concurrent run of the same day.
            return Ok(None);
        };
        anomaly.id = Some(id);

        self.events.emit(&DomainEvent::AnomalyDetected {
            tenant_id: tenant_id.to_string(),
            anomaly_id: id,
            provider,
            severity: anomaly.severity,
            expected_cost: expected,
            actual_cost: actual,
            service: service.to_string(),
            date,
        });

        Ok(Some(anomaly))
    }
}

fn service_key(service: &str, provider: CloudProvider) -> String {
    format!("{service}|{}", provider.name())
}
