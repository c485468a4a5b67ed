//! Baseline analyzer integration tests: detection, dedup, and severity
//! bucketing against a seeded ledger.

mod common;

use cape::core::models::Severity;
use cape::core::ports::CostLedger;
use cape::test_utils::{daily_items, date, line_item};
use common::Harness;

/// Seed 30 days of steady history ending 2026-02-28, then `actual` on
/// 2026-03-01.
fn seed_steady(harness: &Harness, daily: f64, actual: f64) {
    let mut items = daily_items("2026-01-30", 30, "Amazon EC2", daily, None);
    items.push(line_item("2026-03-01", "Amazon EC2", actual, None));
    harness.store.insert_batch(&items).unwrap();
}

#[test]
fn detects_and_dedups_across_runs() {
    let harness = Harness::new();
    seed_steady(&harness, 100.0, 300.0);
    let analyzer = harness.baseline();

    let first = analyzer.analyze("t1", "a1", date("2026-03-01")).unwrap();
    assert_eq!(first.anomalies_detected, 1);

    // Same inputs, second run: no additional anomalies
    let second = analyzer.analyze("t1", "a1", date("2026-03-01")).unwrap();
    assert_eq!(second.anomalies_detected, 0);

    assert_eq!(harness.sink.events().len(), 1);
}

#[test]
fn zero_baseline_never_produces_an_anomaly() {
    let harness = Harness::new();
    // Only the analysis date has costs; no trailing history at all
    harness
        .store
        .insert_batch(&[line_item("2026-03-01", "Amazon EC2", 50_000.0, None)])
        .unwrap();

    let report = harness
        .baseline()
        .analyze("t1", "a1", date("2026-03-01"))
        .unwrap();
    assert_eq!(report.anomalies_detected, 0);
}

#[test]
fn severity_buckets_from_live_deviations() {
    // (actual against a $100 baseline, expected severity)
    let cases = [
        (160.0, Severity::Low),      // +60%
        (250.0, Severity::Medium),   // +150%
        (350.0, Severity::High),     // +250%
        (700.0, Severity::Critical), // +600%
    ];

    for (actual, expected) in cases {
        let harness = Harness::new();
        seed_steady(&harness, 100.0, actual);
        let report = harness
            .baseline()
            .analyze("t1", "a1", date("2026-03-01"))
            .unwrap();
        assert_eq!(report.anomalies_detected, 1, "actual {actual}");
        assert_eq!(report.anomalies[0].severity, expected, "actual {actual}");
    }
}

#[test]
fn boundary_deviation_lands_in_exactly_one_bucket() {
    let harness = Harness::new();
    // $300 against a $100 trailing average: exactly +200%
    seed_steady(&harness, 100.0, 300.0);

    let report = harness
        .baseline()
        .analyze("t1", "a1", date("2026-03-01"))
        .unwrap();
    assert_eq!(report.anomalies_detected, 1);
    let anomaly = &report.anomalies[0];
    assert!((anomaly.deviation_pct - 200.0).abs() < 1e-9);
    // Strict thresholds put the boundary in the lower bucket, never none
    assert_eq!(anomaly.severity, Severity::Medium);
}

#[test]
fn different_dates_are_independent_dedup_keys() {
    let harness = Harness::new();
    // 60 days of history so both analysis dates have full windows
    let mut items = daily_items("2026-01-01", 59, "Amazon EC2", 100.0, None);
    items.push(line_item("2026-03-01", "Amazon EC2", 300.0, None));
    harness.store.insert_batch(&items).unwrap();
    let analyzer = harness.baseline();

    // 2026-02-28 spiked too (it is part of the seeded history at 100, so
    // re-seed its day with an extra item pushing it over threshold)
    harness
        .store
        .insert_batch(&[{
            let mut extra = line_item("2026-02-28", "Amazon EC2", 200.0, None);
            extra.usage_type = "DataTransfer".to_string();
            extra
        }])
        .unwrap();

    let first = analyzer.analyze("t1", "a1", date("2026-02-28")).unwrap();
    assert_eq!(first.anomalies_detected, 1);

    let second = analyzer.analyze("t1", "a1", date("2026-03-01")).unwrap();
    assert_eq!(second.anomalies_detected, 1);
}
