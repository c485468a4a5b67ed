//! Dedup/merge engine integration tests: the create/update/no-op law over
//! the real recommendation store.

mod common;

use cape::core::models::{RecommendationCandidate, RecommendationKind, RecommendationStatus};
use cape::core::ports::RecommendationStore;
use cape::core::provider::CloudProvider;
use common::Harness;

fn candidate(resource: &str, savings: f64) -> RecommendationCandidate {
    RecommendationCandidate {
        tenant_id: "t1".to_string(),
        kind: RecommendationKind::ReservedCapacity,
        provider: CloudProvider::Aws,
        service: "Amazon EC2".to_string(),
        resource_id: resource.to_string(),
        estimated_monthly_savings: savings,
        description: format!("commit {resource} to save"),
        metadata: serde_json::Map::new(),
    }
}

#[test]
fn dedup_merge_law() {
    let harness = Harness::new();
    let engine = harness.reconciler();

    // Seed an open recommendation at $100/month
    let seed = engine.reconcile("t1", &[candidate("i-1", 100.0)]).unwrap();
    assert_eq!(seed.saved_count(), 1);

    // 9% change: record left untouched
    let nine = engine.reconcile("t1", &[candidate("i-1", 109.0)]).unwrap();
    assert_eq!(nine.created, 0);
    assert_eq!(nine.updated, 0);
    let row = harness
        .store
        .find_open("t1", "i-1", RecommendationKind::ReservedCapacity)
        .unwrap()
        .unwrap();
    assert!((row.estimated_monthly_savings - 100.0).abs() < 1e-9);

    // 12% change: updated in place, zero new records for the run
    let twelve = engine.reconcile("t1", &[candidate("i-1", 112.0)]).unwrap();
    assert_eq!(twelve.created, 0);
    assert_eq!(twelve.saved_count(), 0);
    assert_eq!(twelve.updated, 1);
    let row = harness
        .store
        .find_open("t1", "i-1", RecommendationKind::ReservedCapacity)
        .unwrap()
        .unwrap();
    assert!((row.estimated_monthly_savings - 112.0).abs() < 1e-9);
}

#[test]
fn rerun_against_unchanged_candidates_is_fully_idempotent() {
    let harness = Harness::new();
    let engine = harness.reconciler();
    let candidates = vec![candidate("i-1", 100.0), candidate("i-2", 700.0)];

    let first = engine.reconcile("t1", &candidates).unwrap();
    assert_eq!(first.created, 2);

    let second = engine.reconcile("t1", &candidates).unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 2);

    // Creation events fired once per recommendation, not per run
    assert_eq!(harness.sink.events().len(), 2);
}

#[test]
fn dismissed_key_is_never_resurrected() {
    let harness = Harness::new();
    let engine = harness.reconciler();

    engine.reconcile("t1", &[candidate("i-1", 100.0)]).unwrap();
    let id = harness
        .store
        .find_open("t1", "i-1", RecommendationKind::ReservedCapacity)
        .unwrap()
        .unwrap()
        .id
        .unwrap();
    harness
        .store
        .set_recommendation_status(id, RecommendationStatus::Dismissed)
        .unwrap();

    let rerun = engine.reconcile("t1", &[candidate("i-1", 100.0)]).unwrap();
    assert_eq!(rerun.created, 0);
    assert_eq!(rerun.updated, 0);
    assert!(
        harness
            .store
            .find_open("t1", "i-1", RecommendationKind::ReservedCapacity)
            .unwrap()
            .is_none()
    );
}
