//! Collection orchestrator integration tests over the real store, vault,
//! and fixture adapter.

mod common;

use cape::core::models::DateRange;
use cape::core::ports::AccountStore;
use common::{Harness, daily_records_json};

fn january() -> DateRange {
    DateRange::new(
        "2026-01-01".parse().unwrap(),
        "2026-01-31".parse().unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn collect_ingests_fixture_records() {
    let harness = Harness::new();
    harness.register_fixture_account(
        "acct-1",
        "t1",
        "aws",
        &daily_records_json("2026-01-01", 10, "Amazon EC2", "BoxUsage", 2.5, Some("i-1")),
    );

    let outcome = harness
        .collector()
        .collect("acct-1", january())
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.records_obtained, 10);
    assert_eq!(outcome.records_saved, 10);
    assert_eq!(harness.store.ledger_count().unwrap(), 10);

    let account = harness.store.find_account("acct-1").unwrap().unwrap();
    assert!(account.last_synced_at.is_some());
}

#[tokio::test]
async fn second_collection_is_a_silent_noop() {
    let harness = Harness::new();
    harness.register_fixture_account(
        "acct-1",
        "t1",
        "aws",
        &daily_records_json("2026-01-01", 5, "Amazon EC2", "BoxUsage", 1.0, Some("i-1")),
    );
    let collector = harness.collector();

    let first = collector.collect("acct-1", january()).await.unwrap();
    assert_eq!(first.records_saved, 5);

    let second = collector.collect("acct-1", january()).await.unwrap();
    assert!(second.success);
    assert_eq!(second.records_obtained, 5);
    assert_eq!(second.records_saved, 0);
    assert_eq!(harness.store.ledger_count().unwrap(), 5);
}

#[tokio::test]
async fn range_filters_what_the_adapter_returns() {
    let harness = Harness::new();
    harness.register_fixture_account(
        "acct-1",
        "t1",
        "aws",
        &daily_records_json("2026-01-25", 14, "Amazon EC2", "BoxUsage", 1.0, Some("i-1")),
    );

    let outcome = harness
        .collector()
        .collect("acct-1", january())
        .await
        .unwrap();
    // Jan 25-31 only; February days fall outside the range
    assert_eq!(outcome.records_saved, 7);
}

#[tokio::test]
async fn batch_mixes_success_and_failure_without_aborting() {
    let harness = Harness::new();
    harness.register_fixture_account(
        "acct-ok",
        "t1",
        "aws",
        &daily_records_json("2026-01-01", 3, "Amazon EC2", "BoxUsage", 1.0, Some("i-1")),
    );
    // Unknown provider value: collection must fail for this account only
    harness.register_fixture_account(
        "acct-bad",
        "t1",
        "oraclecloud",
        &daily_records_json("2026-01-01", 3, "Compute", "Usage", 1.0, Some("vm-1")),
    );

    let batch = harness
        .collector()
        .collect_many(
            &[
                "acct-ok".to_string(),
                "acct-bad".to_string(),
                "acct-missing".to_string(),
            ],
            january(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(batch.succeeded, 1);
    assert_eq!(batch.failed, 2);

    let errors = batch.errors(10);
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(|e| e.starts_with("CAPE-P001")));
    assert!(errors.iter().any(|e| e.starts_with("CAPE-C001")));

    // Failed accounts contributed no ledger rows
    assert_eq!(harness.store.ledger_count().unwrap(), 3);
}

#[tokio::test]
async fn unreadable_records_file_reports_upstream_error() {
    let harness = Harness::new();
    let path = harness.register_fixture_account(
        "acct-1",
        "t1",
        "aws",
        &daily_records_json("2026-01-01", 3, "Amazon EC2", "BoxUsage", 1.0, Some("i-1")),
    );
    std::fs::remove_file(&path).unwrap();

    let outcome = harness
        .collector()
        .collect("acct-1", january())
        .await
        .unwrap();
    assert!(!outcome.success);
    // Validation fails first: the account's backing file is gone
    assert!(outcome.errors[0].starts_with("CAPE-A002"));
    assert_eq!(harness.store.ledger_count().unwrap(), 0);
}
