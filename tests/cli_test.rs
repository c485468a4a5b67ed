//! CLI smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn no_command_prints_quickstart() {
    Command::cargo_bin("cape")
        .unwrap()
        .assert()
        .success()
        .stdout(predicate::str::contains("Cost Analytics & Pattern Engine"))
        .stdout(predicate::str::contains("QUICK START"));
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("cape")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("collect"))
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("recommend"))
        .stdout(predicate::str::contains("prune"));
}

#[test]
fn analyze_rejects_malformed_date() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("cape")
        .unwrap()
        .args([
            "analyze",
            "--tenant",
            "t1",
            "--account",
            "a1",
            "--date",
            "March 1st",
            "--db",
        ])
        .arg(dir.path().join("cape.db"))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("CAPE-C012"));
}

#[test]
fn collect_requires_an_account() {
    Command::cargo_bin("cape")
        .unwrap()
        .args(["collect", "--start", "2026-01-01", "--end", "2026-01-31"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--account"));
}

#[test]
fn analyze_on_empty_database_reports_zero() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("cape")
        .unwrap()
        .args([
            "analyze",
            "--tenant",
            "t1",
            "--account",
            "a1",
            "--date",
            "2026-03-01",
            "--json",
            "--db",
        ])
        .arg(dir.path().join("cape.db"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"anomaliesDetected\":0"))
        .stdout(predicate::str::contains("cape.v1"));
}
