mod common;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_cli_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("session.csv");
    common::write_session_csv(&csv, 90.0);
    let out = dir.path().join("report");

    Command::cargo_bin("muse-report")
        .unwrap()
        .arg("--data")
        .arg(&csv)
        .arg("--output")
        .arg(&out)
        .args(["--segment-minutes", "0.5", "--warmup-minutes", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Report:"));

    assert!(out.join("REPORT.md").exists());
    assert!(out.join("summary.csv").exists());
    assert!(!out.join("analysis.json").exists());
}

#[test]
fn test_cli_fails_on_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("muse-report")
        .unwrap()
        .arg("--data")
        .arg(dir.path().join("nope.csv"))
        .arg("--output")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.csv"));
}

#[test]
fn test_inspect_csv_prints_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("session.csv");
    common::write_session_csv(&csv, 2.0);

    Command::cargo_bin("inspect_csv")
        .unwrap()
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("RAW_AF7"))
        .stdout(predicate::str::contains("Rows: 512"));
}
