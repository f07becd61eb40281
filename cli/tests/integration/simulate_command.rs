//! Integration tests for `deckhand simulate`.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command with fast polling and an isolated, empty config file.
fn simulate(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("deckhand"));
    cmd.env("NO_COLOR", "1")
        .env("DECKHAND_CONFIG", dir.path().join("config.yaml"))
        .args(["simulate", "--poll-interval-ms", "50"]);
    cmd
}

#[test]
fn test_simulate_restart_reaches_running() {
    let dir = TempDir::new().expect("temp dir");
    simulate(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("demo@default starting"))
        .stdout(predicate::str::contains("restart demo@default: running"));
}

#[test]
fn test_simulate_crashed_outcome_fails_with_timeout() {
    let dir = TempDir::new().expect("temp dir");
    simulate(&dir)
        .args(["--outcome", "crashed", "--replicas", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Timed out"))
        .stderr(predicate::str::contains("crashed"));
}

#[test]
fn test_simulate_debug_ends_in_debugging() {
    let dir = TempDir::new().expect("temp dir");
    simulate(&dir)
        .args(["--debug", "--name", "api"])
        .assert()
        .success()
        .stdout(predicate::str::contains("attach-debug api@default: debugging"));
}

#[test]
fn test_simulate_json_reports_outcome_object() {
    let dir = TempDir::new().expect("temp dir");
    let output = simulate(&dir).arg("--json").output().expect("run");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("utf8");
    // Transitions are single-line objects; the outcome is the trailing pretty object.
    let start = stdout.rfind("{\n").expect("outcome object");
    let outcome: serde_json::Value = serde_json::from_str(&stdout[start..]).expect("json");
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["state"], "running");
    assert_eq!(outcome["operation"], "restart");
    assert!(outcome["error"].is_null());

    let first: serde_json::Value =
        serde_json::from_str(stdout.lines().next().expect("transition")).expect("json");
    assert_eq!(first["workload"], "demo@default");
}

#[test]
fn test_simulate_rejects_invalid_poll_interval() {
    let dir = TempDir::new().expect("temp dir");
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("deckhand"));
    cmd.env("NO_COLOR", "1")
        .env("DECKHAND_CONFIG", dir.path().join("config.yaml"))
        .args(["simulate", "--poll-interval-ms", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("between 50 and 60000"));
}
