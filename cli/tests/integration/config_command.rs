//! Integration tests for `deckhand config` command.
//!
//! All filesystem-touching tests set `DECKHAND_CONFIG` to a temp path so they
//! never read or write `~/.deckhand/config.yaml`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn deckhand() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("deckhand"));
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Returns a `TempDir` and the path string for a config file inside it.
fn temp_config_path() -> (TempDir, String) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir
        .path()
        .join("config.yaml")
        .to_string_lossy()
        .into_owned();
    (dir, path)
}

#[test]
fn test_config_help_shows_subcommands() {
    deckhand()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("set"))
        .stdout(predicate::str::contains("path"));
}

#[test]
fn test_config_show_without_file_uses_defaults() {
    let (_dir, path) = temp_config_path();
    deckhand()
        .args(["config", "show"])
        .env("DECKHAND_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("lifecycle.poll_interval_ms:"))
        .stdout(predicate::str::contains("1000"))
        .stdout(predicate::str::contains("120"));
}

#[test]
fn test_config_path_honours_env_override() {
    let (_dir, path) = temp_config_path();
    deckhand()
        .args(["config", "path"])
        .env("DECKHAND_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains(path.as_str()));
}

#[test]
fn test_config_set_persists_value() {
    let (_dir, path) = temp_config_path();
    deckhand()
        .args(["config", "set", "lifecycle.start_timeout_secs", "45"])
        .env("DECKHAND_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Set lifecycle.start_timeout_secs = 45"));

    let written = std::fs::read_to_string(&path).expect("config written");
    assert!(written.contains("start_timeout_secs: 45"));

    deckhand()
        .args(["--json", "config", "show"])
        .env("DECKHAND_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"start_timeout_secs\": 45"));
}

#[test]
fn test_config_set_unknown_key_fails() {
    let (_dir, path) = temp_config_path();
    deckhand()
        .args(["config", "set", "lifecycle.colour", "blue"])
        .env("DECKHAND_CONFIG", &path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Valid settings"));
    assert!(!std::path::Path::new(&path).exists());
}

#[test]
fn test_config_set_out_of_range_value_fails() {
    let (_dir, path) = temp_config_path();
    deckhand()
        .args(["config", "set", "lifecycle.poll_interval_ms", "5"])
        .env("DECKHAND_CONFIG", &path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("between 50 and 60000"));
}

#[test]
fn test_config_set_json_error_is_an_object() {
    let (_dir, path) = temp_config_path();
    let output = deckhand()
        .args(["--json", "config", "set", "lifecycle.target", "has space"])
        .env("DECKHAND_CONFIG", &path)
        .output()
        .expect("run");
    assert!(!output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "COMMAND_FAILED");
}
