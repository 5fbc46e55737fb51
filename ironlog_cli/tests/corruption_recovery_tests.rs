//! Corruption recovery tests for the ironlog binary.
//!
//! These tests verify the system can handle:
//! - Corrupted or truncated store files (refused, never overwritten)
//! - Corrupted drafts (rebuilt from the store)
//! - Failed uploads (unsent sets survive for retry)
//! - Invalid configuration

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ironlog"));
    cmd.env("XDG_CONFIG_HOME", data_dir.join("config"))
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--user")
        .arg("tester");
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_corrupted_store_is_refused() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    let store_path = data_dir.join("store.json");
    fs::write(&store_path, "{ invalid json }}}}").expect("Failed to write corrupted store");

    cli(data_dir)
        .args(["start", "--free"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Json"));

    // Durable history is never silently replaced
    assert_eq!(fs::read_to_string(&store_path).unwrap(), "{ invalid json }}}}");
}

#[test]
fn test_truncated_store_is_refused() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir).args(["start", "--free"]).assert().success();

    let store_path = data_dir.join("store.json");
    let content = fs::read_to_string(&store_path).unwrap();
    fs::write(&store_path, &content[..content.len() / 2]).unwrap();

    cli(data_dir).arg("status").assert().failure();
}

#[test]
fn test_missing_store_is_seeded() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("fresh/nested");

    cli(&data_dir)
        .args(["start", "--day", "oly_base_w1_d1"])
        .assert()
        .success();
    assert!(data_dir.join("store.json").exists());
}

#[test]
fn test_corrupted_draft_is_rebuilt() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir)
        .args(["start", "--day", "strength_5x5_w1_d1"])
        .assert()
        .success();
    cli(data_dir).args(["log", "100", "5"]).assert().success();
    cli(data_dir).arg("upload").assert().success();

    fs::write(data_dir.join("drafts/tester.json"), "{ not a draft").unwrap();

    // Uploaded sets come back from the store
    cli(data_dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("100 x 5 working"));

    let draft = fs::read_to_string(data_dir.join("drafts/tester.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&draft).expect("Draft should be valid JSON");
    assert_eq!(parsed["current_exercise_index"], 0);
}

#[test]
fn test_draft_from_stale_session_is_replaced() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir)
        .args(["start", "--day", "strength_5x5_w1_d1"])
        .assert()
        .success();
    cli(data_dir).args(["log", "100", "5"]).assert().success();
    let stale = fs::read_to_string(data_dir.join("drafts/tester.json")).unwrap();

    cli(data_dir).arg("discard").assert().success();
    cli(data_dir)
        .args(["start", "--day", "strength_5x5_w1_d2"])
        .assert()
        .success();

    // Put the old draft back as if a second device had written it
    fs::write(data_dir.join("drafts/tester.json"), stale).unwrap();

    cli(data_dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Squat + Deadlift"))
        .stdout(predicate::str::contains("waiting for upload").not());
}

#[test]
fn test_failed_upload_keeps_pending_sets() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir)
        .args(["start", "--day", "strength_5x5_w1_d1"])
        .assert()
        .success();
    cli(data_dir).args(["log", "100", "5"]).assert().success();

    let store_path = data_dir.join("store.json");
    let good = fs::read_to_string(&store_path).unwrap();
    fs::write(&store_path, "garbage").unwrap();

    cli(data_dir).arg("upload").assert().failure();

    fs::write(&store_path, good).unwrap();
    cli(data_dir)
        .arg("upload")
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded 1 set(s)"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    let config_dir = data_dir.join("config/ironlog");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "[lifter]\nbar_weight = -5.0\n").unwrap();

    cli(data_dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("bar_weight"));
}

#[test]
fn test_config_bar_weight_used() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    let config_dir = data_dir.join("config/ironlog");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "[lifter]\nbar_weight = 15.0\n").unwrap();

    cli(data_dir)
        .args(["start", "--day", "strength_5x5_w1_d1"])
        .assert()
        .success();
    cli(data_dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Next: 15 (set 1 of 5)"));
}
