//! Integration tests for configuration resolution via CLI.
//!
//! These tests verify precedence through the binary:
//! CLI flag > environment > config.kdl > defaults

mod common;

use common::TestEnv;
use predicates::prelude::*;

fn setting<'a>(json: &'a serde_json::Value, key: &str) -> &'a serde_json::Value {
    json["settings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["key"] == key)
        .unwrap()
}

#[test]
fn test_config_show_defaults() {
    let env = TestEnv::new();

    let json = env.json(&["config", "show"]);
    let db = setting(&json, "database");
    assert_eq!(db["value"], env.db_path().display().to_string());
    assert_eq!(db["source"], "env:LB_DATA_DIR");
    assert_eq!(setting(&json, "output-format")["value"], "json");
    assert_eq!(setting(&json, "default-priority")["source"], "default");
    assert_eq!(setting(&json, "log-level")["value"], "warn");
}

#[test]
fn test_config_show_does_not_create_database() {
    let env = TestEnv::new();
    env.lb().args(["config", "show"]).assert().success();
    assert!(!env.db_path().exists());
}

#[test]
fn test_config_file_values() {
    let env = TestEnv::new();
    std::fs::write(
        env.config_path(),
        "output-format \"human\"\ndefault-priority \"hi\"\npool-size 2\n",
    )
    .unwrap();

    // output-format human from the file turns on human output
    env.lb()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config file:"))
        .stdout(predicate::str::contains("default-priority = hi"))
        .stdout(predicate::str::contains("pool-size = 2"));
}

#[test]
fn test_cli_flags_beat_environment() {
    let env = TestEnv::new();
    let custom = env.data_path().join("flag.db");

    let json = env.json(&["--db", custom.to_str().unwrap(), "-vv", "config", "show"]);
    assert_eq!(setting(&json, "database")["source"], "cli");
    assert_eq!(setting(&json, "database")["value"], custom.display().to_string());
    assert_eq!(setting(&json, "log-level")["value"], "debug");
}

#[test]
fn test_lb_db_env_beats_data_dir() {
    let env = TestEnv::new();
    let custom = env.data_path().join("env.db");

    let output = env.lb().env("LB_DB", &custom).args(["config", "show"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(setting(&json, "database")["source"], "env:LB_DB");
}

#[test]
fn test_invalid_config_file_fails() {
    let env = TestEnv::new();
    std::fs::write(env.config_path(), "log-level \"loud\"\n").unwrap();

    env.lb()
        .args(["goals"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_logs_go_to_stderr() {
    let env = TestEnv::init();

    let output = env.lb().args(["-vv", "goals"]).output().unwrap();
    assert!(output.status.success());
    let stdout: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stdout["goals"], serde_json::json!([]));
    assert!(String::from_utf8_lossy(&output.stderr).contains("opening database"));
}
