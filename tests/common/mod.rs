//! Common test utilities for logbook integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's `~/.local/share/logbook/` directory or config file.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with isolated data storage.
///
/// The `lb()` method returns a `Command` that sets `LB_DATA_DIR` and
/// `LB_CONFIG` per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with an isolated directory.
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment and initialize the database.
    pub fn init() -> Self {
        let env = Self::new();
        env.lb().arg("init").assert().success();
        env
    }

    /// Get a Command for the lb binary with isolated data and config.
    pub fn lb(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_lb"));
        cmd.current_dir(self.data_dir.path());
        cmd.env("LB_DATA_DIR", self.data_dir.path());
        cmd.env("LB_CONFIG", self.config_path());
        cmd.env_remove("LB_DB");
        cmd.env_remove("LB_LOG");
        cmd
    }

    /// Run `lb` with `args`, assert success and parse stdout as JSON.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.lb().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "lb {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Add an item and return its id.
    pub fn add(&self, goal: &str, title: &str, extra: &[&str]) -> String {
        let mut args = vec!["add", goal, title];
        args.extend_from_slice(extra);
        self.json(&args)["id"].as_str().unwrap().to_string()
    }

    /// Get the path to the data directory.
    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }

    /// Database file used by default.
    pub fn db_path(&self) -> PathBuf {
        self.data_path().join("logbook.db")
    }

    /// Config file location (absent unless a test writes it).
    pub fn config_path(&self) -> PathBuf {
        self.data_path().join("config.kdl")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
