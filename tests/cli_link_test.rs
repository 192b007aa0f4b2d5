//! Integration tests for link commands via CLI.
//!
//! These tests verify that link commands work correctly through the CLI:
//! - `lb link add` / `lb link rm` manage directed links
//! - `lb link show` lists both directions
//! - `lb link tree` walks the graph and marks cycles and missing items
//! - `lb update --link/--unlink` applies link changes with field updates

mod common;

use common::TestEnv;
use predicates::prelude::*;

// === Add / Remove Tests ===

#[test]
fn test_link_add_and_show() {
    let env = TestEnv::init();
    let a = env.add("Proj", "Design schema", &[]);
    let b = env.add("Proj", "Read docs", &["-t", "learning"]);

    let json = env.json(&["link", "add", &a, &b, "-t", "inspired_by"]);
    assert_eq!(json["changed"], true);
    assert_eq!(json["link_type"], "inspired-by");

    let out = env.json(&["link", "show", &a]);
    assert_eq!(out["outgoing"][0]["peer_id"], b.as_str());
    assert_eq!(out["outgoing"][0]["link_type"], "inspired-by");
    assert_eq!(out["outgoing"][0]["peer"]["title"], "Read docs");
    assert!(out["incoming"].as_array().unwrap().is_empty());

    let inc = env.json(&["link", "show", &b]);
    assert_eq!(inc["incoming"][0]["peer_id"], a.as_str());
}

#[test]
fn test_link_add_twice_is_noop() {
    let env = TestEnv::init();
    let a = env.add("Proj", "A", &[]);
    let b = env.add("Proj", "B", &[]);

    env.json(&["link", "add", &a, &b]);
    let json = env.json(&["link", "add", &a, &b, "-t", "evolves-from"]);
    assert_eq!(json["changed"], false);

    let out = env.json(&["link", "show", &a]);
    assert_eq!(out["outgoing"].as_array().unwrap().len(), 1);
    assert_eq!(out["outgoing"][0]["link_type"], "references");
}

#[test]
fn test_link_add_missing_endpoint() {
    let env = TestEnv::init();
    let a = env.add("Proj", "A", &[]);

    env.lb()
        .args(["link", "add", &a, "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_link_rm() {
    let env = TestEnv::init();
    let a = env.add("Proj", "A", &[]);
    let b = env.add("Proj", "B", &[]);
    env.json(&["link", "add", &a, &b]);

    assert_eq!(env.json(&["link", "rm", &a, &b])["changed"], true);
    assert_eq!(env.json(&["link", "rm", &a, &b])["changed"], false);

    env.lb()
        .args(["link", "show", &a, "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("has no links."));
}

// === Tree Tests ===

#[test]
fn test_link_tree_marks_cycle() {
    let env = TestEnv::init();
    let a = env.add("Proj", "A", &[]);
    let b = env.add("Proj", "B", &[]);
    env.json(&["link", "add", &a, &b]);
    env.json(&["link", "add", &b, &a]);

    let json = env.json(&["link", "tree", &a]);
    let root = &json["root"];
    assert_eq!(root["id"], a.as_str());
    assert_eq!(root["children"][0]["id"], b.as_str());
    let back = &root["children"][0]["children"][0];
    assert_eq!(back["id"], a.as_str());
    assert_eq!(back["marker"], "cycle");
    assert!(back["children"].as_array().unwrap().is_empty());

    env.lb()
        .args(["link", "tree", &a, "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(cycle)"))
        .stdout(predicate::str::contains("└── [references]"));
}

#[test]
fn test_link_tree_depth_limit() {
    let env = TestEnv::init();
    let a = env.add("Proj", "A", &[]);
    let b = env.add("Proj", "B", &[]);
    let c = env.add("Proj", "C", &[]);
    env.json(&["link", "add", &a, &b]);
    env.json(&["link", "add", &b, &c]);

    let json = env.json(&["link", "tree", &a, "--depth", "1"]);
    assert_eq!(json["root"]["children"][0]["id"], b.as_str());
    assert!(json["root"]["children"][0]["children"].as_array().unwrap().is_empty());

    let json = env.json(&["link", "tree", &a]);
    assert_eq!(json["root"]["children"][0]["children"][0]["id"], c.as_str());
}

#[test]
fn test_link_tree_unknown_root() {
    let env = TestEnv::init();

    env.lb()
        .args(["link", "tree", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_link_suggest() {
    let env = TestEnv::init();
    let a = env.add("Proj", "A", &[]);
    env.add("Home", "B", &[]);

    let json = env.json(&["link", "suggest", "--goal", "Proj"]);
    let suggestions = json["suggestions"].as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["id"], a.as_str());

    let json = env.json(&["link", "suggest", "-n", "1"]);
    assert_eq!(json["suggestions"].as_array().unwrap().len(), 1);
}

// === Update with Links ===

#[test]
fn test_update_with_links() {
    let env = TestEnv::init();
    let a = env.add("Proj", "A", &[]);
    let b = env.add("Proj", "B", &[]);
    let c = env.add("Proj", "C", &[]);
    env.json(&["link", "add", &a, &b]);

    let spec = format!("{}:evolves-from", c);
    let json = env.json(&["update", &a, "--title", "A2", "--link", &spec, "--unlink", &b]);
    assert_eq!(json["title"], "A2");

    let out = env.json(&["link", "show", &a]);
    let outgoing = out["outgoing"].as_array().unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0]["peer_id"], c.as_str());
    assert_eq!(outgoing[0]["link_type"], "evolves-from");
}

#[test]
fn test_update_with_bad_link_changes_nothing() {
    let env = TestEnv::init();
    let a = env.add("Proj", "A", &[]);
    let b = env.add("Proj", "B", &[]);

    env.lb()
        .args(["update", &a, "--title", "Renamed", "--link", &b, "--link", "ghost"])
        .assert()
        .failure();

    assert_eq!(env.json(&["show", &a])["title"], "A");
    let out = env.json(&["link", "show", &a]);
    assert!(out["outgoing"].as_array().unwrap().is_empty());
}

#[test]
fn test_update_unlink_absent_link_fails() {
    let env = TestEnv::init();
    let a = env.add("Proj", "A", &[]);
    let b = env.add("Proj", "B", &[]);

    env.lb()
        .args(["update", &a, "--unlink", &b])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}
