//! CLI integration tests for the `circuit` binary.
//!
//! Uses `assert_cmd` to spawn the binary and verify exit codes, stdout
//! content and stderr content. Tests run from the workspace root so the
//! example configuration resolves.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const EXAMPLE: &str = "config/circuit.example.toml";

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

fn circuit() -> Command {
    let mut cmd = cargo_bin_cmd!("circuit");
    cmd.current_dir(workspace_root());
    cmd
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("circuit.toml");
    fs::write(&path, content).expect("write config");
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    circuit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Document circuit workflow engine"));
}

#[test]
fn version_exits_0() {
    circuit()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("circuit"));
}

#[test]
fn missing_subcommand_fails() {
    circuit().assert().failure();
}

// ──────────────────────────────────────────────
// 2. check
// ──────────────────────────────────────────────

#[test]
fn check_example_text() {
    circuit()
        .args(["check", EXAMPLE])
        .assert()
        .success()
        .stdout(predicate::str::contains("circuit.example.toml: ok"))
        .stdout(predicate::str::contains("2 circuits, 4 actions, 4 actors"))
        .stdout(predicate::str::contains(
            "contract (Contract approval): ordered flow, active, 3 steps, 4 statuses",
        ))
        .stdout(predicate::str::contains("memo (Internal memo): free flow"));
}

#[test]
fn check_example_json() {
    let output = circuit()
        .args(["--output", "json", "check", EXAMPLE])
        .output()
        .expect("run circuit check");
    assert!(output.status.success());

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(report["valid"], true);
    assert_eq!(report["port"], 8080);
    assert_eq!(report["actors"], 4);
    let circuits = report["circuits"].as_array().expect("circuits array");
    let contract = circuits
        .iter()
        .find(|c| c["id"] == "contract")
        .expect("contract circuit");
    assert_eq!(
        contract["steps"],
        serde_json::json!(["legal", "finance", "signature"])
    );
    assert_eq!(contract["allow_backtrack"], true);
}

#[test]
fn check_quiet_prints_nothing() {
    circuit()
        .args(["--quiet", "check", EXAMPLE])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn check_missing_file_exits_1() {
    circuit()
        .args(["check", "config/does-not-exist.toml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not read"));
}

#[test]
fn check_unparseable_file_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[[circuits]\nid = ");
    circuit()
        .arg("check")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not parse"));
}

#[test]
fn check_duplicate_order_index_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[[circuits]]
id = "c"
title = "C"

[[circuits.steps]]
id = "one"
title = "One"
order_index = 0

[[circuits.steps]]
id = "two"
title = "Two"
order_index = 0
"#,
    );
    circuit()
        .arg("check")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn check_unknown_effect_status_reports_json_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[[actions]]
id = "approve"
title = "Approve"
kind = "approve"
effects = [{ status_id = "nowhere", sets_complete = true }]
"#,
    );
    let output = circuit()
        .args(["--output", "json", "check"])
        .arg(&path)
        .output()
        .expect("run circuit check");
    assert_eq!(output.status.code(), Some(1));
    let err: serde_json::Value =
        serde_json::from_slice(&output.stderr).expect("stderr is JSON");
    assert!(err["error"].as_str().unwrap().contains("nowhere"));
}

// ──────────────────────────────────────────────
// 3. serve
// ──────────────────────────────────────────────

#[test]
fn serve_requires_config() {
    circuit()
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn serve_with_missing_config_exits_1() {
    circuit()
        .args(["serve", "--config", "config/does-not-exist.toml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not read"));
}
