//! CLI integration tests for legacy-import.
//!
//! These verify command-line argument parsing, help output and exit codes
//! for error conditions that need no live sources.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the legacy-import binary.
fn cmd() -> Command {
    Command::cargo_bin("legacy-import").unwrap()
}

#[test]
fn test_help_shows_action_and_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[ACTION]"))
        .stdout(predicate::str::contains("--assume"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--storage-path"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("legacy-import"));
}

#[test]
fn test_unknown_action_fails() {
    cmd()
        .arg("verify")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown action"));
}

#[test]
fn test_missing_runtime_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(dir.path())
        .args(["import", "--config", "missing.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.yaml"));
}

#[test]
fn test_invalid_runtime_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("import.yaml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(file, "importers: [not a mapping").unwrap();

    cmd()
        .current_dir(dir.path())
        .args(["import", "--config", "import.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_assumed_import_with_empty_registry_completes() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("import.yaml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(file, "context: default").unwrap();
    writeln!(file, "storage_path: {}", dir.path().join("configs").display()).unwrap();
    writeln!(file, "data_path: {}", dir.path().join("data").display()).unwrap();

    cmd()
        .current_dir(dir.path())
        .args(["all", "--assume", "--config", "import.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Command complete."));
}

#[test]
fn test_setup_phase_alone_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("import.yaml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(file, "context: default").unwrap();
    writeln!(file, "storage_path: {}", dir.path().join("configs").display()).unwrap();
    writeln!(file, "data_path: {}", dir.path().join("data").display()).unwrap();

    cmd()
        .current_dir(dir.path())
        .args(["setup", "--config", "import.yaml"])
        .assert()
        .success();
}
