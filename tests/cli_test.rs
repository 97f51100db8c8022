//! End-to-end tests of the `researchflow` binary

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn researchflow(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("researchflow").unwrap();
    cmd.arg("--config")
        .arg(tmp.path().join("missing.yaml"))
        .arg("--db")
        .arg(tmp.path().join("history.db"))
        .env_remove("RESEARCHFLOW_REMOTE_URL")
        .env_remove("RESEARCHFLOW_DB_PATH")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_list_empty_history() {
    let tmp = TempDir::new().unwrap();
    researchflow(&tmp)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No search history found."));
}

#[test]
fn test_record_then_list_json() {
    let tmp = TempDir::new().unwrap();
    researchflow(&tmp)
        .args([
            "record",
            "--query",
            "rust ownership",
            "--user",
            "user-1",
            "--workspace",
            "ws1",
            "--key-point",
            "one owner",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded"));

    let output = researchflow(&tmp)
        .args(["history", "list", "--user", "user-1", "--workspace", "ws1", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["query"], "rust ownership");
    assert_eq!(entries[0]["workspaceId"], "ws1");
    assert_eq!(entries[0]["summary"]["keyPoints"][0], "one owner");
}

#[test]
fn test_clear_user_reports_removed_partitions() {
    let tmp = TempDir::new().unwrap();
    for ws in ["ws1", "ws2"] {
        researchflow(&tmp)
            .args(["record", "-q", "q", "-u", "user-1", "-w", ws])
            .assert()
            .success();
    }

    researchflow(&tmp)
        .args(["history", "clear-user", "--user", "user-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 history partition(s)"));
}

#[test]
fn test_sync_without_remote_fails() {
    let tmp = TempDir::new().unwrap();
    researchflow(&tmp)
        .args(["sync", "--user", "user-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sync.remote_url is not set"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_dir, config_path) = common::temp_config_file("storage:\n  max_entries: 0\n");
    let tmp = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("researchflow").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--db")
        .arg(tmp.path().join("history.db"))
        .args(["history", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

#[test]
fn test_cloud_list_without_remote_fails() {
    let tmp = TempDir::new().unwrap();
    researchflow(&tmp)
        .args(["history", "list", "--cloud", "--user", "user-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sync.remote_url is not set"));
}
