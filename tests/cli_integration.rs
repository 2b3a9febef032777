//! CLI integration tests
//!
//! Runs the `upload-session` binary against a temporary session directory.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use upload_session::{Account, CredentialStore, Platform};

fn command(home: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("upload-session");
    cmd.env("XDG_CONFIG_HOME", home.path().join("config"))
        .env_remove("UPLOAD_SESSION_DIR")
        .env_remove("UPLOAD_SESSION_LOGIN_TIMEOUT")
        .env_remove("UPLOAD_SESSION_HEADLESS")
        .arg("--sessions-dir")
        .arg(home.path().join("sessions"));
    cmd
}

fn seed(home: &TempDir, platform: Platform, account: &str) {
    CredentialStore::new(home.path().join("sessions"))
        .write(platform, &Account::new(account).unwrap(), "{\"cookies\":[],\"origins\":[]}")
        .unwrap();
}

#[test]
fn test_version_flag() {
    let mut cmd = cargo_bin_cmd!("upload-session");
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    let mut cmd = cargo_bin_cmd!("upload-session");
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("sessions-dir"));
}

#[test]
fn test_list_empty_store() {
    let home = TempDir::new().unwrap();

    command(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored sessions"));
}

#[test]
fn test_list_seeded_records_as_json() {
    let home = TempDir::new().unwrap();
    seed(&home, Platform::Douyin, "default");
    seed(&home, Platform::Douyin, "brand_1");
    seed(&home, Platform::Xhs, "default");

    let output = command(&home).args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["douyin"], serde_json::json!(["brand_1", "default"]));
    assert_eq!(json["xhs"], serde_json::json!(["default"]));
}

#[test]
fn test_delete_removes_record() {
    let home = TempDir::new().unwrap();
    seed(&home, Platform::Kuaishou, "old");

    command(&home)
        .args(["delete", "kuaishou", "--account", "old"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted kuaishou/old"));

    command(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored sessions"));
}

#[test]
fn test_verify_without_record_fails() {
    let home = TempDir::new().unwrap();

    command(&home)
        .args(["verify", "douyin"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("douyin/default: invalid (no-stored-session)"));
}

#[test]
fn test_verbose_overrides_rust_log() {
    let home = TempDir::new().unwrap();

    command(&home)
        .env("RUST_LOG", "error")
        .args(["--verbose", "list"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Using session store"));
}

#[test]
fn test_zero_timeout_rejected() {
    let home = TempDir::new().unwrap();

    command(&home)
        .args(["ensure", "douyin", "--timeout", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("login.timeout"));
}

#[test]
fn test_invalid_account_rejected() {
    let home = TempDir::new().unwrap();

    command(&home)
        .args(["delete", "douyin", "--account", "../escape"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("account"));
}

#[test]
fn test_unknown_platform_rejected() {
    let home = TempDir::new().unwrap();

    command(&home)
        .args(["list", "weibo"])
        .assert()
        .failure();
}
