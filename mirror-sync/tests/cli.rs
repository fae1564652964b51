//! Integration tests for the mirror-sync binary
//!
//! These only cover paths that fail before any network access.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path.to_str().unwrap().to_string()
}

fn mirror_sync() -> Command {
    let mut cmd = Command::cargo_bin("mirror-sync").unwrap();
    cmd.env_remove("MIRRORCAST_CONFIG")
        .env_remove("MIRRORCAST_LOG_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_describes_daemon() {
    mirror_sync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mastodon"))
        .stdout(predicate::str::contains("--poll-interval"))
        .stdout(predicate::str::contains("--once"))
        .stdout(predicate::str::contains("3 - Invalid input"));
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    mirror_sync()
        .arg("--config")
        .arg(&missing)
        .arg("--once")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"
[mastodon]
instance = "social.example"

[sync]
post_to_twitter = false
post_to_mastodon = false
"#,
    );

    mirror_sync()
        .args(["--config", &config, "--once"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("both mirroring directions are disabled"));
}

#[test]
fn test_config_from_environment() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "[mastodon]\ninstance = \"\"\n");

    mirror_sync()
        .env("MIRRORCAST_CONFIG", &config)
        .arg("--once")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("mastodon.instance"));
}

#[test]
fn test_missing_token_file_is_auth_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        &format!(
            r#"
[mastodon]
instance = "social.example"
token_file = "{}"

[sync]
state_file = "{}"
"#,
            dir.path().join("absent.token").display().to_string().replace('\\', "/"),
            dir.path().join("state.json").display().to_string().replace('\\', "/"),
        ),
    );

    mirror_sync()
        .args(["--config", &config, "--once"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Mastodon token file"));
}

#[test]
fn test_bad_poll_interval_is_usage_error() {
    mirror_sync()
        .args(["--poll-interval", "often"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--poll-interval"));
}

#[test]
fn test_bad_log_format_is_usage_error() {
    mirror_sync()
        .args(["--log-format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid log format"));
}
