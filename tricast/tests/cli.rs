//! Integration tests for the tricast CLI
//!
//! None of these reach the network: each case fails or returns before a
//! platform client is built.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Isolated config file so the user's real config never leaks in
struct TestEnv {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl TestEnv {
    fn new(config: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, config).unwrap();

        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn empty() -> Self {
        Self::new("")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("tricast").unwrap();
        cmd.env("TRICAST_CONFIG", &self.config_path)
            .env_remove("TRICAST_LOG_LEVEL")
            .env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_help() {
    Command::cargo_bin("tricast")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_unknown_platform_is_invalid_input() {
    TestEnv::empty()
        .command()
        .args(["whoami", "-p", "myspace"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown platform 'myspace'"));
}

#[test]
fn test_no_platforms_configured() {
    TestEnv::empty()
        .command()
        .arg("whoami")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No platforms"));
}

#[test]
fn test_missing_credentials_is_auth_failure() {
    TestEnv::empty()
        .command()
        .args(["whoami", "-p", "twitter"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("authentication_failed"))
        .stderr(predicate::str::contains("[twitter]"));
}

#[test]
fn test_missing_explicit_config_file() {
    Command::cargo_bin("tricast")
        .unwrap()
        .args(["--config", "/nonexistent/tricast.toml", "whoami"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_instagram_like_is_unsupported() {
    TestEnv::empty()
        .command()
        .args(["engage", "-p", "ig", "42", "like"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("unsupported_operation"))
        .stderr(predicate::str::contains("like"));
}

#[test]
fn test_instagram_like_json_report() {
    let output = TestEnv::empty()
        .command()
        .args(["--format", "json", "engage", "-p", "instagram", "42", "like"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(6));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let outcome = &report["outcomes"][0];
    assert_eq!(outcome["platform"], "instagram");
    assert_eq!(outcome["success"], false);
    assert_eq!(outcome["error"]["kind"], "unsupported_operation");
    assert_eq!(outcome["error"]["retryable"], false);
}

#[test]
fn test_linkedin_search_is_unsupported() {
    TestEnv::empty()
        .command()
        .args(["search", "-p", "linkedin", "rust"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("search"));
}

#[test]
fn test_instagram_text_only_post_is_unsupported() {
    TestEnv::empty()
        .command()
        .args(["post", "-p", "instagram", "just words"])
        .assert()
        .code(6);
}

#[test]
fn test_overlong_tweet_fails_validation() {
    let content = "a".repeat(281);
    TestEnv::empty()
        .command()
        .args(["post", "-p", "x", &content])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("280 character limit"));
}

#[test]
fn test_comment_requires_text() {
    TestEnv::empty()
        .command()
        .args(["engage", "-p", "twitter", "1790000000000000000", "reply"])
        .assert()
        .code(3);
}

#[test]
fn test_unknown_action() {
    TestEnv::empty()
        .command()
        .args(["engage", "-p", "twitter", "1", "boost"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown action 'boost'"));
}

#[test]
fn test_bad_search_date() {
    TestEnv::empty()
        .command()
        .args(["search", "-p", "x", "rust", "--since", "yesterday-ish"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid date"));
}

#[test]
fn test_empty_stdin_post() {
    TestEnv::empty()
        .command()
        .args(["post", "-p", "linkedin"])
        .write_stdin("   \n")
        .assert()
        .code(3);
}

#[test]
fn test_capabilities_text() {
    Command::cargo_bin("tricast")
        .unwrap()
        .arg("capabilities")
        .assert()
        .success()
        .stdout(predicate::str::contains("Twitter"))
        .stdout(predicate::str::contains("Instagram"))
        .stdout(predicate::str::contains("LinkedIn"))
        .stdout(predicate::str::contains("max chars: 280"));
}

#[test]
fn test_capabilities_json() {
    let output = Command::cargo_bin("tricast")
        .unwrap()
        .args(["-f", "json", "capabilities", "-p", "li"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["platform"], "linkedin");
    assert_eq!(rows[0]["search"], false);
    assert_eq!(rows[0]["character_limit"], 3000);
}
