//! Integration tests for basic CLI behavior.
//!
//! Every test points `--config` at a temp file so the user's own config
//! never leaks in.

#![allow(deprecated)] // cargo_bin deprecation, replacement not yet stable

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn embedres() -> Command {
    Command::cargo_bin("embedres").expect("binary 'embedres' should be built")
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const PROVIDERS: &str = r#"
[browser]
executable = "/nonexistent/chromium"

[[providers]]
id = "wish"
kind = "direct"
base_url = "https://wish.example"

[[providers]]
id = "vh"
kind = "intercept"
base_url = "https://vh.example"
api_key = "secret-key-1234"
"#;

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    embedres()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: embedres"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("intercept"))
        .stdout(predicate::str::contains("providers"));
}

#[test]
fn version_flag_shows_semver() {
    embedres()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^embedres \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_subcommand_fails() {
    embedres().assert().failure();
}

#[test]
fn resolve_help_lists_flags() {
    embedres()
        .args(["resolve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--api-key"))
        .stdout(predicate::str::contains("--json"));
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[test]
fn missing_explicit_config_fails() {
    embedres()
        .args(["--config", "/nonexistent/embedres.toml", "providers"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/embedres.toml"));
}

#[test]
fn config_from_env_var() {
    let config = config_file(PROVIDERS);
    embedres()
        .env("EMBEDRES_CONFIG", config.path())
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("wish"));
}

// ─── providers ───────────────────────────────────────────────────────────────

#[test]
fn providers_masks_api_keys() {
    let config = config_file(PROVIDERS);
    embedres()
        .arg("--config")
        .arg(config.path())
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("wish"))
        .stdout(predicate::str::contains("direct"))
        .stdout(predicate::str::contains("intercept"))
        .stdout(predicate::str::contains("****1234"))
        .stdout(predicate::str::contains("secret-key").not());
}

// ─── resolve ─────────────────────────────────────────────────────────────────

#[test]
fn resolve_unknown_provider_with_code_fails() {
    let config = config_file(PROVIDERS);
    embedres()
        .arg("--config")
        .arg(config.path())
        .args(["resolve", "nobody", "abc123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nobody"));
}

#[test]
fn resolve_direct_without_key_prints_embed_page() {
    let config = config_file(PROVIDERS);
    embedres()
        .arg("--config")
        .arg(config.path())
        .args(["resolve", "wish", "abc123"])
        .assert()
        .success()
        .stdout("https://wish.example/embed-abc123.html\n")
        .stderr(predicate::str::contains("FALLBACK_EMBED"));
}

#[test]
fn resolve_json_output() {
    let config = config_file(PROVIDERS);
    let output = embedres()
        .arg("--config")
        .arg(config.path())
        .args(["resolve", "wish", "https://wish.example/e/abc123", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["url"], "https://wish.example/embed-abc123.html");
    assert_eq!(json["strategy"], "FALLBACK_EMBED");
    assert!(json["headers"].as_object().unwrap().is_empty());
}

#[test]
fn resolve_intercept_without_browser_fails() {
    let config = config_file(PROVIDERS);
    embedres()
        .arg("--config")
        .arg(config.path())
        .args(["resolve", "vh", "abc123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Browser launch failed"));
}

// ─── intercept ───────────────────────────────────────────────────────────────

#[test]
fn intercept_without_browser_fails() {
    let config = config_file(PROVIDERS);
    embedres()
        .arg("--config")
        .arg(config.path())
        .args(["intercept", "https://vh.example/embed-abc123.html"])
        .assert()
        .failure();
}
