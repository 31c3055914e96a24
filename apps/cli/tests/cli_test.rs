//! Integration tests for the `socflow` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const ALERTS: &str = r#"[
  {
    "alert_id": "ALERT-001",
    "rule_id": "R-4625",
    "rule_name": "Multiple failed logons",
    "severity": "High",
    "timestamp": "2024-01-15T10:30:00Z",
    "description": "Burst of failed logons followed by success",
    "mitre": {"tactics": ["Credential Access"], "techniques": ["T1110"]},
    "assets": {"host": "DC-01", "user": "svc_backup"},
    "raw_data": {"failed_attempts": 37}
  },
  {
    "alert_id": "ALERT-002",
    "rule_id": "R-1001",
    "severity": "Low",
    "description": "Scheduled task created by patch agent"
  }
]"#;

/// A `socflow` command with a clean, synthetic-only environment.
fn socflow() -> Command {
    let mut cmd = Command::cargo_bin("socflow").unwrap();
    for key in [
        "OPENAI_API_KEY",
        "OPENAI_MODEL",
        "GEMINI_API_KEY",
        "GEMINI_MODEL",
        "MAX_CONCURRENT_ALERTS",
        "ALERT_TIMEOUT_SECONDS",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd.env("LLM_PROVIDER", "mock").env("NO_COLOR", "1");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_run_streams_events_and_metrics() {
    let dir = TempDir::new().unwrap();
    let alerts = write(&dir, "alerts.json", ALERTS);

    socflow()
        .args(["run", &alerts, "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""alert_id":"ALERT-001""#))
        .stdout(predicate::str::contains(r#""kind":"final""#))
        .stdout(predicate::str::contains(r#""total_processed":2"#));
}

#[test]
fn test_run_human_output() {
    let dir = TempDir::new().unwrap();
    let alerts = write(
        &dir,
        "alerts.json",
        r#"{"alerts": [{"alert_id": "A-9", "rule_id": "R", "severity": "Critical"}]}"#,
    );

    socflow()
        .args(["run", &alerts])
        .assert()
        .success()
        .stdout(predicate::str::contains("socflow run"))
        .stdout(predicate::str::contains("[A-9]"))
        .stdout(predicate::str::contains("COMPLETED"));
}

#[test]
fn test_run_rejects_duplicate_alert_ids() {
    let dir = TempDir::new().unwrap();
    let alerts = write(
        &dir,
        "alerts.json",
        r#"[{"alert_id": "A-1", "rule_id": "R", "severity": "Low"},
            {"alert_id": "A-1", "rule_id": "R", "severity": "High"}]"#,
    );

    socflow()
        .args(["run", &alerts])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate alert id"));
}

#[test]
fn test_run_missing_file() {
    socflow()
        .args(["run", "/nonexistent/alerts.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load alerts"));
}

#[test]
fn test_analyze_infers_triage() {
    let dir = TempDir::new().unwrap();
    let vars = write(
        &dir,
        "vars.json",
        r#"{"alert_id": "A-1", "severity": "Critical", "raw_data": "{}"}"#,
    );

    socflow()
        .args(["analyze", &vars])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""stage": "triage""#))
        .stdout(predicate::str::contains(r#""provider": "synthetic""#));
}

#[test]
fn test_analyze_explicit_stage() {
    let dir = TempDir::new().unwrap();
    let vars = write(&dir, "vars.json", r#"{"priority": "P1", "severity": "High"}"#);

    socflow()
        .args(["analyze", &vars, "--stage", "response"])
        .assert()
        .success()
        .stdout(predicate::str::contains("INC-"));
}

#[test]
fn test_analyze_unknown_shape() {
    let dir = TempDir::new().unwrap();
    let vars = write(&dir, "vars.json", r#"{"hello": "world"}"#);

    socflow()
        .args(["analyze", &vars])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not infer the stage"));
}

#[test]
fn test_config_shows_defaults_and_masks_keys() {
    socflow()
        .env("OPENAI_API_KEY", "sk-very-secret")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[orchestrator]"))
        .stdout(predicate::str::contains("max_concurrent_stages = 5"))
        .stdout(predicate::str::contains("OPENAI_API_KEY"))
        .stdout(predicate::str::contains("sk-very-secret").not());
}

#[test]
fn test_config_file_and_env_override() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "socflow.toml", "[orchestrator]\nmax_concurrent_stages = 3\n");

    socflow()
        .env("ALERT_TIMEOUT_SECONDS", "15")
        .args(["--config", &config, "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_concurrent_stages = 3"))
        .stdout(predicate::str::contains("timeout_secs = 15"));
}

#[test]
fn test_invalid_numeric_env_fails() {
    socflow()
        .env("MAX_CONCURRENT_ALERTS", "many")
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MAX_CONCURRENT_ALERTS"));
}
