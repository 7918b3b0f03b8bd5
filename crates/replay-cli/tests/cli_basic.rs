//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a throwaway database and config
//! file and verify its JSON output.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command in `dir` and return (stdout, stderr, exit code).
fn run_cli(dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_replay-cli"))
        .arg("--db")
        .arg(dir.join("replay.db"))
        .arg("--config")
        .arg(dir.join("config.toml"))
        .args(args)
        .env_remove("REPLAY_USER")
        .env_remove("REPLAY_ONESIGNAL_APP_ID")
        .env_remove("REPLAY_ONESIGNAL_API_KEY")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(dir: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(dir, args);
    assert_eq!(code, 0, "CLI command failed: {args:?}\n{stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_journal_add_counts_toward_local_week() {
    let dir = TempDir::new().unwrap();
    run_json(dir.path(), &["--user", "u1", "profile", "timezone", "America/New_York"]);

    let out = run_json(
        dir.path(),
        &["--user", "u1", "journal", "add", "--date", "2025-05-26T03:00:00Z"],
    );
    assert_eq!(out["summary"]["weekStart"], "2025-05-19");
    assert_eq!(out["summary"]["journalCount"], 1);
    assert!(out["tagSync"].is_null());
}

#[test]
fn test_meditation_after_unlock() {
    let dir = TempDir::new().unwrap();
    let at = "2025-05-20T15:00:00Z";
    for _ in 0..3 {
        run_json(dir.path(), &["--user", "u1", "journal", "add", "--date", at]);
    }
    let out = run_json(dir.path(), &["--user", "u1", "meditation", "complete", "--at", at]);
    assert_eq!(out["summary"]["meditationCount"], 1);
    assert_eq!(out["summary"]["meditationsUnlocked"], true);
}

#[test]
fn test_progress_week_requires_user() {
    let dir = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["progress", "week"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("--user"));
}

#[test]
fn test_invalid_timezone_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["--user", "u1", "profile", "timezone", "Mars/Base"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Mars/Base"));
}

#[test]
fn test_report_mark_sent() {
    let dir = TempDir::new().unwrap();
    let at = "2025-05-20T15:00:00Z";
    for _ in 0..5 {
        run_json(dir.path(), &["--user", "u1", "journal", "add", "--date", at]);
    }
    let sent = run_json(
        dir.path(),
        &["--user", "u1", "report", "mark-sent", "--week", "2025-05-19"],
    );
    assert_eq!(sent["reportSent"], true);
    assert_eq!(sent["eligible"], false);
}

#[test]
fn test_config_set_and_get() {
    let dir = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["config", "set", "thresholds.unlock_journals", "4"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "thresholds.unlock_journals"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "4");

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "default_timezone", "Nowhere"]);
    assert_ne!(code, 0);
}

#[test]
fn test_config_get_unknown_key_reports_error() {
    let dir = TempDir::new().unwrap();
    let (stdout, stderr, code) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("error: unknown key: no.such.key"));
}

#[test]
fn test_history_accepts_any_week_count() {
    let dir = TempDir::new().unwrap();
    run_json(dir.path(), &["--user", "u1", "journal", "add", "--date", "2025-05-20T15:00:00Z"]);
    let out = run_json(dir.path(), &["--user", "u1", "progress", "history", "--weeks", "4294967295"]);
    assert_eq!(out.as_array().unwrap().len(), 1);
}
