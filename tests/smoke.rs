//! Smoke tests -- verify the binary runs and key subcommands behave.

use assert_cmd::Command;
use predicates::prelude::*;

fn teetime(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("teetime").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("TEETIME_CONFIG")
        .env_remove("CCJ_USER")
        .env_remove("CCJ_PASS")
        .env_remove("API_KEY")
        .env_remove("GEMINI_API_KEY");
    cmd
}

#[test]
fn test_cli_help() {
    let dir = tempfile::TempDir::new().unwrap();
    teetime(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unattended tee-time booking"));
}

#[test]
fn test_cli_version() {
    let dir = tempfile::TempDir::new().unwrap();
    teetime(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("teetime"));
}

#[test]
fn test_status_without_log_shows_empty_state() {
    let dir = tempfile::TempDir::new().unwrap();
    teetime(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No booking runs recorded yet."));
}

#[test]
fn test_status_json_lists_entries() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("runs.json");
    teetime::outcome::OutcomeLog::new(&path)
        .append(teetime::outcome::LogStatus::Success, "Booked 07:15 on Woodmead for 2026-10-31")
        .unwrap();

    teetime(&dir)
        .args(["status", "--json", "--log-file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"SUCCESS\""))
        .stdout(predicate::str::contains("Booked 07:15 on Woodmead"));
}

#[test]
fn test_book_without_credentials_fails_and_logs_once() {
    let dir = tempfile::TempDir::new().unwrap();
    teetime(&dir)
        .arg("book")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stderr(predicate::str::contains("CCJ_USER"));

    let entries = teetime::outcome::read_entries(&dir.path().join("logs.json"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, teetime::outcome::LogStatus::Failed);
    assert!(entries[0].details.contains("CCJ_USER"));
}

#[test]
fn test_book_with_unparsable_config_fails_and_logs_once() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("teetime.toml"), "courses = [\"Woodmead\"\n").unwrap();

    teetime(&dir)
        .args(["book", "--log-file", "runs.json"])
        .env("CCJ_USER", "member")
        .env("CCJ_PASS", "secret")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stderr(predicate::str::contains("failed to parse config file"));

    let entries = teetime::outcome::read_entries(&dir.path().join("runs.json"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, teetime::outcome::LogStatus::Failed);
    assert!(entries[0].details.contains("teetime.toml"));
    assert!(!dir.path().join("logs.json").exists());
}

#[test]
fn test_book_with_out_of_range_target_date_fails_and_logs_once() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("teetime.toml"),
        "target_date = { rule = \"fixed_offset\", days = 200000000 }\n",
    )
    .unwrap();

    teetime(&dir)
        .arg("book")
        .env("CCJ_USER", "member")
        .env("CCJ_PASS", "secret")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"));

    let entries = teetime::outcome::read_entries(&dir.path().join("logs.json"));
    assert_eq!(entries.len(), 1);
    assert!(entries[0].details.contains("target date offset"));
}

#[test]
fn test_named_config_that_cannot_load_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("teetime.toml"), "settle_ms = 0\n").unwrap();

    teetime(&dir)
        .arg("status")
        .env("TEETIME_CONFIG", dir.path().join("missing.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn test_schedule_preview() {
    let dir = tempfile::TempDir::new().unwrap();
    teetime(&dir)
        .args(["schedule", "--cron", "0 0 6 * * Thu", "--count", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Upcoming runs"))
        .stdout(predicate::str::contains("T06:00:00+00:00"));
}

#[test]
fn test_schedule_rejects_bad_cron() {
    let dir = tempfile::TempDir::new().unwrap();
    teetime(&dir)
        .args(["schedule", "--cron", "whenever"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid cron expression"));
}

#[test]
fn test_advice_falls_back_without_key() {
    let dir = tempfile::TempDir::new().unwrap();
    teetime(&dir)
        .args(["advice", "--course", "Rocklands", "--date", "Saturday"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Caddie is taking a break"));
}
