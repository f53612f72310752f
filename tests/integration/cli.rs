//! End-to-end tests of the catalog-sync binary

use assert_cmd::Command;
use catalog_sync::resume::{CheckpointState, CheckpointStore, FileCheckpointStore};
use catalog_sync::sync::JobKind;
use tempfile::TempDir;

fn catalog_sync(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("catalog-sync").unwrap();
    cmd.env_remove("CATALOG_API_KEY")
        .env_remove("CATALOG_SEASON")
        .env("RUST_LOG", "catalog_sync=warn")
        .arg("--db")
        .arg(dir.path().join("catalog.db"))
        .arg("--run-dir")
        .arg(dir.path().join("run"));
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_help_lists_commands() {
    let output = Command::cargo_bin("catalog-sync")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for command in ["seed", "sync", "watchdog", "status", "reset"] {
        assert!(help.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_status_of_untouched_job() {
    let dir = TempDir::new().unwrap();
    let output = catalog_sync(&dir)
        .args(["status", "teams", "--output-format", "json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let status = stdout_json(&output);
    assert_eq!(status["job"], "teams");
    assert_eq!(status["state"], "not_started");
    assert!(status["checkpoint"].is_null());
}

#[test]
fn test_seed_then_status_reports_store_counts() {
    let dir = TempDir::new().unwrap();
    let seed = catalog_sync(&dir)
        .args(["seed", "--league", "39,140", "--season", "2024", "--output-format", "json"])
        .output()
        .unwrap();
    assert!(seed.status.success());
    let report = stdout_json(&seed);
    assert_eq!(report["written"], 2);
    assert_eq!(report["failed"], 0);

    let status = catalog_sync(&dir)
        .args(["status", "squads", "--output-format", "json"])
        .output()
        .unwrap();
    assert!(status.status.success());
    assert_eq!(stdout_json(&status)["store"]["leagues"], 2);
}

#[test]
fn test_status_shows_checkpoint_progress_and_reset_clears_it() {
    let dir = TempDir::new().unwrap();
    let artifacts = FileCheckpointStore::for_job(dir.path().join("run"), JobKind::Squads);
    let mut state = CheckpointState::new(JobKind::Squads, 40);
    state.mark_processed(9);
    state.stats.api_requests = 20;
    state.stats.record_error("team 33 (Manchester United) in league 39: no squad returned");
    artifacts.save(&state).unwrap();

    let output = catalog_sync(&dir).args(["status", "squads"]).output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("in_progress"));
    assert!(text.contains("10/40"));
    assert!(text.contains("showing 1 of 1"));

    let reset = catalog_sync(&dir).args(["reset", "squads"]).output().unwrap();
    assert!(reset.status.success());
    assert!(artifacts.load().unwrap().is_none());
}

#[test]
fn test_unknown_league_is_rejected() {
    let dir = TempDir::new().unwrap();
    let output = catalog_sync(&dir)
        .args(["sync", "teams", "--league", "999999"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_watchdog_gives_up_on_unreachable_provider() {
    let dir = TempDir::new().unwrap();
    // nothing listens on the discard port, so every worker defers its unit
    let output = catalog_sync(&dir)
        .args([
            "watchdog",
            "teams",
            "--league",
            "39",
            "--season",
            "2024",
            "--api-url",
            "http://127.0.0.1:9",
            "--delay-ms",
            "0",
            "--poll-secs",
            "1",
            "--backoff-secs",
            "0",
            "--max-restarts",
            "1",
        ])
        .timeout(std::time::Duration::from_secs(60))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let artifacts = FileCheckpointStore::for_job(dir.path().join("run"), JobKind::Teams);
    let state = artifacts.load().unwrap().unwrap();
    assert_eq!(state.next_index(), 0);
    assert_eq!(state.pending_attempts, 2);
    assert!(state.stats.errors.iter().all(|e| e.contains("league 39")));
}
