//! Status and reset commands

use super::{print_json, Cli, CliError, OutputFormat};
use crate::resume::{CheckpointState, CheckpointStore, FileCheckpointStore, ResultRecord, RunLock};
use crate::store::CatalogStore;
use crate::sync::progress::format_duration;
use crate::sync::{JobKind, Stats};
use chrono::Utc;
use clap::Args;
use serde_json::json;
use tracing::info;

/// `status <job>` arguments
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Job to inspect: teams or squads
    pub job: JobKind,
}

/// `reset <job>` arguments
#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    /// Job to reset: teams or squads
    pub job: JobKind,
}

/// Lifecycle of a job as seen from its artifacts
fn run_state(checkpoint: Option<&CheckpointState>, result: Option<&ResultRecord>) -> &'static str {
    match (checkpoint, result) {
        (Some(_), _) => "in_progress",
        (None, Some(_)) => "complete",
        (None, None) => "not_started",
    }
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, cli: &Cli) -> Result<i32, CliError> {
        let artifacts = FileCheckpointStore::for_job(&cli.run_dir, self.job);
        let checkpoint = artifacts.load()?;
        let result = artifacts.load_result()?;
        let state = run_state(checkpoint.as_ref(), result.as_ref());

        let counts = if cli.db.exists() {
            let store = cli.open_store().await?;
            let counts = store.counts().await?;
            store.close().await;
            Some(counts)
        } else {
            None
        };

        match cli.output_format {
            OutputFormat::Json => print_json(&json!({
                "job": self.job,
                "state": state,
                "checkpoint": checkpoint,
                "result": result,
                "store": counts,
            }))?,
            OutputFormat::Human => {
                println!("Job:   {}", self.job);
                println!("State: {state}");
                if let Some(cp) = &checkpoint {
                    let done = cp.processed_units();
                    let pct = if cp.total_units > 0 {
                        done as f64 / cp.total_units as f64 * 100.0
                    } else {
                        0.0
                    };
                    let age = cp.age(Utc::now()).to_std().unwrap_or_default();
                    println!("Units: {done}/{} ({pct:.1}%)", cp.total_units);
                    if cp.pending_attempts > 0 {
                        println!("Next unit deferred {} time(s)", cp.pending_attempts);
                    }
                    println!("Updated: {} ({} ago)", cp.updated_at, format_duration(age));
                    print_stats(&cp.stats);
                } else if let Some(result) = &result {
                    println!(
                        "Completed: {} after {}s ({} units)",
                        result.completed_at, result.duration_seconds, result.total_units
                    );
                    print_stats(&result.stats);
                }
                if let Some(counts) = counts {
                    println!(
                        "Store: leagues={} teams={} memberships={} squads={} coaches={}",
                        counts.leagues, counts.teams, counts.league_teams, counts.squads, counts.coaches
                    );
                }
            }
        }
        Ok(0)
    }
}

fn print_stats(stats: &Stats) {
    println!("Stats: {}", stats.summary_line());
    let shown = stats.displayed_errors();
    if !shown.is_empty() {
        println!(
            "Errors (showing {} of {}):",
            shown.len(),
            stats.total_errors()
        );
        for message in shown {
            println!("  - {message}");
        }
    }
}

impl ResetArgs {
    /// Execute the reset command
    ///
    /// Refuses while a worker holds the job's lock.
    pub fn execute(&self, cli: &Cli) -> Result<i32, CliError> {
        let _lock = RunLock::try_acquire(&cli.run_dir, self.job)?;
        let artifacts = FileCheckpointStore::for_job(&cli.run_dir, self.job);
        artifacts.clear()?;
        artifacts.clear_result()?;
        info!(job = %self.job, "Run artifacts removed");

        match cli.output_format {
            OutputFormat::Json => print_json(&json!({ "job": self.job, "reset": true }))?,
            OutputFormat::Human => println!("Reset {} run state", self.job),
        }
        Ok(0)
    }
}
