//! Watchdog command

use super::{print_json, Cli, CliError, OutputFormat, SyncOptions, API_KEY_ENV};
use crate::resume::{CheckpointStore, FileCheckpointStore, RunLock};
use crate::shutdown::SharedShutdown;
use crate::sync::JobKind;
use crate::watchdog::{
    CommandLauncher, Watchdog, WatchdogConfig, WatchdogOutcome, DEFAULT_BUDGET,
    DEFAULT_BUDGET_MARGIN, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RESTART_BACKOFF_SECS,
    DEFAULT_SPAWN_GRACE_SECS, DEFAULT_STALE_AFTER_SECS, DEFAULT_TERMINATE_GRACE_SECS,
};
use clap::Args;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// `watchdog <job>` arguments
#[derive(Args, Debug, Clone)]
pub struct WatchdogArgs {
    /// Job to supervise: teams or squads
    pub job: JobKind,

    #[command(flatten)]
    pub options: SyncOptions,

    /// Seconds between artifact polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_secs: u64,

    /// Checkpoint age in seconds after which the worker is restarted
    #[arg(long, default_value_t = DEFAULT_STALE_AFTER_SECS)]
    pub stale_secs: u64,

    /// Seconds a new worker gets to write its first checkpoint
    #[arg(long, default_value_t = DEFAULT_SPAWN_GRACE_SECS)]
    pub spawn_grace_secs: u64,

    /// Seconds to wait before restarting a worker
    #[arg(long, default_value_t = DEFAULT_RESTART_BACKOFF_SECS)]
    pub backoff_secs: u64,

    /// API call budget for the run
    #[arg(long, default_value_t = DEFAULT_BUDGET)]
    pub budget: u64,

    /// Pause this many calls before the budget
    #[arg(long, default_value_t = DEFAULT_BUDGET_MARGIN)]
    pub budget_margin: u64,

    /// Give up after this many restarts (default: unlimited)
    #[arg(long)]
    pub max_restarts: Option<u32>,

    /// Seconds between the stop signal and a kill
    #[arg(long, default_value_t = DEFAULT_TERMINATE_GRACE_SECS)]
    pub terminate_grace_secs: u64,
}

impl WatchdogArgs {
    /// Supervision settings from the flags
    pub fn config(&self) -> WatchdogConfig {
        WatchdogConfig {
            poll_interval: Duration::from_secs(self.poll_secs),
            stale_after: Duration::from_secs(self.stale_secs),
            spawn_grace: Duration::from_secs(self.spawn_grace_secs),
            restart_backoff: Duration::from_secs(self.backoff_secs),
            budget: self.budget,
            budget_margin: self.budget_margin,
            max_restarts: self.max_restarts,
            terminate_grace: Duration::from_secs(self.terminate_grace_secs),
        }
    }

    /// Arguments for the `sync` worker child
    ///
    /// `--fresh` is never forwarded: a restarted worker must resume.
    pub fn worker_args(&self, cli: &Cli) -> Vec<String> {
        let mut args = vec![
            "sync".to_string(),
            self.job.to_string(),
            "--db".to_string(),
            cli.db.display().to_string(),
            "--run-dir".to_string(),
            cli.run_dir.display().to_string(),
            "--season".to_string(),
            cli.season().to_string(),
            "--api-url".to_string(),
            cli.api_url.clone(),
            "--delay-ms".to_string(),
            self.options.delay_ms.to_string(),
            "--cooldown-secs".to_string(),
            self.options.cooldown_secs.to_string(),
            "--max-throttle-retries".to_string(),
            self.options.max_throttle_retries.to_string(),
        ];
        if let Some(max_units) = self.options.max_units {
            args.push("--max-units".to_string());
            args.push(max_units.to_string());
        }
        if !cli.leagues.is_empty() {
            let ids: Vec<String> = cli.leagues.iter().map(|id| id.to_string()).collect();
            args.push("--league".to_string());
            args.push(ids.join(","));
        }
        args
    }

    /// Execute the watchdog command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<i32, CliError> {
        let checkpoints = Arc::new(FileCheckpointStore::for_job(&cli.run_dir, self.job));

        if self.options.fresh {
            let _lock = RunLock::try_acquire(&cli.run_dir, self.job)?;
            checkpoints.clear()?;
            checkpoints.clear_result()?;
            info!(job = %self.job, "Fresh run requested, previous artifacts removed");
        }

        let program = std::env::current_exe().map_err(|e| {
            CliError::InvalidArgument(format!("Cannot locate the worker executable: {e}"))
        })?;
        let mut launcher = CommandLauncher::new(program, self.worker_args(cli));
        if let Some(key) = &cli.api_key {
            launcher = launcher.env(API_KEY_ENV, key);
        }

        let config = self.config();
        info!(
            job = %self.job,
            budget = config.budget,
            threshold = config.budget_threshold(),
            poll_secs = self.poll_secs,
            stale_secs = self.stale_secs,
            "Starting watchdog"
        );

        let watchdog = Watchdog::new(config, Arc::new(launcher), checkpoints, shutdown);
        let outcome = watchdog.run().await?;
        report_outcome(cli.output_format, self.job, &outcome)?;
        Ok(outcome.exit_code())
    }
}

fn report_outcome(
    format: OutputFormat,
    job: JobKind,
    outcome: &WatchdogOutcome,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let value = match outcome {
                WatchdogOutcome::Completed(result) => {
                    json!({ "job": job, "outcome": "completed", "result": result })
                }
                WatchdogOutcome::BudgetReached { api_requests } => {
                    json!({ "job": job, "outcome": "budget_reached", "apiRequests": api_requests })
                }
                WatchdogOutcome::QuotaExhausted => {
                    json!({ "job": job, "outcome": "quota_exhausted" })
                }
                WatchdogOutcome::RestartLimit { restarts } => {
                    json!({ "job": job, "outcome": "restart_limit", "restarts": restarts })
                }
                WatchdogOutcome::Shutdown => json!({ "job": job, "outcome": "shutdown" }),
            };
            print_json(&value)
        }
        OutputFormat::Human => {
            match outcome {
                WatchdogOutcome::Completed(result) => {
                    println!("✓ {job} run complete: {}", result.stats.summary_line())
                }
                WatchdogOutcome::BudgetReached { api_requests } => println!(
                    "⏸ {job} run paused at {api_requests} API requests; rerun after the quota resets"
                ),
                WatchdogOutcome::QuotaExhausted => {
                    println!("⏸ {job} run paused: provider quota exhausted")
                }
                WatchdogOutcome::RestartLimit { restarts } => {
                    println!("✗ {job} run abandoned after {restarts} restarts")
                }
                WatchdogOutcome::Shutdown => println!("{job} watchdog stopped"),
            }
            Ok(())
        }
    }
}
