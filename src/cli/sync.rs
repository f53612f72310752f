//! Sync command

use super::{print_json, Cli, CliError, OutputFormat};
use crate::resume::FileCheckpointStore;
use crate::store::CatalogStore;
use crate::sync::config::{
    INTER_CALL_DELAY_MS, MAX_THROTTLE_RETRIES, THROTTLE_COOLDOWN_SECS,
};
use crate::sync::{EngineSettings, JobKind, RunOutcome, SyncEngine, WorkList};
use clap::Args;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Options shared by `sync` and `watchdog`
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Discard any existing checkpoint and result first
    #[arg(long, default_value_t = false)]
    pub fresh: bool,

    /// Stop after this many units (the checkpoint is kept)
    #[arg(long)]
    pub max_units: Option<usize>,

    /// Pause between units in milliseconds
    #[arg(long, default_value_t = INTER_CALL_DELAY_MS)]
    pub delay_ms: u64,

    /// Cooldown after a throttling response in seconds
    #[arg(long, default_value_t = THROTTLE_COOLDOWN_SECS)]
    pub cooldown_secs: u64,

    /// Throttled retries per request before giving up
    #[arg(long, default_value_t = MAX_THROTTLE_RETRIES)]
    pub max_throttle_retries: u32,
}

/// `sync <job>` arguments
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Job to run: teams or squads
    pub job: JobKind,

    #[command(flatten)]
    pub options: SyncOptions,
}

/// Build the ordered work list for `job`
pub async fn build_work_list(
    cli: &Cli,
    job: JobKind,
    store: &dyn CatalogStore,
) -> Result<WorkList, CliError> {
    let season = cli.season();
    let leagues = cli.selected_leagues()?;
    let work = match job {
        JobKind::Teams => WorkList::teams(leagues, season),
        JobKind::Squads => WorkList::squads(store, leagues, season).await?,
    };
    if work.is_empty() && job == JobKind::Squads {
        warn!(season, "No teams recorded for the selected leagues; run the teams job first");
    }
    Ok(work)
}

impl SyncArgs {
    /// Execute the sync command
    pub async fn execute(&self, cli: &Cli) -> Result<i32, CliError> {
        let store = Arc::new(cli.open_store().await?);
        let work = build_work_list(cli, self.job, store.as_ref()).await?;
        info!(job = %self.job, season = cli.season(), units = work.len(), "Work list ready");

        let source = Arc::new(cli.source(&self.options));
        let checkpoints = Arc::new(FileCheckpointStore::for_job(&cli.run_dir, self.job));
        let settings = EngineSettings::new(self.job)
            .with_delay(Duration::from_millis(self.options.delay_ms))
            .with_unit_limit(self.options.max_units)
            .with_fresh(self.options.fresh)
            .with_lock_dir(&cli.run_dir);

        let engine = SyncEngine::new(source, store, checkpoints, settings);
        let outcome = engine.run(&work).await?;
        report_outcome(cli.output_format, self.job, &outcome)?;
        Ok(0)
    }
}

fn report_outcome(format: OutputFormat, job: JobKind, outcome: &RunOutcome) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let value = match outcome {
                RunOutcome::Completed(result) => {
                    json!({ "job": job, "outcome": "completed", "result": result })
                }
                RunOutcome::AlreadyComplete(result) => {
                    json!({ "job": job, "outcome": "already_complete", "result": result })
                }
                RunOutcome::Paused(state) => {
                    json!({ "job": job, "outcome": "paused", "checkpoint": state })
                }
            };
            print_json(&value)
        }
        OutputFormat::Human => {
            match outcome {
                RunOutcome::Completed(result) => {
                    println!("✓ {job} sync complete in {}s", result.duration_seconds);
                    println!("  {}", result.stats.summary_line());
                }
                RunOutcome::AlreadyComplete(result) => {
                    println!("✓ {job} sync already complete ({})", result.completed_at);
                    println!("  {}", result.stats.summary_line());
                }
                RunOutcome::Paused(state) => {
                    println!(
                        "⏸ {job} sync paused at unit {}/{}",
                        state.next_index(),
                        state.total_units
                    );
                    println!("  {}", state.stats.summary_line());
                }
            }
            Ok(())
        }
    }
}
