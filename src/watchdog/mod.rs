//! Worker supervision
//!
//! The watchdog runs the sync worker as a child process and watches it only
//! through the run artifacts: the checkpoint's `updatedAt` is the liveness
//! signal, its `stats.apiRequests` feeds the budget check, and the result
//! record is the one completion signal. The decision for each poll is made by
//! [`assess`], a pure function of what was observed.

pub mod process;

pub use process::{ChildProcess, CommandLauncher, ProcessHandle, ProcessLauncher};

use crate::resume::{CheckpointState, CheckpointStore, ResultRecord, ResumeError};
use crate::shutdown::SharedShutdown;
use crate::sync::config::QUOTA_EXIT_CODE;
use crate::sync::progress::format_duration;
use crate::sync::Stats;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default poll interval (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
/// Default staleness threshold (seconds)
pub const DEFAULT_STALE_AFTER_SECS: u64 = 120;
/// Default time a new worker gets to write its first checkpoint (seconds)
pub const DEFAULT_SPAWN_GRACE_SECS: u64 = 120;
/// Default pause before restarting a worker (seconds)
pub const DEFAULT_RESTART_BACKOFF_SECS: u64 = 5;
/// Default call budget per run
pub const DEFAULT_BUDGET: u64 = 7_500;
/// Default safety margin below the budget
pub const DEFAULT_BUDGET_MARGIN: u64 = 100;
/// Default wait between SIGTERM and kill (seconds)
pub const DEFAULT_TERMINATE_GRACE_SECS: u64 = 10;

/// Exit code: run completed
pub const EXIT_COMPLETED: i32 = 0;
/// Exit code: run paused on budget or provider quota
pub const EXIT_BUDGET_PAUSE: i32 = 2;
/// Exit code: restart limit reached
pub const EXIT_RESTART_LIMIT: i32 = 3;
/// Exit code: stopped by an external signal
pub const EXIT_SHUTDOWN: i32 = 130;

/// Watchdog errors
#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    /// Worker could not be started
    #[error("spawn error: {0}")]
    Spawn(String),

    /// Artifacts could not be read
    #[error(transparent)]
    Resume(#[from] ResumeError),
}

/// Supervision settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Time between artifact polls
    pub poll_interval: Duration,
    /// Checkpoint age after which the worker is presumed stuck
    pub stale_after: Duration,
    /// Time a new worker gets before a missing checkpoint counts as a stall
    pub spawn_grace: Duration,
    /// Pause before restarting a worker
    pub restart_backoff: Duration,
    /// Call ceiling for the run
    pub budget: u64,
    /// Safety margin below `budget`
    pub budget_margin: u64,
    /// Give up after this many restarts (`None` = never)
    pub max_restarts: Option<u32>,
    /// Wait between the graceful stop signal and a kill
    pub terminate_grace: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            spawn_grace: Duration::from_secs(DEFAULT_SPAWN_GRACE_SECS),
            restart_backoff: Duration::from_secs(DEFAULT_RESTART_BACKOFF_SECS),
            budget: DEFAULT_BUDGET,
            budget_margin: DEFAULT_BUDGET_MARGIN,
            max_restarts: None,
            terminate_grace: Duration::from_secs(DEFAULT_TERMINATE_GRACE_SECS),
        }
    }
}

impl WatchdogConfig {
    /// Request count at which the run is paused
    pub fn budget_threshold(&self) -> u64 {
        self.budget.saturating_sub(self.budget_margin)
    }

    /// Whether `stats` has reached the pause threshold
    pub fn budget_reached(&self, stats: &Stats) -> bool {
        stats.api_requests >= self.budget_threshold()
    }
}

/// What one poll observed
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Checkpoint, if present
    pub checkpoint: Option<CheckpointState>,
    /// Result record, if present
    pub result: Option<ResultRecord>,
    /// Whether the worker process is running
    pub child_alive: bool,
    /// Worker exit code, once exited
    pub child_exit: Option<i32>,
    /// When the current worker was started
    pub spawned_at: DateTime<Utc>,
    /// Next unit index when the current worker was started
    pub resume_index: usize,
}

/// Decision for one poll
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// A result record exists
    Completed(ResultRecord),
    /// The call counter reached the budget threshold
    BudgetReached {
        /// Calls made so far
        api_requests: u64,
    },
    /// The worker stopped because the provider quota is spent
    QuotaExhausted,
    /// The worker exited cleanly after moving the cursor forward
    Paused {
        /// Next unit to process
        next_index: usize,
    },
    /// The worker exited without completing
    Crashed {
        /// Exit code (`None` when killed by a signal)
        exit_code: Option<i32>,
    },
    /// No progress within the staleness threshold
    Stalled {
        /// Time since the last sign of progress
        silent_for: Duration,
    },
    /// Worker alive and recently checkpointed
    Healthy {
        /// Whether stats differ from the previous report
        stats_changed: bool,
    },
    /// Worker alive, no checkpoint yet, still within the spawn grace period
    Waiting,
}

/// Decide what to do with the worker
///
/// Precedence: completion, then budget, then worker exit, then staleness. A
/// clean exit counts as a pause only when the checkpoint moved past the index
/// the worker started from; any other exit without a result is a crash. The
/// staleness clock starts at whichever is later, the checkpoint's `updatedAt`
/// or the current worker's start, so a restarted worker is not judged by the
/// age of its predecessor's last write.
pub fn assess(
    config: &WatchdogConfig,
    now: DateTime<Utc>,
    snapshot: &Snapshot,
    last_stats: Option<&Stats>,
) -> Verdict {
    if let Some(result) = &snapshot.result {
        return Verdict::Completed(result.clone());
    }

    if let Some(checkpoint) = &snapshot.checkpoint {
        if config.budget_reached(&checkpoint.stats) {
            return Verdict::BudgetReached {
                api_requests: checkpoint.stats.api_requests,
            };
        }
    }

    if !snapshot.child_alive {
        if snapshot.child_exit == Some(QUOTA_EXIT_CODE) {
            return Verdict::QuotaExhausted;
        }
        if let (Some(0), Some(checkpoint)) = (snapshot.child_exit, &snapshot.checkpoint) {
            if checkpoint.next_index() > snapshot.resume_index {
                return Verdict::Paused {
                    next_index: checkpoint.next_index(),
                };
            }
        }
        return Verdict::Crashed {
            exit_code: snapshot.child_exit,
        };
    }

    let since_spawn = elapsed(now, snapshot.spawned_at);
    match &snapshot.checkpoint {
        None if since_spawn <= config.spawn_grace => Verdict::Waiting,
        None => Verdict::Stalled {
            silent_for: since_spawn,
        },
        Some(checkpoint) => {
            let last_sign = checkpoint.updated_at.max(snapshot.spawned_at);
            let silent_for = elapsed(now, last_sign);
            if silent_for > config.stale_after {
                Verdict::Stalled { silent_for }
            } else {
                Verdict::Healthy {
                    stats_changed: last_stats != Some(&checkpoint.stats),
                }
            }
        }
    }
}

fn elapsed(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    now.signed_duration_since(since)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// How supervision ended
#[derive(Debug, Clone, PartialEq)]
pub enum WatchdogOutcome {
    /// The run completed
    Completed(ResultRecord),
    /// Paused at the budget threshold
    BudgetReached {
        /// Calls made when the run was paused
        api_requests: u64,
    },
    /// Paused because the provider quota is spent
    QuotaExhausted,
    /// Too many restarts
    RestartLimit {
        /// Restarts performed
        restarts: u32,
    },
    /// Stopped by an external signal
    Shutdown,
}

impl WatchdogOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(_) => EXIT_COMPLETED,
            Self::BudgetReached { .. } | Self::QuotaExhausted => EXIT_BUDGET_PAUSE,
            Self::RestartLimit { .. } => EXIT_RESTART_LIMIT,
            Self::Shutdown => EXIT_SHUTDOWN,
        }
    }
}

/// Why the current worker is being replaced
enum Replace {
    Paused(usize),
    Crashed(Option<i32>),
    Stalled(Duration),
}

impl Replace {
    fn reason(&self) -> &'static str {
        match self {
            Self::Paused(_) => "paused",
            Self::Crashed(_) => "crashed",
            Self::Stalled(_) => "stalled",
        }
    }
}

/// Supervisor for one job's worker
pub struct Watchdog {
    config: WatchdogConfig,
    launcher: Arc<dyn ProcessLauncher>,
    checkpoints: Arc<dyn CheckpointStore>,
    shutdown: SharedShutdown,
}

impl Watchdog {
    /// Watchdog over the given launcher and artifacts
    pub fn new(
        config: WatchdogConfig,
        launcher: Arc<dyn ProcessLauncher>,
        checkpoints: Arc<dyn CheckpointStore>,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            config,
            launcher,
            checkpoints,
            shutdown,
        }
    }

    /// Supervise until completion, budget pause, restart limit or shutdown
    pub async fn run(&self) -> Result<WatchdogOutcome, WatchdogError> {
        let checkpoint = self.checkpoints.load()?;
        if checkpoint.is_none() {
            if let Some(result) = self.checkpoints.load_result()? {
                info!(completed_at = %result.completed_at, "Run already complete");
                self.report_completion(&result);
                return Ok(WatchdogOutcome::Completed(result));
            }
        }
        if let Some(state) = &checkpoint {
            if self.config.budget_reached(&state.stats) {
                warn!(
                    api_requests = state.stats.api_requests,
                    threshold = self.config.budget_threshold(),
                    "Budget already reached, not starting a worker"
                );
                crate::metrics::record_budget_pause();
                return Ok(WatchdogOutcome::BudgetReached {
                    api_requests: state.stats.api_requests,
                });
            }
        }

        info!(
            poll_secs = self.config.poll_interval.as_secs_f64(),
            stale_secs = self.config.stale_after.as_secs(),
            budget = self.config.budget,
            margin = self.config.budget_margin,
            "Watchdog started"
        );

        let mut last_stats = checkpoint.map(|c| c.stats);
        let mut restarts = 0u32;

        loop {
            if self.shutdown.is_shutdown_requested() {
                return Ok(WatchdogOutcome::Shutdown);
            }

            let resume_index = self.resume_index();
            let mut child = self.launcher.launch().await?;
            let spawned_at = Utc::now();
            info!(pid = child.id(), restarts, resume_index, "Worker started");

            let replace = match self
                .supervise(&mut *child, spawned_at, resume_index, &mut last_stats)
                .await?
            {
                Ok(outcome) => return Ok(outcome),
                Err(replace) => replace,
            };

            match &replace {
                Replace::Paused(next_index) => {
                    // a batch finished; not a failure
                    info!(next_index, "Worker paused after a batch, continuing");
                    continue;
                }
                Replace::Crashed(code) => {
                    warn!(exit_code = ?code, "Worker exited without completing")
                }
                Replace::Stalled(silent_for) => {
                    warn!(
                        silent_secs = silent_for.as_secs(),
                        "Worker stalled, killing it"
                    );
                    child.kill().await;
                }
            }

            if let Some(max) = self.config.max_restarts {
                if restarts >= max {
                    error!(restarts, "Restart limit reached, giving up");
                    return Ok(WatchdogOutcome::RestartLimit { restarts });
                }
            }
            restarts += 1;
            crate::metrics::record_restart(replace.reason());
            info!(
                restarts,
                reason = replace.reason(),
                backoff_secs = self.config.restart_backoff.as_secs_f64(),
                "Restarting worker"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.restart_backoff) => {}
                _ = self.shutdown.wait_for_shutdown() => {
                    info!("Shutdown requested during restart backoff");
                    return Ok(WatchdogOutcome::Shutdown);
                }
            }
        }
    }

    /// Poll one worker until it finishes the run or must be replaced
    async fn supervise(
        &self,
        child: &mut dyn ProcessHandle,
        spawned_at: DateTime<Utc>,
        resume_index: usize,
        last_stats: &mut Option<Stats>,
    ) -> Result<Result<WatchdogOutcome, Replace>, WatchdogError> {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.shutdown.wait_for_shutdown() => {
                    info!(pid = child.id(), "Shutdown requested, stopping worker");
                    child.terminate(self.config.terminate_grace).await;
                    return Ok(Ok(WatchdogOutcome::Shutdown));
                }
            }

            let snapshot = match self.snapshot(child, spawned_at, resume_index) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "Failed to read run artifacts, retrying next poll");
                    continue;
                }
            };

            match assess(&self.config, Utc::now(), &snapshot, last_stats.as_ref()) {
                Verdict::Completed(result) => {
                    if child.is_alive() {
                        child.terminate(self.config.terminate_grace).await;
                    }
                    self.report_completion(&result);
                    return Ok(Ok(WatchdogOutcome::Completed(result)));
                }
                Verdict::BudgetReached { api_requests } => {
                    warn!(
                        api_requests,
                        budget = self.config.budget,
                        threshold = self.config.budget_threshold(),
                        "Call budget reached, pausing run"
                    );
                    crate::metrics::record_budget_pause();
                    child.terminate(self.config.terminate_grace).await;
                    return Ok(Ok(WatchdogOutcome::BudgetReached { api_requests }));
                }
                Verdict::QuotaExhausted => {
                    warn!("Worker reported provider quota exhausted, pausing run");
                    crate::metrics::record_budget_pause();
                    return Ok(Ok(WatchdogOutcome::QuotaExhausted));
                }
                Verdict::Paused { next_index } => return Ok(Err(Replace::Paused(next_index))),
                Verdict::Crashed { exit_code } => return Ok(Err(Replace::Crashed(exit_code))),
                Verdict::Stalled { silent_for } => return Ok(Err(Replace::Stalled(silent_for))),
                Verdict::Healthy { stats_changed } => {
                    if let (true, Some(state)) = (stats_changed, snapshot.checkpoint) {
                        info!(
                            next_index = state.next_index(),
                            total_units = state.total_units,
                            "[WATCHDOG] {}",
                            state.stats.summary_line()
                        );
                        *last_stats = Some(state.stats);
                    } else {
                        debug!(pid = child.id(), "Worker healthy, no new progress");
                    }
                }
                Verdict::Waiting => debug!(pid = child.id(), "Waiting for first checkpoint"),
            }
        }
    }

    fn snapshot(
        &self,
        child: &mut dyn ProcessHandle,
        spawned_at: DateTime<Utc>,
        resume_index: usize,
    ) -> Result<Snapshot, WatchdogError> {
        // liveness first: a worker that exits between the reads has already
        // written whatever it was going to write
        let child_alive = child.is_alive();
        // checkpoint before result: the worker writes the result before it
        // removes the checkpoint, so one of the two is always seen
        let checkpoint = self.checkpoints.load()?;
        let result = self.checkpoints.load_result()?;
        Ok(Snapshot {
            checkpoint,
            result,
            child_alive,
            child_exit: child.exit_code(),
            spawned_at,
            resume_index,
        })
    }

    fn resume_index(&self) -> usize {
        match self.checkpoints.load() {
            Ok(checkpoint) => checkpoint.map_or(0, |c| c.next_index()),
            Err(e) => {
                warn!(error = %e, "Failed to read checkpoint before launch");
                0
            }
        }
    }

    fn report_completion(&self, result: &ResultRecord) {
        info!(
            job = %result.job,
            duration = %format_duration(Duration::from_secs(result.duration_seconds.max(0) as u64)),
            "[WATCHDOG] Run complete: {}",
            result.stats.summary_line()
        );
        for message in result.stats.displayed_errors() {
            info!("  {message}");
        }
    }
}
