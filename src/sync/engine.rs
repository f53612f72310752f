//! Checkpointed sync engine
//!
//! Walks a [`WorkList`] in order, one unit and one remote call at a time. After
//! every unit the full checkpoint (cursor plus stats) is saved atomically, so
//! a worker killed at any point resumes at the first unit whose checkpoint was
//! not written.

use super::config::{inter_call_delay, MAX_UNIT_ATTEMPTS, PROGRESS_EVERY, QUOTA_EXIT_CODE};
use super::job::{JobKind, UnitStatus, WorkList, WorkUnit};
use super::progress::ProgressTracker;
use super::stats::UnitDelta;
use crate::resume::{CheckpointState, CheckpointStore, ResultRecord, ResumeError, RunLock};
use crate::source::parser::resolve_current_coach;
use crate::source::{CatalogSource, SourceError};
use crate::store::{CatalogStore, StoreError, StoreWriter};
use crate::{CatalogRecord, LeagueTeam, Squad};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Job being run; must match the work list
    pub job: JobKind,
    /// Pause after every unit, before its checkpoint is saved
    pub inter_call_delay: Duration,
    /// Progress summary cadence in units (0 disables)
    pub progress_every: usize,
    /// Stop after this many units in this invocation
    pub unit_limit: Option<usize>,
    /// Discard existing checkpoint and result before starting
    pub fresh: bool,
    /// Worker starts a unit may fail transiently before it is given up
    pub max_unit_attempts: u32,
    /// Directory holding the single-worker lock; `None` skips locking
    pub lock_dir: Option<PathBuf>,
}

impl EngineSettings {
    /// Defaults for `job`
    pub fn new(job: JobKind) -> Self {
        Self {
            job,
            inter_call_delay: inter_call_delay(),
            progress_every: PROGRESS_EVERY,
            unit_limit: None,
            fresh: false,
            max_unit_attempts: MAX_UNIT_ATTEMPTS,
            lock_dir: None,
        }
    }

    /// Set the inter-call delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.inter_call_delay = delay;
        self
    }

    /// Stop after `limit` units
    pub fn with_unit_limit(mut self, limit: Option<usize>) -> Self {
        self.unit_limit = limit;
        self
    }

    /// Start over, discarding previous artifacts
    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Hold the run lock under `dir` while running
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every unit processed; result written and checkpoint removed
    Completed(ResultRecord),
    /// A result already existed and there was no checkpoint to resume
    AlreadyComplete(ResultRecord),
    /// Unit limit reached; the checkpoint stays in place
    Paused(CheckpointState),
}

/// Errors that end an engine run
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Artifact or lock failure
    #[error(transparent)]
    Resume(#[from] ResumeError),

    /// Store failure outside a unit
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Work list built for another job
    #[error("work list is for job {found}, engine runs {expected}")]
    WrongWorkList {
        /// Engine job
        expected: JobKind,
        /// Work list job
        found: JobKind,
    },

    /// Transient remote failure; the unit is retried by the next worker
    #[error("unit {index} ({label}) deferred after attempt {attempt}: {source}")]
    UnitDeferred {
        /// Unit index
        index: usize,
        /// Unit label
        label: String,
        /// Attempts so far
        attempt: u32,
        /// Remote failure
        source: SourceError,
    },

    /// Provider refuses further calls until its quota resets
    #[error("provider quota exhausted at unit {index}: {message}")]
    QuotaExhausted {
        /// Unit index
        index: usize,
        /// Provider message
        message: String,
    },
}

impl SyncError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::QuotaExhausted { .. } => QUOTA_EXIT_CODE,
            _ => 1,
        }
    }
}

/// What processing one unit produced
struct UnitReport {
    delta: UnitDelta,
    /// Transient or quota failure that stopped the unit early
    failure: Option<SourceError>,
}

impl UnitReport {
    fn stopped(delta: UnitDelta, failure: SourceError) -> Self {
        Self {
            delta,
            failure: Some(failure),
        }
    }
}

/// Sequential, checkpointed sync engine
pub struct SyncEngine {
    source: Arc<dyn CatalogSource>,
    writer: StoreWriter,
    checkpoints: Arc<dyn CheckpointStore>,
    settings: EngineSettings,
}

impl SyncEngine {
    /// Engine over the given collaborators
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn CatalogStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            source,
            writer: StoreWriter::new(store),
            checkpoints,
            settings,
        }
    }

    /// Process `work` from the checkpoint cursor to the end (or the unit limit)
    pub async fn run(&self, work: &WorkList) -> Result<RunOutcome, SyncError> {
        let job = self.settings.job;
        if work.job() != job {
            return Err(SyncError::WrongWorkList {
                expected: job,
                found: work.job(),
            });
        }

        let _lock = match &self.settings.lock_dir {
            Some(dir) => Some(RunLock::try_acquire(dir, job)?),
            None => None,
        };

        if self.settings.fresh {
            info!(%job, "Fresh start requested, discarding previous artifacts");
            self.checkpoints.clear()?;
            self.checkpoints.clear_result()?;
        }

        let mut state = match self.checkpoints.load()? {
            Some(state) => {
                if state.job != job {
                    return Err(ResumeError::JobMismatch {
                        expected: job,
                        found: state.job,
                    }
                    .into());
                }
                if state.total_units != 0 && state.total_units != work.len() {
                    warn!(
                        checkpoint_units = state.total_units,
                        work_units = work.len(),
                        "Work list length changed since the checkpoint was written"
                    );
                }
                info!(
                    next_index = state.next_index(),
                    pending_attempts = state.pending_attempts,
                    api_requests = state.stats.api_requests,
                    "Resuming from checkpoint"
                );
                state
            }
            None => {
                if let Some(result) = self.checkpoints.load_result()? {
                    info!(
                        %job,
                        completed_at = %result.completed_at,
                        "Run already complete, nothing to do"
                    );
                    return Ok(RunOutcome::AlreadyComplete(result));
                }
                info!(%job, units = work.len(), "Starting new run");
                CheckpointState::new(job, work.len())
            }
        };
        state.total_units = work.len();

        let base_requests = state.stats.api_requests;
        let requests_at_start = self.source.requests_made();
        let start = state.next_index();
        let mut progress =
            ProgressTracker::new(work.len(), start.min(work.len()), self.settings.progress_every);
        let mut processed_now = 0usize;

        for (index, unit) in work.units().iter().enumerate().skip(start) {
            let attempt = state.pending_attempts + 1;
            debug!(index, unit = %unit.label(), status = ?UnitStatus::InProgress, attempt, "Unit started");

            let span = info_span!("unit", %job, index, attempt);
            let report = self.process_unit(unit).instrument(span).await;

            let made = self.source.requests_made().saturating_sub(requests_at_start);
            state.stats.observe_requests(base_requests + made);

            let mut outcome = "persisted";
            if let Some(failure) = report.failure {
                if failure.is_quota_exhausted() {
                    let message = failure.to_string();
                    state.stats.record_error(format!("{}: {message}", unit.label()));
                    state.touch();
                    self.checkpoints.save(&state)?;
                    crate::metrics::record_unit(job, "quota", index);
                    error!(index, unit = %unit.label(), "Provider quota exhausted, stopping");
                    return Err(SyncError::QuotaExhausted { index, message });
                }

                if attempt < self.settings.max_unit_attempts {
                    state.stats.record_error(format!(
                        "{}: {failure} (attempt {attempt}/{}, will retry)",
                        unit.label(),
                        self.settings.max_unit_attempts
                    ));
                    state.defer();
                    tokio::time::sleep(self.settings.inter_call_delay).await;
                    self.checkpoints.save(&state)?;
                    crate::metrics::record_unit(job, "deferred", index);
                    warn!(
                        index,
                        unit = %unit.label(),
                        status = ?UnitStatus::Failed,
                        attempt,
                        error = %failure,
                        "Transient failure, deferring unit to the next worker"
                    );
                    return Err(SyncError::UnitDeferred {
                        index,
                        label: unit.label(),
                        attempt,
                        source: failure,
                    });
                }

                warn!(index, unit = %unit.label(), attempt, error = %failure, "Giving up on unit");
                state.stats.record_error(format!(
                    "{}: giving up after {attempt} attempts: {failure}",
                    unit.label()
                ));
                outcome = "given_up";
            }

            state.stats.merge(report.delta);
            tokio::time::sleep(self.settings.inter_call_delay).await;
            state.mark_processed(index);
            self.checkpoints.save(&state)?;
            crate::metrics::record_unit(job, outcome, index);
            debug!(index, status = ?UnitStatus::Persisted, "Unit checkpointed");

            progress.unit_done();
            processed_now += 1;
            if progress.should_emit() {
                self.report_progress(&progress, &state);
            }

            if let Some(limit) = self.settings.unit_limit {
                if processed_now >= limit && index + 1 < work.len() {
                    info!(
                        processed = processed_now,
                        next_index = state.next_index(),
                        "Unit limit reached, pausing run"
                    );
                    return Ok(RunOutcome::Paused(state));
                }
            }
        }

        let result = ResultRecord::from_checkpoint(&state, Utc::now());
        self.checkpoints.save_result(&result)?;
        self.checkpoints.clear()?;

        info!(
            %job,
            units = work.len(),
            duration_secs = result.duration_seconds,
            "Run complete: {}",
            result.stats.summary_line()
        );
        for message in result.stats.displayed_errors() {
            warn!("  {message}");
        }
        Ok(RunOutcome::Completed(result))
    }

    fn report_progress(&self, progress: &ProgressTracker, state: &CheckpointState) {
        info!("{}", progress.format_progress(&state.stats));
        let total = state.stats.total_errors();
        if total > 0 {
            let shown = state.stats.displayed_errors();
            info!(errors = total, shown = shown.len(), "Errors so far");
            for message in shown {
                info!("  {message}");
            }
        }
    }

    async fn process_unit(&self, unit: &WorkUnit) -> UnitReport {
        match &unit.team {
            None => self.process_league(unit).await,
            Some(_) => self.process_team(unit).await,
        }
    }

    /// Teams job: fetch the league's teams, upsert teams and memberships
    async fn process_league(&self, unit: &WorkUnit) -> UnitReport {
        let league = &unit.league;
        let mut delta = UnitDelta {
            leagues_processed: 1,
            ..UnitDelta::default()
        };

        let fetched = match self.source.fetch_teams(league.id, league.season).await {
            Ok(fetched) => fetched,
            Err(e) if e.is_transient() || e.is_quota_exhausted() => {
                return UnitReport::stopped(delta, e)
            }
            Err(e) => {
                warn!(league_id = league.id, error = %e, "Failed to fetch teams");
                delta.error(format!("{}: {e}", unit.label()));
                return UnitReport {
                    delta,
                    failure: None,
                };
            }
        };

        if fetched.is_empty() {
            warn!(league_id = league.id, "No teams returned");
            delta.error(format!("{}: no teams returned", unit.label()));
        }
        for rejected in &fetched.rejected {
            warn!(league_id = league.id, error = %rejected, "Skipping malformed team");
            delta.error(format!("{}: {rejected}", unit.label()));
        }

        delta.teams_found = (fetched.records.len() + fetched.rejected.len()) as u64;
        for (position, team) in fetched.records.into_iter().enumerate() {
            let membership = LeagueTeam {
                league_id: league.id,
                season: league.season,
                team_id: team.id,
                position: position as u32,
            };
            if self.writer.upsert(&CatalogRecord::Team(team), &mut delta).await {
                delta.teams_inserted += 1;
            }
            self.writer
                .upsert(&CatalogRecord::LeagueTeam(membership), &mut delta)
                .await;
        }

        info!(
            league_id = league.id,
            league = %league.name,
            found = delta.teams_found,
            inserted = delta.teams_inserted,
            "League processed"
        );
        UnitReport {
            delta,
            failure: None,
        }
    }

    /// Squads job: fetch roster and coaches of one team, upsert both
    async fn process_team(&self, unit: &WorkUnit) -> UnitReport {
        let mut delta = UnitDelta::default();
        let Some(team) = &unit.team else {
            return UnitReport {
                delta,
                failure: None,
            };
        };
        let season = unit.league.season;

        match self.source.fetch_squad(team.id).await {
            Ok(roster) if roster.is_empty() => {
                warn!(team_id = team.id, "No squad returned");
                delta.error(format!("{}: no squad returned", unit.label()));
            }
            Ok(roster) => {
                for rejected in &roster.rejected {
                    warn!(team_id = team.id, error = %rejected, "Skipping malformed player");
                    delta.error(format!("{}: squad: {rejected}", unit.label()));
                }
                delta.squads_found += 1;
                let squad = Squad {
                    team_id: team.id,
                    season,
                    players: roster.records,
                };
                if self.writer.upsert(&CatalogRecord::Squad(squad), &mut delta).await {
                    delta.squads_inserted += 1;
                }
            }
            Err(e) if e.is_transient() || e.is_quota_exhausted() => {
                return UnitReport::stopped(delta, e)
            }
            Err(e) => {
                warn!(team_id = team.id, error = %e, "Failed to fetch squad");
                delta.error(format!("{}: squad: {e}", unit.label()));
            }
        }

        match self.source.fetch_coaches(team.id).await {
            Ok(fetched) => {
                for rejected in &fetched.rejected {
                    warn!(team_id = team.id, error = %rejected, "Skipping malformed coach");
                    delta.error(format!("{}: coaches: {rejected}", unit.label()));
                }
                let coaches = fetched.records;
                match resolve_current_coach(team.id, season, &coaches) {
                    Some(assignment) => {
                        delta.coaches_found += 1;
                        if self
                            .writer
                            .upsert(&CatalogRecord::Coach(assignment), &mut delta)
                            .await
                        {
                            delta.coaches_inserted += 1;
                        }
                    }
                    None => {
                        warn!(
                            team_id = team.id,
                            candidates = coaches.len(),
                            "No current coach resolved"
                        );
                        delta.error(format!("{}: no current coach resolved", unit.label()));
                    }
                }
            }
            Err(e) if e.is_transient() || e.is_quota_exhausted() => {
                return UnitReport::stopped(delta, e)
            }
            Err(e) => {
                warn!(team_id = team.id, error = %e, "Failed to fetch coaches");
                delta.error(format!("{}: coaches: {e}", unit.label()));
            }
        }

        debug!(
            team_id = team.id,
            squads = delta.squads_inserted,
            coaches = delta.coaches_inserted,
            "Team processed"
        );
        UnitReport {
            delta,
            failure: None,
        }
    }
}
