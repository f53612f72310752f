//! Integration tests for the watchdog supervisor with scripted workers

use async_trait::async_trait;
use catalog_sync::resume::{CheckpointState, CheckpointStore, FileCheckpointStore, ResultRecord};
use catalog_sync::shutdown::ShutdownCoordinator;
use catalog_sync::sync::config::QUOTA_EXIT_CODE;
use catalog_sync::sync::JobKind;
use catalog_sync::watchdog::{
    ProcessHandle, ProcessLauncher, Watchdog, WatchdogConfig, WatchdogError, WatchdogOutcome,
    EXIT_BUDGET_PAUSE, EXIT_RESTART_LIMIT, EXIT_SHUTDOWN,
};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// What a scripted worker does when launched
#[derive(Debug, Clone, Copy)]
enum Worker {
    /// Exit immediately with this code
    Exit(i32),
    /// Stay alive without ever checkpointing
    Hang,
    /// Checkpoint with this many API requests, then stay alive
    Spend(u64),
    /// Write the result record, then stay alive
    Finish,
    /// Checkpoint up to this unit, then exit 0 as a `--max-units` batch does
    Batch(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Launch,
    Terminate,
    Kill,
}

type Events = Arc<Mutex<Vec<Event>>>;

struct ScriptedLauncher {
    script: Mutex<VecDeque<Worker>>,
    artifacts: FileCheckpointStore,
    events: Events,
}

impl ScriptedLauncher {
    fn new(artifacts: FileCheckpointStore, script: &[Worker]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            artifacts,
            events: Arc::default(),
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn launches(&self) -> usize {
        self.events().iter().filter(|e| **e == Event::Launch).count()
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn ProcessHandle>, WatchdogError> {
        self.events.lock().unwrap().push(Event::Launch);
        let worker = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Worker::Exit(1));

        let mut handle = ScriptedHandle {
            alive: true,
            exit: None,
            events: self.events.clone(),
        };
        match worker {
            Worker::Exit(code) => {
                handle.alive = false;
                handle.exit = Some(code);
            }
            Worker::Hang => {}
            Worker::Spend(api_requests) => {
                let mut state = CheckpointState::new(JobKind::Teams, 10);
                state.stats.api_requests = api_requests;
                self.artifacts.save(&state)?;
            }
            Worker::Batch(last) => {
                let mut state = self
                    .artifacts
                    .load()?
                    .unwrap_or_else(|| CheckpointState::new(JobKind::Teams, 10));
                state.mark_processed(last);
                self.artifacts.save(&state)?;
                handle.alive = false;
                handle.exit = Some(0);
            }
            Worker::Finish => {
                let mut state = CheckpointState::new(JobKind::Teams, 10);
                state.mark_processed(9);
                self.artifacts
                    .save_result(&ResultRecord::from_checkpoint(&state, Utc::now()))?;
                self.artifacts.clear()?;
            }
        }
        Ok(Box::new(handle))
    }
}

struct ScriptedHandle {
    alive: bool,
    exit: Option<i32>,
    events: Events,
}

#[async_trait]
impl ProcessHandle for ScriptedHandle {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    fn exit_code(&self) -> Option<i32> {
        self.exit
    }

    async fn terminate(&mut self, _grace: Duration) {
        self.events.lock().unwrap().push(Event::Terminate);
        self.alive = false;
    }

    async fn kill(&mut self) {
        self.events.lock().unwrap().push(Event::Kill);
        self.alive = false;
    }
}

fn config() -> WatchdogConfig {
    WatchdogConfig {
        poll_interval: Duration::from_millis(10),
        stale_after: Duration::from_secs(5),
        spawn_grace: Duration::from_millis(40),
        restart_backoff: Duration::ZERO,
        budget: 1_000,
        budget_margin: 100,
        max_restarts: None,
        terminate_grace: Duration::ZERO,
    }
}

struct Harness {
    _dir: TempDir,
    artifacts: FileCheckpointStore,
    launcher: Arc<ScriptedLauncher>,
}

fn harness(script: &[Worker]) -> Harness {
    let dir = TempDir::new().unwrap();
    let artifacts = FileCheckpointStore::for_job(dir.path(), JobKind::Teams);
    let launcher = Arc::new(ScriptedLauncher::new(artifacts.clone(), script));
    Harness {
        _dir: dir,
        artifacts,
        launcher,
    }
}

impl Harness {
    fn watchdog(&self, config: WatchdogConfig) -> Watchdog {
        Watchdog::new(
            config,
            self.launcher.clone(),
            Arc::new(self.artifacts.clone()),
            ShutdownCoordinator::shared(),
        )
    }
}

#[tokio::test]
async fn test_crashed_worker_is_restarted_until_completion() {
    let h = harness(&[Worker::Exit(1), Worker::Exit(101), Worker::Finish]);

    let outcome = h.watchdog(config()).run().await.unwrap();

    assert!(matches!(outcome, WatchdogOutcome::Completed(_)));
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(h.launcher.launches(), 3);
    // the finishing worker was still alive and got stopped
    assert_eq!(h.launcher.events().last(), Some(&Event::Terminate));
}

#[tokio::test]
async fn test_silent_worker_is_killed_and_replaced() {
    let h = harness(&[Worker::Hang, Worker::Finish]);

    let outcome = h.watchdog(config()).run().await.unwrap();

    assert!(matches!(outcome, WatchdogOutcome::Completed(_)));
    assert_eq!(
        h.launcher.events(),
        vec![Event::Launch, Event::Kill, Event::Launch, Event::Terminate]
    );
}

#[tokio::test]
async fn test_stale_checkpoint_counts_from_spawn_time() {
    let h = harness(&[Worker::Hang, Worker::Finish]);
    // a checkpoint written long before this worker started
    let mut old = CheckpointState::new(JobKind::Teams, 10);
    old.updated_at = Utc::now() - chrono::Duration::hours(1);
    h.artifacts.save(&old).unwrap();

    let config = WatchdogConfig {
        stale_after: Duration::from_millis(60),
        ..config()
    };
    let started = Instant::now();
    let outcome = h.watchdog(config).run().await.unwrap();

    assert!(matches!(outcome, WatchdogOutcome::Completed(_)));
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(h.launcher.launches(), 2);
    assert!(h.launcher.events().contains(&Event::Kill));
}

#[tokio::test]
async fn test_budget_threshold_terminates_worker() {
    let h = harness(&[Worker::Spend(950)]);

    let outcome = h.watchdog(config()).run().await.unwrap();

    assert_eq!(outcome, WatchdogOutcome::BudgetReached { api_requests: 950 });
    assert_eq!(outcome.exit_code(), EXIT_BUDGET_PAUSE);
    assert_eq!(h.launcher.events(), vec![Event::Launch, Event::Terminate]);
    // the checkpoint is left for the next run
    assert!(h.artifacts.load().unwrap().is_some());
}

#[tokio::test]
async fn test_spent_budget_prevents_any_launch() {
    let h = harness(&[Worker::Finish]);
    let mut state = CheckpointState::new(JobKind::Teams, 10);
    state.stats.api_requests = 900;
    h.artifacts.save(&state).unwrap();

    let outcome = h.watchdog(config()).run().await.unwrap();

    assert_eq!(outcome, WatchdogOutcome::BudgetReached { api_requests: 900 });
    assert_eq!(h.launcher.launches(), 0);
}

#[tokio::test]
async fn test_existing_result_needs_no_worker() {
    let h = harness(&[Worker::Hang]);
    let state = CheckpointState::new(JobKind::Teams, 0);
    h.artifacts
        .save_result(&ResultRecord::from_checkpoint(&state, Utc::now()))
        .unwrap();

    let outcome = h.watchdog(config()).run().await.unwrap();

    assert!(matches!(outcome, WatchdogOutcome::Completed(_)));
    assert_eq!(h.launcher.launches(), 0);
}

#[tokio::test]
async fn test_quota_exit_pauses_instead_of_restarting() {
    let h = harness(&[Worker::Exit(QUOTA_EXIT_CODE), Worker::Finish]);

    let outcome = h.watchdog(config()).run().await.unwrap();

    assert_eq!(outcome, WatchdogOutcome::QuotaExhausted);
    assert_eq!(outcome.exit_code(), EXIT_BUDGET_PAUSE);
    assert_eq!(h.launcher.launches(), 1);
}

#[tokio::test]
async fn test_restart_limit_gives_up() {
    let h = harness(&[]);
    let config = WatchdogConfig {
        max_restarts: Some(2),
        ..config()
    };

    let outcome = h.watchdog(config).run().await.unwrap();

    assert_eq!(outcome, WatchdogOutcome::RestartLimit { restarts: 2 });
    assert_eq!(outcome.exit_code(), EXIT_RESTART_LIMIT);
    assert_eq!(h.launcher.launches(), 3);
}

#[tokio::test]
async fn test_shutdown_stops_worker() {
    let h = harness(&[Worker::Hang]);
    let shutdown = ShutdownCoordinator::shared();
    let config = WatchdogConfig {
        spawn_grace: Duration::from_secs(60),
        ..config()
    };
    let watchdog = Watchdog::new(
        config,
        h.launcher.clone(),
        Arc::new(h.artifacts.clone()),
        shutdown.clone(),
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.request_shutdown();
    });
    let outcome = watchdog.run().await.unwrap();

    assert_eq!(outcome, WatchdogOutcome::Shutdown);
    assert_eq!(outcome.exit_code(), EXIT_SHUTDOWN);
    assert_eq!(h.launcher.events(), vec![Event::Launch, Event::Terminate]);
}

#[tokio::test]
async fn test_batch_exits_relaunch_without_using_restarts() {
    let h = harness(&[
        Worker::Batch(2),
        Worker::Batch(5),
        Worker::Batch(8),
        Worker::Finish,
    ]);
    let config = WatchdogConfig {
        max_restarts: Some(1),
        ..config()
    };

    let outcome = h.watchdog(config).run().await.unwrap();

    assert!(matches!(outcome, WatchdogOutcome::Completed(_)));
    assert_eq!(h.launcher.launches(), 4);
    assert!(!h.launcher.events().contains(&Event::Kill));
}

#[tokio::test]
async fn test_clean_exit_without_progress_counts_as_restart() {
    let h = harness(&[Worker::Batch(3), Worker::Exit(0), Worker::Exit(0)]);
    let config = WatchdogConfig {
        max_restarts: Some(1),
        ..config()
    };

    let outcome = h.watchdog(config).run().await.unwrap();

    assert_eq!(outcome, WatchdogOutcome::RestartLimit { restarts: 1 });
    assert_eq!(h.launcher.launches(), 3);
}
