//! Worker process handles
//!
//! The supervisor only needs four things from a worker: is it alive, how did
//! it exit, ask it to stop, force it to stop. [`ProcessHandle`] captures that,
//! and [`ProcessLauncher`] starts a new one; tests substitute scripted fakes.

use super::WatchdogError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Running (or finished) worker
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, if known
    fn id(&self) -> Option<u32>;

    /// Whether the process is still running
    fn is_alive(&mut self) -> bool;

    /// Exit code once the process has exited (`None` while running or when
    /// killed by a signal)
    fn exit_code(&self) -> Option<i32>;

    /// Ask the process to stop, then kill it if it is still running after `grace`
    async fn terminate(&mut self, grace: Duration);

    /// Kill the process immediately
    async fn kill(&mut self);
}

/// Starts worker processes
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start a new worker
    async fn launch(&self) -> Result<Box<dyn ProcessHandle>, WatchdogError>;
}

/// Launches a command with piped output relayed to the log
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl CommandLauncher {
    /// Launcher for `program args...`
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Add an environment variable for the child
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Program path
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Arguments passed to the program
    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn launch(&self) -> Result<Box<dyn ProcessHandle>, WatchdogError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            WatchdogError::Spawn(format!(
                "failed to start worker '{}': {e}",
                self.program.display()
            ))
        })?;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(relay_lines(stdout, pid, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_lines(stderr, pid, "stderr"));
        }

        Ok(Box::new(ChildProcess::new(child)))
    }
}

async fn relay_lines<R>(stream: R, pid: Option<u32>, name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(target: "catalog_sync::worker", pid, stream = name, "{line}"),
            Ok(None) => break,
            Err(e) => {
                debug!(pid, stream = name, error = %e, "Worker output closed");
                break;
            }
        }
    }
}

/// [`ProcessHandle`] over a tokio child
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    status: Option<ExitStatus>,
}

impl ChildProcess {
    /// Wrap a spawned child
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            status: None,
        }
    }

    fn record(&mut self, status: ExitStatus) {
        if self.status.is_none() {
            debug!(pid = self.pid, %status, "Worker exited");
            self.status = Some(status);
        }
    }

    #[cfg(unix)]
    fn send_sigterm(&self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid.and_then(|p| i32::try_from(p).ok()) else {
            return false;
        };
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => true,
            Err(e) => {
                warn!(pid, error = %e, "Failed to send SIGTERM");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn send_sigterm(&self) -> bool {
        false
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.record(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(pid = self.pid, error = %e, "Failed to poll worker status");
                false
            }
        }
    }

    fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    async fn terminate(&mut self, grace: Duration) {
        if !self.is_alive() {
            return;
        }
        if self.send_sigterm() {
            info!(pid = self.pid, grace_secs = grace.as_secs(), "Sent SIGTERM to worker");
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    self.record(status);
                    return;
                }
                Ok(Err(e)) => warn!(pid = self.pid, error = %e, "Failed waiting for worker"),
                Err(_) => warn!(pid = self.pid, "Worker ignored SIGTERM, killing"),
            }
        }
        self.kill().await;
    }

    async fn kill(&mut self) {
        if self.status.is_some() {
            return;
        }
        if let Err(e) = self.child.kill().await {
            warn!(pid = self.pid, error = %e, "Failed to kill worker");
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.record(status);
        }
    }
}
