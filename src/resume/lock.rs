//! Single-worker guard
//!
//! Advisory file lock using fd-lock. Only one engine may work on a job's
//! artifacts at a time; a second worker fails fast instead of racing the first.

use super::state::ResumeError;
use crate::sync::JobKind;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive lock on a job's run directory entry
///
/// The lock is held for as long as the value lives; it is released when the
/// underlying file handle closes.
pub struct RunLock {
    #[allow(dead_code)]
    lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Lock file path for `job` under `run_dir`
    pub fn path_for(run_dir: &Path, job: JobKind) -> PathBuf {
        run_dir.join(format!("{job}.lock"))
    }

    /// Try to take the lock without blocking
    ///
    /// Returns [`ResumeError::LockError`] if another worker holds it.
    pub fn try_acquire(run_dir: &Path, job: JobKind) -> Result<Self, ResumeError> {
        std::fs::create_dir_all(run_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let path = Self::path_for(run_dir, job);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        let guard = lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "another {job} worker holds {}: {e}",
                path.display()
            ))
        })?;
        // Keep the OS lock past the guard; it goes away with the file handle.
        std::mem::forget(guard);

        Ok(Self { lock, path })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
