//! Checkpoint persistence
//!
//! The engine and the watchdog only see artifacts through [`CheckpointStore`],
//! so the storage medium can change without touching either of them. The file
//! implementation writes with write-new-then-rename: a reader never observes a
//! partially written checkpoint, even if the writer crashes mid-write.

use super::checkpoint::{CheckpointState, ResultRecord, SCHEMA_VERSION};
use crate::sync::JobKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Maximum allowed artifact size (10 MB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Storage for the checkpoint and result artifacts of one job
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint, `None` when absent
    fn load(&self) -> Result<Option<CheckpointState>, ResumeError>;

    /// Atomically replace the checkpoint
    fn save(&self, state: &CheckpointState) -> Result<(), ResumeError>;

    /// Remove the checkpoint (no-op when absent)
    fn clear(&self) -> Result<(), ResumeError>;

    /// Load the result record, `None` when absent
    fn load_result(&self) -> Result<Option<ResultRecord>, ResumeError>;

    /// Write the result record
    fn save_result(&self, result: &ResultRecord) -> Result<(), ResumeError>;

    /// Remove the result record (no-op when absent)
    fn clear_result(&self) -> Result<(), ResumeError>;
}

/// File-backed artifacts under a run directory
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    checkpoint_path: PathBuf,
    result_path: PathBuf,
}

impl FileCheckpointStore {
    /// Store with explicit paths
    pub fn new(checkpoint_path: impl Into<PathBuf>, result_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            result_path: result_path.into(),
        }
    }

    /// Well-known artifact locations for `job` under `run_dir`
    pub fn for_job(run_dir: impl AsRef<Path>, job: JobKind) -> Self {
        let run_dir = run_dir.as_ref();
        Self::new(
            run_dir.join(format!("{job}.checkpoint.json")),
            run_dir.join(format!("{job}.result.json")),
        )
    }

    /// Checkpoint file path
    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Result file path
    pub fn result_path(&self) -> &Path {
        &self.result_path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<CheckpointState>, ResumeError> {
        let state: Option<CheckpointState> = read_json(&self.checkpoint_path)?;
        if let Some(state) = &state {
            check_schema(state.schema_version())?;
            debug!(
                last_processed_index = state.last_processed_index,
                api_requests = state.stats.api_requests,
                "Checkpoint loaded"
            );
        }
        Ok(state)
    }

    fn save(&self, state: &CheckpointState) -> Result<(), ResumeError> {
        write_json_atomic(&self.checkpoint_path, state)?;
        debug!(
            path = %self.checkpoint_path.display(),
            last_processed_index = state.last_processed_index,
            "Checkpoint saved"
        );
        Ok(())
    }

    fn clear(&self) -> Result<(), ResumeError> {
        remove_if_exists(&self.checkpoint_path)
    }

    fn load_result(&self) -> Result<Option<ResultRecord>, ResumeError> {
        let result: Option<ResultRecord> = read_json(&self.result_path)?;
        if let Some(result) = &result {
            check_schema(result.schema_version())?;
        }
        Ok(result)
    }

    fn save_result(&self, result: &ResultRecord) -> Result<(), ResumeError> {
        write_json_atomic(&self.result_path, result)?;
        info!(path = %self.result_path.display(), "Result record written");
        Ok(())
    }

    fn clear_result(&self) -> Result<(), ResumeError> {
        remove_if_exists(&self.result_path)
    }
}

fn check_schema(found: &str) -> Result<(), ResumeError> {
    if found != SCHEMA_VERSION {
        warn!(
            found_version = %found,
            expected_version = SCHEMA_VERSION,
            "Artifact schema version mismatch"
        );
        return Err(ResumeError::SchemaVersionMismatch {
            expected: SCHEMA_VERSION.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ResumeError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ResumeError::IoError(e.to_string())),
    };
    if metadata.len() > MAX_STATE_FILE_SIZE {
        return Err(ResumeError::StateTooLarge {
            size: metadata.len(),
            max: MAX_STATE_FILE_SIZE,
        });
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        // removed between the metadata call and the read
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ResumeError::IoError(e.to_string())),
    };

    serde_json::from_str(&contents).map(Some).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to deserialize artifact");
        ResumeError::DeserializationError(e.to_string())
    })
}

/// Write `value` as pretty JSON to `path` via a synced temp file and rename
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ResumeError> {
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(json.as_bytes())
        .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

    // Fsync parent directory so the rename itself is durable
    if let Ok(dir) = std::fs::File::open(parent_dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), ResumeError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Artifact removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ResumeError::IoError(e.to_string())),
    }
}

/// Errors related to run artifacts
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Checkpoint belongs to another job
    #[error("checkpoint belongs to job {found}, expected {expected}")]
    JobMismatch {
        /// Job being run
        expected: JobKind,
        /// Job recorded in the checkpoint
        found: JobKind,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
