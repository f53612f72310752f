//! Checkpoint and result artifacts shared by the engine and the watchdog
//!
//! Provides atomic artifact persistence and the single-worker file lock.

pub mod checkpoint;
pub mod lock;
pub mod state;

pub use checkpoint::{CheckpointState, ResultRecord, SCHEMA_VERSION};
pub use lock::RunLock;
pub use state::{CheckpointStore, FileCheckpointStore, ResumeError};
