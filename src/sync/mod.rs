//! Checkpointed sync engine
//!
//! - [`job`] - Job kinds, work units and work lists
//! - [`stats`] - Run statistics and per-unit deltas
//! - [`engine`] - The sequential engine driving source and store
//! - [`progress`] - Periodic progress summaries
//! - [`config`] - Tunable defaults

pub mod config;
pub mod engine;
pub mod job;
pub mod progress;
pub mod stats;

pub use engine::{EngineSettings, RunOutcome, SyncEngine, SyncError};
pub use job::{JobKind, LeagueRef, TeamRef, UnitStatus, WorkList, WorkUnit};
pub use stats::{Stats, UnitDelta};
