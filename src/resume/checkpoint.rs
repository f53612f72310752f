//! Checkpoint and result artifacts
//!
//! Both records are serialized as camelCase JSON. The watchdog reads them from
//! another process, so field names are part of the external contract.

use crate::sync::{JobKind, Stats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current artifact schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Durable cursor of an in-progress run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointState {
    #[serde(default = "default_schema_version")]
    schema_version: String,
    /// Job the checkpoint belongs to
    pub job: JobKind,
    /// Index of the last fully processed unit, -1 before any work
    pub last_processed_index: i64,
    /// Deferred attempts of the unit at `last_processed_index + 1`
    #[serde(default)]
    pub pending_attempts: u32,
    /// Length of the work list when the checkpoint was written
    #[serde(default)]
    pub total_units: usize,
    /// Accumulated statistics
    pub stats: Stats,
    /// When the run first started (survives restarts)
    pub started_at: DateTime<Utc>,
    /// Last write time; the watchdog's liveness signal
    pub updated_at: DateTime<Utc>,
}

impl CheckpointState {
    /// Fresh state before any unit has been processed
    pub fn new(job: JobKind, total_units: usize) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            job,
            last_processed_index: -1,
            pending_attempts: 0,
            total_units,
            stats: Stats::default(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Schema version the record was written with
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Index of the first unit still to process
    pub fn next_index(&self) -> usize {
        (self.last_processed_index + 1).max(0) as usize
    }

    /// Mark unit `index` as processed
    ///
    /// The cursor never moves backwards; a stale index is ignored.
    pub fn mark_processed(&mut self, index: usize) {
        let index = index as i64;
        if index > self.last_processed_index {
            self.last_processed_index = index;
            self.pending_attempts = 0;
        }
        self.touch();
    }

    /// Record a deferred attempt at the next unit without advancing
    pub fn defer(&mut self) -> u32 {
        self.pending_attempts += 1;
        self.touch();
        self.pending_attempts
    }

    /// Refresh `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Age of the last update relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.updated_at)
    }

    /// Number of processed units
    pub fn processed_units(&self) -> usize {
        self.next_index()
    }
}

/// Terminal summary written once on clean completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    #[serde(default = "default_schema_version")]
    schema_version: String,
    /// Job that completed
    pub job: JobKind,
    /// Completion time
    pub completed_at: DateTime<Utc>,
    /// Wall time from the first start of the run to completion
    pub duration_seconds: i64,
    /// Number of units in the work list
    #[serde(default)]
    pub total_units: usize,
    /// Final statistics
    pub stats: Stats,
}

impl ResultRecord {
    /// Build the result for a checkpoint that has processed every unit
    pub fn from_checkpoint(state: &CheckpointState, completed_at: DateTime<Utc>) -> Self {
        let duration_seconds = completed_at
            .signed_duration_since(state.started_at)
            .num_seconds()
            .max(0);
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            job: state.job,
            completed_at,
            duration_seconds,
            total_units: state.total_units,
            stats: state.stats.clone(),
        }
    }

    /// Schema version the record was written with
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }
}
