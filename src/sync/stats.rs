//! Run statistics
//!
//! [`Stats`] is the run-wide accumulator embedded in every checkpoint. Units of
//! work never mutate it directly: each unit produces a [`UnitDelta`] which the
//! engine merges at the unit boundary, so counters only ever grow.

use serde::{Deserialize, Serialize};

/// Maximum number of error messages kept in the checkpoint.
/// The count in [`Stats::error_count`] keeps growing past this cap.
pub const MAX_STORED_ERRORS: usize = 1_000;

/// Number of error messages shown in progress reports and summaries
pub const DISPLAYED_ERRORS: usize = 10;

/// Accumulated run statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Remote calls issued over the lifetime of the run (including throttled attempts)
    pub api_requests: u64,
    /// Leagues whose team listing was processed
    pub leagues_processed: u64,
    /// Teams returned by the source
    pub teams_found: u64,
    /// Teams written to the store
    pub teams_inserted: u64,
    /// Squads returned by the source
    pub squads_found: u64,
    /// Squads written to the store
    pub squads_inserted: u64,
    /// Coach assignments resolved from the source
    #[serde(default)]
    pub coaches_found: u64,
    /// Coach assignments written to the store
    #[serde(default)]
    pub coaches_inserted: u64,
    /// Total errors recorded, including those past the storage cap
    #[serde(default)]
    pub error_count: u64,
    /// Error messages in the order they occurred (capped)
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Stats {
    /// Record an error message
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_count = self.total_errors() + 1;
        if self.errors.len() < MAX_STORED_ERRORS {
            self.errors.push(message.into());
        }
    }

    /// Total number of errors, tolerant of checkpoints written without `errorCount`
    pub fn total_errors(&self) -> u64 {
        self.error_count.max(self.errors.len() as u64)
    }

    /// Merge the outcome of one unit of work
    pub fn merge(&mut self, delta: UnitDelta) {
        self.leagues_processed += delta.leagues_processed;
        self.teams_found += delta.teams_found;
        self.teams_inserted += delta.teams_inserted;
        self.squads_found += delta.squads_found;
        self.squads_inserted += delta.squads_inserted;
        self.coaches_found += delta.coaches_found;
        self.coaches_inserted += delta.coaches_inserted;
        for error in delta.errors {
            self.record_error(error);
        }
    }

    /// Raise the request counter to `total`; never lowers it
    pub fn observe_requests(&mut self, total: u64) {
        self.api_requests = self.api_requests.max(total);
    }

    /// First errors, for capped display
    pub fn displayed_errors(&self) -> &[String] {
        let end = self.errors.len().min(DISPLAYED_ERRORS);
        &self.errors[..end]
    }

    /// One-line summary of the headline counters
    pub fn summary_line(&self) -> String {
        format!(
            "api_requests={} leagues={} teams={}/{} squads={}/{} coaches={}/{} errors={}",
            self.api_requests,
            self.leagues_processed,
            self.teams_inserted,
            self.teams_found,
            self.squads_inserted,
            self.squads_found,
            self.coaches_inserted,
            self.coaches_found,
            self.total_errors()
        )
    }
}

/// Counter increments produced by a single unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitDelta {
    /// Leagues processed
    pub leagues_processed: u64,
    /// Teams found
    pub teams_found: u64,
    /// Teams written
    pub teams_inserted: u64,
    /// Squads found
    pub squads_found: u64,
    /// Squads written
    pub squads_inserted: u64,
    /// Coach assignments found
    pub coaches_found: u64,
    /// Coach assignments written
    pub coaches_inserted: u64,
    /// Errors raised while processing the unit
    pub errors: Vec<String>,
}

impl UnitDelta {
    /// Record an error for this unit
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}
