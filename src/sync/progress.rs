//! Periodic progress reporting for sync runs.
//!
//! The engine emits a summary every N processed units. Rate and ETA are based
//! on units processed by this worker only, so a resumed run does not report an
//! inflated rate for units done before the restart.

use super::stats::Stats;
use std::time::{Duration, Instant};

/// Progress state of one engine pass
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    /// Units in the work list
    pub total_units: usize,
    /// Units processed, including those done before a resume
    pub units_done: usize,
    /// Units processed by this worker
    pub units_this_session: usize,
    /// Emit every this many units (0 disables)
    pub every: usize,
    /// Worker start
    pub start_time: Instant,
}

impl ProgressTracker {
    /// Tracker resuming with `units_done` already processed
    pub fn new(total_units: usize, units_done: usize, every: usize) -> Self {
        Self {
            total_units,
            units_done,
            units_this_session: 0,
            every,
            start_time: Instant::now(),
        }
    }

    /// Count one processed unit
    pub fn unit_done(&mut self) {
        self.units_done = self.units_done.saturating_add(1);
        self.units_this_session = self.units_this_session.saturating_add(1);
    }

    /// Whether the latest unit crossed a reporting boundary
    pub fn should_emit(&self) -> bool {
        self.every > 0 && self.units_this_session > 0 && self.units_this_session % self.every == 0
    }

    /// Completion percentage (0-100)
    pub fn percentage(&self) -> f64 {
        if self.total_units == 0 {
            return 100.0;
        }
        (self.units_done.min(self.total_units) as f64 / self.total_units as f64) * 100.0
    }

    /// Units per minute for this worker
    pub fn rate_per_minute(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.units_this_session as f64 / elapsed * 60.0
    }

    /// Remaining time at the current rate
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let rate = self.rate_per_minute();
        let remaining = self.total_units.saturating_sub(self.units_done);
        if rate <= 0.0 || remaining == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate * 60.0))
    }

    /// Human-readable progress line
    pub fn format_progress(&self, stats: &Stats) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} units - {:.1}% complete",
            self.units_done,
            self.total_units,
            self.percentage()
        )];
        parts.push(format!(
            "elapsed {}",
            format_duration(self.start_time.elapsed())
        ));
        let rate = self.rate_per_minute();
        if rate > 0.0 {
            parts.push(format!("at {rate:.1} units/min"));
        }
        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("~{} remaining", format_duration(remaining)));
        }
        parts.push(format!("| {}", stats.summary_line()));
        parts.join(" ")
    }
}

/// Compact duration label ("45s", "12m", "1.5h")
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
