//! Sync configuration constants

use std::time::Duration;

/// Pause between units, applied before each checkpoint save.
/// Keeps a single worker under the provider's per-minute allowance.
pub const INTER_CALL_DELAY_MS: u64 = 300;

/// Emit a progress summary every N processed units
pub const PROGRESS_EVERY: usize = 10;

/// Wait after a throttling signal before retrying the same request
pub const THROTTLE_COOLDOWN_SECS: u64 = 60;

/// Throttled retries allowed per request before giving up
pub const MAX_THROTTLE_RETRIES: u32 = 5;

/// Records per store batch when seeding the league catalog
pub const BATCH_CHUNK_SIZE: usize = 50;

/// Worker starts a unit may fail transiently before it is skipped
pub const MAX_UNIT_ATTEMPTS: u32 = 3;

/// Exit code of a worker that stopped because the provider quota is spent
pub const QUOTA_EXIT_CODE: i32 = 75;

/// Default inter-call delay
pub fn inter_call_delay() -> Duration {
    Duration::from_millis(INTER_CALL_DELAY_MS)
}

/// Default throttle cooldown
pub fn throttle_cooldown() -> Duration {
    Duration::from_secs(THROTTLE_COOLDOWN_SECS)
}
