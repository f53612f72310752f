//! Remote catalog source
//!
//! The engine talks to the external catalog API only through
//! [`CatalogSource`]. Implementations issue one live request per call (no
//! caching) and expose a monotonic request counter used for reporting and for
//! the watchdog's budget checks.

use crate::{Coach, Player, Team};
use async_trait::async_trait;

pub mod http;
pub mod parser;

pub use http::CatalogHttpClient;

/// Source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Non-throttle HTTP error status
    #[error("HTTP error {status}: {body}")]
    HttpError {
        /// Status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Transport failure (connect, timeout, TLS)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Error reported in the provider envelope
    #[error("API error: {0}")]
    ApiError(String),

    /// Provider daily quota is exhausted
    #[error("daily request quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Still throttled after the bounded number of cooldowns
    #[error("rate limit exceeded after {attempts} throttled attempts")]
    RateLimitExceeded {
        /// Throttled attempts made
        attempts: u32,
    },
}

impl SourceError {
    /// Whether a later retry of the same unit may succeed
    ///
    /// Transient failures defer the unit to the next worker start; everything
    /// else is a data problem recorded against the unit.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::RateLimitExceeded { .. } => true,
            Self::HttpError { status, .. } => *status >= 500,
            Self::ParseError(_) | Self::ApiError(_) | Self::QuotaExhausted(_) => false,
        }
    }

    /// Whether the provider refuses all further calls until its quota resets
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_))
    }
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Records parsed from one response
///
/// Records that fail to parse do not sink the response: each one is reported
/// in `rejected` and the rest are returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    /// Records that parsed
    pub records: Vec<T>,
    /// One message per record that did not
    pub rejected: Vec<String>,
}

impl<T> Fetched<T> {
    /// Whether the response carried nothing at all
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.rejected.is_empty()
    }
}

impl<T> Default for Fetched<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> From<Vec<T>> for Fetched<T> {
    fn from(records: Vec<T>) -> Self {
        Self {
            records,
            rejected: Vec::new(),
        }
    }
}

/// Read access to the external catalog
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Teams of a league season, in source order
    async fn fetch_teams(&self, league_id: i64, season: i32) -> SourceResult<Fetched<Team>>;

    /// Current squad roster of a team
    async fn fetch_squad(&self, team_id: i64) -> SourceResult<Fetched<Player>>;

    /// Coaches with career history for a team
    async fn fetch_coaches(&self, team_id: i64) -> SourceResult<Fetched<Coach>>;

    /// Requests issued by this instance so far
    fn requests_made(&self) -> u64;
}
