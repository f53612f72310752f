//! CLI error types and conversions

use crate::catalog::CatalogError;
use crate::resume::ResumeError;
use crate::store::StoreError;
use crate::sync::SyncError;
use crate::watchdog::WatchdogError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// League catalog error
    #[error("catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    /// Store error
    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    /// Sync engine error
    #[error("sync error: {0}")]
    SyncError(#[from] SyncError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Watchdog error
    #[error("watchdog error: {0}")]
    WatchdogError(#[from] WatchdogError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SyncError(e) => e.exit_code(),
            _ => 1,
        }
    }
}
