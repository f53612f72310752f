//! Idempotent catalog store
//!
//! Every entity has a natural key (external id, or team + season for
//! season-scoped records) and every write is an upsert on it, so a unit that
//! is reprocessed after a restart never duplicates rows.
//!
//! [`CatalogStore`] is the backend seam. [`StoreWriter`] sits in front of it
//! and turns failures into non-fatal outcomes recorded against the unit.

use crate::sync::UnitDelta;
use crate::{CatalogRecord, EntityKind};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod sqlite;

pub use sqlite::SqliteCatalogStore;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Value could not be encoded for storage
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem error while opening the store
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    /// League rows
    pub leagues: u64,
    /// Team rows
    pub teams: u64,
    /// League membership rows
    pub league_teams: u64,
    /// Squad rows
    pub squads: u64,
    /// Coach assignment rows
    pub coaches: u64,
}

/// Relational store backend
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or update one record by its natural key
    async fn upsert(&self, record: &CatalogRecord) -> StoreResult<()>;

    /// Upsert a group of records atomically (all or none)
    async fn upsert_chunk(&self, records: &[CatalogRecord]) -> StoreResult<()>;

    /// Team ids and names of a league season, in recorded position order
    async fn league_teams(&self, league_id: i64, season: i32) -> StoreResult<Vec<(i64, String)>>;

    /// Row counts for status reporting
    async fn counts(&self) -> StoreResult<StoreCounts>;
}

/// Outcome of one chunk of a batch write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Zero-based chunk index
    pub index: usize,
    /// Records in the chunk
    pub records: usize,
    /// Failure message, `None` when the chunk was written
    pub error: Option<String>,
}

/// Per-chunk report of a batch write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Chunk outcomes in write order
    pub chunks: Vec<ChunkOutcome>,
}

impl BatchReport {
    /// Records in chunks that were written
    pub fn written(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.error.is_none())
            .map(|c| c.records)
            .sum()
    }

    /// Records in chunks that failed
    pub fn failed(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.error.is_some())
            .map(|c| c.records)
            .sum()
    }

    /// Failed chunks only
    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.chunks.iter().filter(|c| c.error.is_some())
    }

    /// Whether every chunk was written
    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(|c| c.error.is_none())
    }
}

/// Non-fatal writer in front of a [`CatalogStore`]
#[derive(Clone)]
pub struct StoreWriter {
    store: Arc<dyn CatalogStore>,
}

impl StoreWriter {
    /// Writer over `store`
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Upsert `record`; a failure is recorded in `delta` and reported as `false`
    pub async fn upsert(&self, record: &CatalogRecord, delta: &mut UnitDelta) -> bool {
        let kind = record.kind();
        match self.store.upsert(record).await {
            Ok(()) => {
                crate::metrics::record_store_write(kind, true);
                debug!(entity = %kind, key = %record.describe(), "Upserted");
                true
            }
            Err(e) => {
                crate::metrics::record_store_write(kind, false);
                let message = format!("store write failed for {kind} {}: {e}", record.describe());
                warn!(entity = %kind, error = %e, "{message}");
                delta.error(message);
                false
            }
        }
    }

    /// Upsert `records` in chunks of `chunk_size`
    ///
    /// A failing chunk does not stop the chunks after it.
    pub async fn upsert_batch(&self, records: &[CatalogRecord], chunk_size: usize) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, chunk) in records.chunks(chunk_size.max(1)).enumerate() {
            let error = match self.store.upsert_chunk(chunk).await {
                Ok(()) => {
                    debug!(chunk = index, records = chunk.len(), "Chunk written");
                    None
                }
                Err(e) => {
                    warn!(chunk = index, records = chunk.len(), error = %e, "Chunk failed");
                    Some(e.to_string())
                }
            };
            let kind = chunk.first().map(CatalogRecord::kind).unwrap_or(EntityKind::League);
            for _ in chunk {
                crate::metrics::record_store_write(kind, error.is_none());
            }
            report.chunks.push(ChunkOutcome {
                index,
                records: chunk.len(),
                error,
            });
        }
        report
    }
}
