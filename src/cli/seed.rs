//! Seed command: bulk upsert of the league catalog

use super::{print_json, Cli, CliError, OutputFormat};
use crate::store::StoreWriter;
use crate::sync::config::BATCH_CHUNK_SIZE;
use crate::CatalogRecord;
use clap::Args;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// `seed` arguments
#[derive(Args, Debug, Clone)]
pub struct SeedArgs {
    /// Records per batch
    #[arg(long, default_value_t = BATCH_CHUNK_SIZE)]
    pub chunk_size: usize,
}

impl SeedArgs {
    /// Execute the seed command
    pub async fn execute(&self, cli: &Cli) -> Result<i32, CliError> {
        if self.chunk_size == 0 {
            return Err(CliError::InvalidArgument(
                "chunk size must be at least 1".to_string(),
            ));
        }

        let season = cli.season();
        let records: Vec<CatalogRecord> = cli
            .selected_leagues()?
            .iter()
            .map(|league| CatalogRecord::League(league.to_league(season)))
            .collect();

        let store = Arc::new(cli.open_store().await?);
        let writer = StoreWriter::new(store.clone());
        let report = writer.upsert_batch(&records, self.chunk_size).await;
        store.close().await;

        for chunk in report.failed_chunks() {
            warn!(
                chunk = chunk.index,
                records = chunk.records,
                error = chunk.error.as_deref().unwrap_or_default(),
                "League chunk failed"
            );
        }
        info!(
            season,
            written = report.written(),
            failed = report.failed(),
            "League catalog seeded"
        );

        match cli.output_format {
            OutputFormat::Json => {
                let chunks: Vec<_> = report
                    .chunks
                    .iter()
                    .map(|c| json!({ "index": c.index, "records": c.records, "error": c.error }))
                    .collect();
                print_json(&json!({
                    "season": season,
                    "written": report.written(),
                    "failed": report.failed(),
                    "chunks": chunks,
                }))?;
            }
            OutputFormat::Human => {
                println!(
                    "Seeded {} leagues for season {season} ({} failed, {} chunks)",
                    report.written(),
                    report.failed(),
                    report.chunks.len()
                );
                for chunk in report.failed_chunks() {
                    println!(
                        "  ✗ chunk {} ({} records): {}",
                        chunk.index,
                        chunk.records,
                        chunk.error.as_deref().unwrap_or_default()
                    );
                }
            }
        }

        Ok(if report.is_complete() { 0 } else { 1 })
    }
}
