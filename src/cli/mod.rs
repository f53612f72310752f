//! CLI command implementations

pub mod error;
pub mod seed;
pub mod status;
pub mod sync;
pub mod watchdog;

pub use error::CliError;
pub use seed::SeedArgs;
pub use status::{ResetArgs, StatusArgs};
pub use sync::{SyncArgs, SyncOptions};
pub use watchdog::WatchdogArgs;

use crate::catalog::{CatalogLeague, LeagueCatalog};
use crate::shutdown::SharedShutdown;
use crate::source::http::{CatalogHttpClient, DEFAULT_BASE_URL};
use crate::store::SqliteCatalogStore;
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Environment variable carrying the API key
pub const API_KEY_ENV: &str = "CATALOG_API_KEY";

/// Football catalog sync
#[derive(Parser, Debug)]
#[command(name = "catalog-sync", version, about = "Football catalog sync worker and watchdog")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// SQLite database file
    #[arg(long, global = true, env = "CATALOG_DB", default_value = "catalog.db")]
    pub db: PathBuf,

    /// Directory holding checkpoint, result and lock files
    #[arg(long, global = true, env = "CATALOG_RUN_DIR", default_value = ".catalog-sync")]
    pub run_dir: PathBuf,

    /// Season year (default: current year)
    #[arg(long, global = true, env = "CATALOG_SEASON")]
    pub season: Option<i32>,

    /// Catalog API base URL
    #[arg(long, global = true, env = "CATALOG_API_URL", default_value = DEFAULT_BASE_URL)]
    pub api_url: String,

    /// Catalog API key
    #[arg(long, global = true, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Restrict the run to these league ids (comma separated or repeated)
    #[arg(long = "league", global = true, value_delimiter = ',')]
    pub leagues: Vec<i64>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upsert the embedded league catalog into the store
    Seed(SeedArgs),

    /// Run a sync job in this process
    Sync(SyncArgs),

    /// Supervise a sync job running as a child process
    Watchdog(WatchdogArgs),

    /// Show the progress of a sync job
    Status(StatusArgs),

    /// Remove a sync job's checkpoint and result
    Reset(ResetArgs),
}

impl Cli {
    /// Run the selected command; returns the process exit code
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<i32, CliError> {
        match &self.command {
            Commands::Seed(args) => args.execute(self).await,
            Commands::Sync(args) => args.execute(self).await,
            Commands::Watchdog(args) => args.execute(self, shutdown).await,
            Commands::Status(args) => args.execute(self).await,
            Commands::Reset(args) => args.execute(self),
        }
    }

    /// Season to sync
    pub fn season(&self) -> i32 {
        self.season.unwrap_or_else(|| Utc::now().year())
    }

    /// Leagues in processing order, honouring `--league`
    pub fn selected_leagues(&self) -> Result<Vec<CatalogLeague>, CliError> {
        let catalog = LeagueCatalog::load_embedded()?;
        if self.leagues.is_empty() {
            Ok(catalog.ordered())
        } else {
            Ok(catalog.select(&self.leagues)?)
        }
    }

    /// Open the store
    pub async fn open_store(&self) -> Result<SqliteCatalogStore, CliError> {
        Ok(SqliteCatalogStore::open(&self.db).await?)
    }

    /// API client configured from the global flags and `options`
    pub fn source(&self, options: &SyncOptions) -> CatalogHttpClient {
        if self.api_key.is_none() {
            warn!("No API key configured (--api-key or {API_KEY_ENV}); requests will likely be rejected");
        }
        CatalogHttpClient::new(self.api_url.clone(), self.api_key.clone())
            .with_cooldown(Duration::from_secs(options.cooldown_secs))
            .with_max_throttle_retries(options.max_throttle_retries)
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Print `value` as pretty JSON
pub(crate) fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::InvalidArgument(format!("Failed to render JSON: {e}")))?;
    println!("{text}");
    Ok(())
}
