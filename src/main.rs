//! Main entry point for the catalog-sync CLI

use catalog_sync::cli::{Cli, Commands};
use catalog_sync::metrics::init_metrics;
use catalog_sync::shutdown::{ShutdownCoordinator, SharedShutdown};
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("catalog_sync=info"));

    // stdout carries command output only
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Request shutdown on Ctrl+C or SIGTERM
fn install_signal_handlers(shutdown: SharedShutdown) {
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - stopping worker...");
                shutdown.request_shutdown();
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                if term.recv().await.is_some() {
                    warn!("SIGTERM received - stopping worker...");
                    shutdown.request_shutdown();
                }
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    });
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = init_metrics(addr).await {
            warn!("Failed to start metrics exporter on {}: {}", addr, e);
        }
    }

    // Only the supervisor handles signals; a worker is stopped by termination
    // and resumes from its checkpoint.
    let shutdown = ShutdownCoordinator::shared();
    if matches!(cli.command, Commands::Watchdog(_)) {
        install_signal_handlers(shutdown.clone());
    }

    match cli.execute(shutdown).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
