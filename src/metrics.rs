//! Observability metrics for catalog sync
//!
//! Counters for API calls, throttling, unit outcomes, store writes and
//! watchdog interventions.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Prometheus exporter for scraping endpoint (`--metrics-addr`)
//! - Recording is a no-op until [`init_metrics`] installs a recorder

use crate::sync::JobKind;
use crate::EntityKind;
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "catalog_api_requests_total",
        Unit::Count,
        "HTTP attempts made to the catalog API, throttled ones included"
    );
    describe_counter!(
        "catalog_api_throttled_total",
        Unit::Count,
        "Throttling signals received (HTTP 429 or rateLimit envelope)"
    );
    describe_counter!(
        "catalog_units_total",
        Unit::Count,
        "Work units finished, by job and outcome"
    );
    describe_counter!(
        "catalog_store_writes_total",
        Unit::Count,
        "Store upserts, by entity kind and outcome"
    );
    describe_gauge!(
        "catalog_checkpoint_index",
        Unit::Count,
        "Last processed unit index, by job"
    );
    describe_counter!(
        "watchdog_restarts_total",
        Unit::Count,
        "Worker restarts issued by the watchdog, by reason"
    );
    describe_counter!(
        "watchdog_budget_pauses_total",
        Unit::Count,
        "Runs paused because the call budget was reached"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// One HTTP attempt against the catalog API
pub fn record_api_request() {
    counter!("catalog_api_requests_total").increment(1);
}

/// One throttling signal
pub fn record_throttle() {
    counter!("catalog_api_throttled_total").increment(1);
}

/// One unit finished with `outcome` ("persisted", "deferred", "given_up", "quota")
pub fn record_unit(job: JobKind, outcome: &'static str, index: usize) {
    counter!(
        "catalog_units_total",
        "job" => job.as_str(),
        "outcome" => outcome,
    )
    .increment(1);
    gauge!("catalog_checkpoint_index", "job" => job.as_str()).set(index as f64);
}

/// One store upsert
pub fn record_store_write(kind: EntityKind, ok: bool) {
    counter!(
        "catalog_store_writes_total",
        "entity" => kind.as_str(),
        "outcome" => if ok { "ok" } else { "failed" },
    )
    .increment(1);
}

/// One watchdog restart
pub fn record_restart(reason: &'static str) {
    counter!("watchdog_restarts_total", "reason" => reason).increment(1);
}

/// One budget pause
pub fn record_budget_pause() {
    counter!("watchdog_budget_pauses_total").increment(1);
}
