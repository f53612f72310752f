//! Integration tests for logging and tracing

use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::EnvFilter;

/// Log sink shared between the subscriber and the test
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_structured_fields_and_spans() {
    let captured = Captured::default();
    let sink = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("catalog_sync=trace"))
        .with_ansi(false)
        .with_writer(move || sink.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let span = info_span!(target: "catalog_sync::sync", "unit", job = "teams", index = 3);
        let _entered = span.enter();
        info!(target: "catalog_sync::sync", league_id = 39, found = 20, "League processed");
    });

    let text = captured.text();
    assert!(text.contains("League processed"), "{text}");
    assert!(text.contains("league_id=39"), "{text}");
    assert!(text.contains("found=20"), "{text}");
    assert!(text.contains("unit{"), "{text}");
    assert!(text.contains("index=3"), "{text}");
}

#[test]
fn test_filter_drops_lower_levels_and_other_crates() {
    let captured = Captured::default();
    let sink = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("catalog_sync=info"))
        .with_ansi(false)
        .with_writer(move || sink.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        debug!(target: "catalog_sync::source", "Request sent");
        info!(target: "sqlx::query", "statement executed");
        warn!(target: "catalog_sync::watchdog", "Worker stalled, killing it");
    });

    let text = captured.text();
    assert!(text.contains("Worker stalled"), "{text}");
    assert!(!text.contains("Request sent"), "{text}");
    assert!(!text.contains("statement executed"), "{text}");
}

#[test]
fn test_json_format_emits_one_object_per_event() {
    let captured = Captured::default();
    let sink = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("catalog_sync=info"))
        .with_writer(move || sink.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        warn!(target: "catalog_sync::sync", team_id = 33, "No squad returned");
        info!(target: "catalog_sync::sync", units = 40, "Work list ready");
    });

    let lines: Vec<serde_json::Value> = captured
        .text()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["level"], "WARN");
    assert_eq!(lines[0]["fields"]["message"], "No squad returned");
    assert_eq!(lines[0]["fields"]["team_id"], 33);
    assert_eq!(lines[1]["fields"]["units"], 40);
}

#[test]
fn test_default_filter_directive_parses() {
    assert!(EnvFilter::try_new("catalog_sync=info").is_ok());
    assert!(EnvFilter::try_new("catalog_sync::watchdog=debug,catalog_sync=info").is_ok());
    assert!(EnvFilter::try_new("catalog_sync=loud").is_err());
}
