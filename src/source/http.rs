//! HTTP client for the football catalog API
//!
//! Every attempt, throttled or not, counts as one request. Throttling is
//! signalled either by HTTP 429 or by `errors.rateLimit` in a 200 envelope;
//! both trigger the same bounded cooldown loop.

use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::parser::{self, Envelope};
use super::{CatalogSource, Fetched, SourceError, SourceResult};
use crate::sync::config::{throttle_cooldown, MAX_THROTTLE_RETRIES};
use crate::{Coach, Player, Team};
use async_trait::async_trait;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-apisports-key";

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds)
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Longest error body kept in [`SourceError::HttpError`]
const MAX_ERROR_BODY: usize = 512;

/// Process-wide HTTP client, shared for connection pooling
static GLOBAL_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(
        Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                panic!("FATAL: Failed to build HTTP client: {e}. Check system TLS configuration.");
            }),
    )
});

/// Get the global HTTP client
pub fn global_http_client() -> Arc<Client> {
    GLOBAL_HTTP_CLIENT.clone()
}

/// Catalog API client
#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Arc<Client>,
    base_url: String,
    api_key: Option<String>,
    requests: Arc<AtomicU64>,
    cooldown: Duration,
    max_throttle_retries: u32,
}

impl CatalogHttpClient {
    /// Client against `base_url` using the shared HTTP client
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(global_http_client(), base_url, api_key)
    }

    /// Client with an explicit reqwest client
    pub fn with_client(
        client: Arc<Client>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            requests: Arc::new(AtomicU64::new(0)),
            cooldown: throttle_cooldown(),
            max_throttle_retries: MAX_THROTTLE_RETRIES,
        }
    }

    /// Override the throttle cooldown
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Override the throttled retry bound
    pub fn with_max_throttle_retries(mut self, retries: u32) -> Self {
        self.max_throttle_retries = retries;
        self
    }

    /// Base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `endpoint` and return the envelope's `response` records
    ///
    /// Retries only on throttling, at most `max_throttle_retries` times.
    pub async fn request(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> SourceResult<Vec<Value>> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut throttled = 0u32;

        loop {
            let body = match self.send_once(&url, params).await? {
                Some(body) => body,
                None => {
                    throttled += 1;
                    self.cool_down(endpoint, throttled, "HTTP 429").await?;
                    continue;
                }
            };

            match parser::classify_envelope(body)? {
                Envelope::Records(records) => {
                    debug!(endpoint, records = records.len(), "Request succeeded");
                    return Ok(records);
                }
                Envelope::Throttled(message) => {
                    throttled += 1;
                    self.cool_down(endpoint, throttled, &message).await?;
                }
                Envelope::QuotaExhausted(message) => {
                    warn!(endpoint, %message, "Provider quota exhausted");
                    return Err(SourceError::QuotaExhausted(message));
                }
                Envelope::Error(message) => return Err(SourceError::ApiError(message)),
            }
        }
    }

    /// One HTTP attempt; `Ok(None)` means HTTP 429
    async fn send_once(&self, url: &str, params: &[(&str, String)]) -> SourceResult<Option<Value>> {
        let mut request = self.client.get(url).query(params);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let total = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        crate::metrics::record_api_request();
        debug!(url, params = params.len(), total_requests = total, "GET");

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(None);
        }
        if !status.is_success() {
            let mut body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(SourceError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map(Some)
            .map_err(|e| SourceError::ParseError(format!("Failed to decode response: {e}")))
    }

    async fn cool_down(&self, endpoint: &str, throttled: u32, reason: &str) -> SourceResult<()> {
        crate::metrics::record_throttle();
        if throttled > self.max_throttle_retries {
            warn!(endpoint, attempts = throttled, "Giving up after repeated throttling");
            return Err(SourceError::RateLimitExceeded {
                attempts: throttled,
            });
        }
        warn!(
            endpoint,
            attempt = throttled,
            max_retries = self.max_throttle_retries,
            cooldown_secs = self.cooldown.as_secs_f64(),
            reason,
            "Throttled, cooling down"
        );
        tokio::time::sleep(self.cooldown).await;
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for CatalogHttpClient {
    async fn fetch_teams(&self, league_id: i64, season: i32) -> SourceResult<Fetched<Team>> {
        let records = self
            .request(
                "/teams",
                &[("league", league_id.to_string()), ("season", season.to_string())],
            )
            .await?;
        Ok(parser::parse_teams(records))
    }

    async fn fetch_squad(&self, team_id: i64) -> SourceResult<Fetched<Player>> {
        let records = self
            .request("/players/squads", &[("team", team_id.to_string())])
            .await?;
        Ok(parser::parse_squad(records))
    }

    async fn fetch_coaches(&self, team_id: i64) -> SourceResult<Fetched<Coach>> {
        let records = self
            .request("/coachs", &[("team", team_id.to_string())])
            .await?;
        Ok(parser::parse_coaches(records))
    }

    fn requests_made(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}
