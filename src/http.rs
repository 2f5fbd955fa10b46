//! HTTP remote source for the paginated workout API.
//!
//! This module provides:
//! - Connection pooling with keep-alive
//! - Cursor query parameters (`before` for newer, `after` for older)
//! - Automatic retry with exponential backoff on 429 and connection errors
//! - Mapping of transport failures into [`SyncError`]

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use base64::Engine;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};
use crate::remote::RemoteSource;
use crate::types::{PageResult, Record};

const DEFAULT_WORKOUTS_PATH: &str = "/v2/workouts";
const MAX_IDLE_PER_HOST: usize = 4;

/// Connection settings for [`HttpRemoteSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSourceConfig {
    /// Scheme and host, e.g. `https://api.example.com`
    pub base_url: String,
    #[serde(default = "default_workouts_path")]
    pub workouts_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_workouts_path() -> String {
    DEFAULT_WORKOUTS_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl HttpSourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            workouts_path: default_workouts_path(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }

    fn list_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.workouts_path.trim_start_matches('/')
        )
    }
}

// ============================================================================
// Wire Format
// ============================================================================

/// API response for the workout list endpoint
#[derive(Debug, Deserialize)]
struct WorkoutListResponse {
    workouts: Vec<ApiWorkout>,
    #[serde(default)]
    pagination: ApiPagination,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPagination {
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    has_newer: bool,
}

#[derive(Debug, Deserialize)]
struct ApiWorkout {
    id: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(alias = "type")]
    activity_type: String,
    #[serde(default)]
    distance_meters: Option<f64>,
    duration_seconds: f64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    calories: Option<f64>,
    #[serde(default)]
    avg_heart_rate: Option<f64>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<ApiWorkout> for Record {
    fn from(w: ApiWorkout) -> Self {
        Record {
            id: w.id,
            start_time: w.start_time,
            end_time: w.end_time,
            activity_type: w.activity_type,
            distance_meters: w.distance_meters,
            duration_seconds: w.duration_seconds,
            name: w.name,
            calories: w.calories,
            avg_heart_rate: w.avg_heart_rate,
            extra: w.extra,
        }
    }
}

fn parse_page(bytes: &[u8]) -> Result<PageResult> {
    let response: WorkoutListResponse = serde_json::from_slice(bytes)?;
    Ok(PageResult {
        records: response.workouts.into_iter().map(Record::from).collect(),
        has_more: response.pagination.has_more,
        has_newer: response.pagination.has_newer,
    })
}

/// Query parameters for one page request.
fn page_query(page_size: u32, before: Option<&str>, after: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", page_size.to_string())];
    if let Some(before) = before {
        query.push(("before", before.to_string()));
    }
    if let Some(after) = after {
        query.push(("after", after.to_string()));
    }
    query
}

// ============================================================================
// Backoff
// ============================================================================

/// Tracks consecutive 429s so backoff grows across requests, not just retries.
struct Backoff {
    consecutive_429s: AtomicU32,
}

impl Backoff {
    fn new() -> Self {
        Self {
            consecutive_429s: AtomicU32::new(0),
        }
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // 1s, 2s, 4s, 8s max
        let backoff = Duration::from_millis(500 * (1 << count.min(4)));
        warn!(
            "[HttpRemoteSource] Got 429! Consecutive: {}, backing off {:?}",
            count, backoff
        );
        backoff
    }
}

/// Delay before retrying a failed connection: 400ms, 800ms, ... 6.4s max
fn retry_delay(retries: u32) -> Duration {
    Duration::from_millis(200 * (1 << retries.min(5)))
}

// ============================================================================
// Remote Source
// ============================================================================

/// [`RemoteSource`] over the workout list HTTP endpoint.
pub struct HttpRemoteSource {
    client: Client,
    auth_header: String,
    config: HttpSourceConfig,
    backoff: Backoff,
}

impl HttpRemoteSource {
    /// Create a source authenticating with an API key (Basic auth)
    pub fn new(config: HttpSourceConfig, api_key: &str) -> Result<Self> {
        Self::with_auth_header(config, basic_auth_header(api_key))
    }

    /// Create a source with a pre-formatted auth header
    /// Supports both "Basic ..." and "Bearer ..." formats
    pub fn with_auth_header(config: HttpSourceConfig, auth_header: String) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(SyncError::config("base_url must not be empty"));
        }

        let client = Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            auth_header,
            config,
            backoff: Backoff::new(),
        })
    }

    async fn get_page(&self, query: Vec<(&'static str, String)>) -> Result<PageResult> {
        let url = self.config.list_url();
        let req_start = Instant::now();
        let mut retries = 0;

        loop {
            let response = self
                .client
                .get(&url)
                .header("Authorization", &self.auth_header)
                .query(&query)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(SyncError::Http {
                                status: status.as_u16(),
                                message: "Max retries exceeded (429)".to_string(),
                            });
                        }
                        let wait = self.backoff.record_429();
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    self.backoff.record_success();

                    if !status.is_success() {
                        return Err(SyncError::Http {
                            status: status.as_u16(),
                            message: status
                                .canonical_reason()
                                .unwrap_or("Unexpected status")
                                .to_string(),
                        });
                    }

                    let bytes = resp.bytes().await?;
                    let page = parse_page(&bytes)?;
                    debug!(
                        "[HttpRemoteSource] {:?} -> {} records in {:?} (has_more={}, has_newer={})",
                        query,
                        page.records.len(),
                        req_start.elapsed(),
                        page.has_more,
                        page.has_newer
                    );
                    return Ok(page);
                }
                Err(e) if e.is_timeout() => {
                    return Err(SyncError::Timeout {
                        after: Duration::from_secs(self.config.timeout_secs),
                    });
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(e.into());
                    }
                    let wait = retry_delay(retries);
                    warn!(
                        "[HttpRemoteSource] Error: {}, retry {} after {:?}",
                        e, retries, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl RemoteSource for HttpRemoteSource {
    fn fetch_initial(&self, page_size: u32) -> BoxFuture<'_, Result<PageResult>> {
        self.get_page(page_query(page_size, None, None)).boxed()
    }

    fn fetch_newer<'a>(
        &'a self,
        before_cursor: Option<&'a str>,
        page_size: u32,
    ) -> BoxFuture<'a, Result<PageResult>> {
        self.get_page(page_query(page_size, before_cursor, None))
            .boxed()
    }

    fn fetch_older<'a>(
        &'a self,
        after_cursor: &'a str,
        page_size: u32,
    ) -> BoxFuture<'a, Result<PageResult>> {
        self.get_page(page_query(page_size, None, Some(after_cursor)))
            .boxed()
    }
}

/// `Basic base64("API_KEY:{key}")`
pub fn basic_auth_header(api_key: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("API_KEY:{}", api_key));
    format!("Basic {}", encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page() {
        let body = br#"{
            "workouts": [
                {
                    "id": "w-2",
                    "start_time": "2024-06-02T06:00:00Z",
                    "end_time": "2024-06-02T07:00:00Z",
                    "type": "Ride",
                    "distance_meters": 30000.0,
                    "duration_seconds": 3600,
                    "avg_power": 210
                },
                {
                    "id": "w-1",
                    "start_time": "2024-06-01T06:00:00Z",
                    "end_time": "2024-06-01T06:30:00Z",
                    "activity_type": "Yoga",
                    "duration_seconds": 1800
                }
            ],
            "pagination": { "has_more": true }
        }"#;

        let page = parse_page(body).unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(page.has_more);
        assert!(!page.has_newer);
        assert_eq!(page.records[0].activity_type, "Ride");
        assert_eq!(page.records[0].extra["avg_power"], serde_json::json!(210));
        assert_eq!(page.records[1].distance_meters, None);
    }

    #[test]
    fn test_parse_page_without_pagination_is_terminal() {
        let page = parse_page(br#"{"workouts": []}"#).unwrap();
        assert!(page.records.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_parse_page_rejects_garbage() {
        assert!(matches!(
            parse_page(b"<html>oops</html>"),
            Err(SyncError::Decode { .. })
        ));
    }

    #[test]
    fn test_page_query() {
        assert_eq!(page_query(10, None, None), vec![("limit", "10".to_string())]);
        assert_eq!(
            page_query(5, Some("w-9"), None),
            vec![("limit", "5".to_string()), ("before", "w-9".to_string())]
        );
        assert_eq!(
            page_query(5, None, Some("w-1")),
            vec![("limit", "5".to_string()), ("after", "w-1".to_string())]
        );
    }

    #[test]
    fn test_list_url_joins_cleanly() {
        let config = HttpSourceConfig::new("https://api.example.com/");
        assert_eq!(config.list_url(), "https://api.example.com/v2/workouts");
    }

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(basic_auth_header("secret"), "Basic QVBJX0tFWTpzZWNyZXQ=");
    }

    #[test]
    fn test_rejects_empty_base_url() {
        let result = HttpRemoteSource::new(HttpSourceConfig::new(""), "key");
        assert!(matches!(result, Err(SyncError::Config { .. })));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(retry_delay(1), Duration::from_millis(400));
        assert_eq!(retry_delay(5), Duration::from_millis(6400));
        assert_eq!(retry_delay(64), Duration::from_millis(6400));
        assert_eq!(retry_delay(u32::MAX), Duration::from_millis(6400));
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let backoff = Backoff::new();
        assert_eq!(backoff.record_429(), Duration::from_millis(1000));
        assert_eq!(backoff.record_429(), Duration::from_millis(2000));
        backoff.record_success();
        assert_eq!(backoff.record_429(), Duration::from_millis(1000));
    }
}
