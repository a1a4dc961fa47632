//! NewsData.io API client
//!
//! Fetches the latest articles for a query, validates and sanitizes each item,
//! and retries with exponential backoff when the API signals a rate limit.
//! Every failure is reported through [`FetchOutcome::error_msg`]; nothing
//! escapes this module as an `Err`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::Record;
use crate::text::sanitize_text;

/// Base URL for the NewsData.io "latest" endpoint
pub const NEWSDATA_BASE_URL: &str = "https://newsdata.io/api/1/latest";

/// Request timeout for a single API call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound the API accepts for `size`
const MAX_PAGE_SIZE: u32 = 50;

/// Minimum raw title length for an item to be considered
const MIN_RAW_TITLE_LEN: usize = 3;

/// Minimum title length once markup has been stripped
pub const MIN_ARTICLE_TITLE_LEN: usize = 10;

const USER_AGENT: &str = "RadioEclipse/2.0 (+https://radio-eclipse.com)";

/// Phrases in an error message that mark it as a rate limit
const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "limit exceeded",
    "too many requests",
    "cooldown",
];

/// Errors that can occur when fetching from NewsData.io
#[derive(Debug, Error)]
pub enum FetchError {
    /// No API key configured
    #[error("USER_API_KEY is not configured")]
    MissingApiKey,

    /// Transport-level failure (connect, timeout, TLS, body read)
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the call because of rate limiting
    #[error("rate limited by NewsData.io (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    /// Any other non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// 2xx with an empty body
    #[error("the API response is empty")]
    EmptyBody,

    /// Body is not valid JSON
    #[error("the API response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// JSON body whose `status` is not "success"
    #[error("the API returned status: {0}")]
    UpstreamStatus(String),

    /// JSON body without a `results` array
    #[error("the API response does not contain a results array")]
    MissingResults,
}

impl FetchError {
    /// Whether this failure should be retried with backoff
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

/// Whether an error message reads like a rate-limit response
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_PHRASES.iter().any(|p| lower.contains(p))
}

/// Optional query filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub country: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
    /// Number of results, capped at 50
    pub size: Option<u32>,
}

/// Backoff schedule for rate-limited calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Result of a fetch; never an error
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Validated, sanitized records
    pub records: Vec<Record>,
    pub error_msg: Option<String>,
    /// Whether the last failure was a rate limit
    pub rate_limited: bool,
    /// `totalResults` reported upstream
    pub total_results: Option<u64>,
}

impl FetchOutcome {
    fn failed(error: &FetchError) -> Self {
        Self {
            records: Vec::new(),
            error_msg: Some(error.to_string()),
            rate_limited: error.is_rate_limit(),
            total_results: None,
        }
    }
}

/// Something that can produce fresh records for a section
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetches with the retry policy applied; never fails
    async fn fetch_with_retry(
        &self,
        query: &str,
        options: &FetchOptions,
        retry: &RetryPolicy,
    ) -> FetchOutcome;
}

/// Response envelope from NewsData.io
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: Option<String>,
    #[serde(rename = "totalResults")]
    total_results: Option<u64>,
    results: Option<Value>,
}

/// Client for the NewsData.io API
#[derive(Debug, Clone)]
pub struct NewsDataClient {
    /// HTTP client for making requests
    http_client: Client,
    api_key: Option<String>,
    /// Base URL for the API (allows override for testing)
    base_url: String,
}

impl NewsDataClient {
    /// Creates a new client against the public API
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, NEWSDATA_BASE_URL.to_string())
    }

    /// Creates a new client with a custom base URL
    pub fn with_base_url(api_key: Option<String>, base_url: String) -> Self {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url,
        }
    }

    /// Builds the query string parameters for a request
    fn query_params(&self, api_key: &str, query: &str, options: &FetchOptions) -> Vec<(&'static str, String)> {
        let mut params = vec![("apikey", api_key.to_string())];
        let query = query.trim();
        if !query.is_empty() {
            params.push(("q", query.to_string()));
        }
        if let Some(ref country) = options.country {
            params.push(("country", country.clone()));
        }
        if let Some(ref language) = options.language {
            params.push(("language", language.clone()));
        }
        if let Some(ref category) = options.category {
            params.push(("category", category.clone()));
        }
        if let Some(size) = options.size {
            params.push(("size", size.min(MAX_PAGE_SIZE).to_string()));
        }
        params
    }

    /// Performs a single fetch
    ///
    /// # Returns
    /// A [`FetchOutcome`] carrying either validated records or an error
    /// message. Items failing validation are dropped without an error.
    pub async fn fetch(&self, query: &str, options: &FetchOptions) -> FetchOutcome {
        match self.fetch_from_api(query, options).await {
            Ok((records, total_results)) => FetchOutcome {
                records,
                error_msg: None,
                rate_limited: false,
                total_results,
            },
            Err(error) => {
                warn!(query, error = %error, "NewsData.io fetch failed");
                FetchOutcome::failed(&error)
            }
        }
    }

    /// Fetches the API and parses the body into records
    async fn fetch_from_api(
        &self,
        query: &str,
        options: &FetchOptions,
    ) -> Result<(Vec<Record>, Option<u64>), FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::MissingApiKey)?;
        let params = self.query_params(api_key, query, options);

        debug!(query, base_url = %self.base_url, "Requesting NewsData.io");

        let response = self
            .http_client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        parse_body(&text)
    }
}

#[async_trait]
impl NewsSource for NewsDataClient {
    async fn fetch_with_retry(
        &self,
        query: &str,
        options: &FetchOptions,
        retry: &RetryPolicy,
    ) -> FetchOutcome {
        let mut attempt = 0;
        loop {
            let outcome = self.fetch(query, options).await;
            if !outcome.rate_limited || attempt >= retry.max_retries {
                if outcome.rate_limited {
                    warn!(query, attempts = attempt + 1, "Rate limit retries exhausted");
                }
                return outcome;
            }

            let delay = retry.delay_for(attempt);
            info!(query, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Rate limited, backing off");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Turns a non-success response into an error, spotting rate limits
fn classify_failure(status: StatusCode, body: &str) -> FetchError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| upstream_message(&v))
        .unwrap_or_else(|| {
            format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim()
            .to_string()
        });

    if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limit_message(&message) {
        FetchError::RateLimited {
            status: status.as_u16(),
            message,
        }
    } else {
        FetchError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

/// Extracts the human-readable error from a NewsData error body
fn upstream_message(value: &Value) -> Option<String> {
    for key in ["message", "error"] {
        match value.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Object(obj)) => {
                if let Some(Value::String(s)) = obj.get("message") {
                    return Some(s.clone());
                }
            }
            _ => {}
        }
    }
    if let Some(Value::Object(results)) = value.get("results") {
        if let Some(Value::String(s)) = results.get("message") {
            return Some(s.clone());
        }
    }
    None
}

/// Parses a successful response body into validated records
fn parse_body(text: &str) -> Result<(Vec<Record>, Option<u64>), FetchError> {
    if text.trim().is_empty() {
        return Err(FetchError::EmptyBody);
    }

    let response: ApiResponse = serde_json::from_str(text)?;

    match response.status.as_deref() {
        Some("success") => {}
        other => return Err(FetchError::UpstreamStatus(other.unwrap_or("missing").to_string())),
    }

    let Some(Value::Array(items)) = response.results else {
        return Err(FetchError::MissingResults);
    };

    let total = items.len();
    let records: Vec<Record> = items.iter().filter_map(parse_article).collect();

    debug!(valid = records.len(), dropped = total - records.len(), "Parsed NewsData.io results");

    Ok((records, response.total_results))
}

/// Validates and sanitizes one article, returning `None` if it is unusable
fn parse_article(item: &Value) -> Option<Record> {
    let Value::Object(obj) = item else {
        return None;
    };

    let title = obj.get("title")?.as_str()?;
    let link = obj.get("link")?.as_str()?;
    let pub_date = obj.get("pubDate")?.as_str()?;
    let source_id = obj.get("source_id")?.as_str()?;

    if title.chars().count() < MIN_RAW_TITLE_LEN || !link.starts_with("http") {
        return None;
    }

    let title = sanitize_text(title);
    if title.chars().count() < MIN_ARTICLE_TITLE_LEN {
        return None;
    }

    let mut extra: Map<String, Value> = obj.clone();
    for key in ["title", "link", "pubDate", "description", "source_id", "image_url"] {
        extra.remove(key);
    }
    if let Some(Value::String(content)) = extra.get("content") {
        let cleaned = sanitize_text(content);
        extra.insert("content".to_string(), Value::String(cleaned));
    }

    Some(Record {
        title,
        link: link.to_string(),
        pub_date: Some(pub_date.to_string()),
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .map(sanitize_text)
            .filter(|d| !d.is_empty()),
        source_id: Some(source_id.to_string()),
        image_url: obj
            .get("image_url")
            .and_then(Value::as_str)
            .map(str::to_string),
        extra,
    })
}
