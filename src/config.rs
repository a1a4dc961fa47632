//! Environment-driven configuration
//!
//! Every setting has a hardcoded default; environment variables override it.
//! Malformed numeric values are logged and ignored rather than treated as
//! fatal.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::data::newsdata::NEWSDATA_BASE_URL;
use crate::data::{FetchOptions, RetryPolicy};

/// Default number of records per page
pub const DEFAULT_PAGE_SIZE: usize = 4;

/// Default upper bound on `pageSize`
pub const DEFAULT_MAX_PAGE_SIZE: usize = 4;

/// Default number of pages a section exposes
pub const DEFAULT_MAX_PAGES: usize = 5;

/// Absolute ceiling on records held per section
pub const MAX_CACHE_ITEMS: usize = 100;

/// Minimum gap between background refreshes of one section
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

const DEFAULT_BIND: &str = "0.0.0.0:3000";

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Settings for one news section
#[derive(Debug, Clone, PartialEq)]
pub struct SectionConfig {
    /// Section name, also the URL path segment and cache file stem
    pub name: String,
    /// Label reported back in response metadata
    pub region: Option<String>,
    /// Search term passed as `q` (empty means none)
    pub query: String,
    pub fetch_options: FetchOptions,
    /// How long fetched records count as fresh
    pub cache_duration: Duration,
    /// Informational cooldown after a successful fetch
    pub cooldown: Duration,
    pub retry: RetryPolicy,
}

impl SectionConfig {
    /// Builds a section with default timings
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: None,
            query: query.into(),
            fetch_options: FetchOptions::default(),
            cache_duration: Duration::from_millis(10 * MINUTE_MS),
            cooldown: Duration::from_millis(61 * MINUTE_MS),
            retry: RetryPolicy::default(),
        }
    }

    /// Applies `<SECTION>_*` environment overrides
    fn apply_env(mut self, lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let prefix = self.name.to_uppercase();
        if let Some(ms) = parse_var(lookup, &format!("{prefix}_CACHE_DURATION_MS")) {
            self.cache_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(lookup, &format!("{prefix}_COOLDOWN_MS")) {
            self.cooldown = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32>(lookup, &format!("{prefix}_MAX_RETRIES")) {
            self.retry.max_retries = n;
        }
        if let Some(ms) = parse_var(lookup, &format!("{prefix}_RETRY_DELAY_MS")) {
            self.retry.base_delay = Duration::from_millis(ms);
        }
        self
    }
}

/// The three live sections with their upstream queries
pub fn default_sections() -> Vec<SectionConfig> {
    vec![
        SectionConfig {
            region: Some("noticias".to_string()),
            fetch_options: FetchOptions {
                country: Some("uy".to_string()),
                ..FetchOptions::default()
            },
            ..SectionConfig::new("noticias", "")
        },
        SectionConfig {
            region: Some("música".to_string()),
            fetch_options: FetchOptions {
                language: Some("es".to_string()),
                ..FetchOptions::default()
            },
            cache_duration: Duration::from_millis(4 * HOUR_MS),
            ..SectionConfig::new("musica", "music")
        },
        SectionConfig {
            region: Some("entretenimiento".to_string()),
            cache_duration: Duration::from_millis(4 * HOUR_MS),
            ..SectionConfig::new("farandula", "farandula")
        },
    ]
}

/// Process-wide settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// NewsData.io API key (`USER_API_KEY`)
    pub api_key: Option<String>,
    pub base_url: String,
    /// Bearer token for the admin endpoints
    pub admin_token: Option<String>,
    /// Overrides the XDG cache directory
    pub cache_dir: Option<PathBuf>,
    pub bind: String,
    pub max_pages: usize,
    pub max_page_size: usize,
    pub sections: Vec<SectionConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: NEWSDATA_BASE_URL.to_string(),
            admin_token: None,
            cache_dir: None,
            bind: DEFAULT_BIND.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            sections: default_sections(),
        }
    }
}

impl ServiceConfig {
    /// Loads settings from the process environment (and `.env` if present)
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let api_key = non_empty(lookup("USER_API_KEY"));
        let admin_token = non_empty(lookup("CACHE_ADMIN_TOKEN")).or_else(|| api_key.clone());

        Self {
            api_key,
            base_url: non_empty(lookup("NEWSDATA_BASE_URL")).unwrap_or(defaults.base_url),
            admin_token,
            cache_dir: non_empty(lookup("RADIOFEED_CACHE_DIR")).map(PathBuf::from),
            bind: non_empty(lookup("RADIOFEED_BIND")).unwrap_or(defaults.bind),
            max_pages: parse_var(&lookup, "RADIOFEED_MAX_PAGES")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_pages),
            max_page_size: parse_var(&lookup, "RADIOFEED_MAX_PAGE_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_page_size),
            sections: defaults
                .sections
                .into_iter()
                .map(|s| s.apply_env(&lookup))
                .collect(),
        }
    }

    /// Records kept per section: every reachable page, bounded by the ceiling
    pub fn max_items(&self) -> usize {
        self.max_pages
            .saturating_mul(self.max_page_size)
            .min(MAX_CACHE_ITEMS)
    }

    pub fn section(&self, name: &str) -> Option<&SectionConfig> {
        self.sections.iter().find(|s| s.name == name)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses a numeric variable, warning on garbage
fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = non_empty(lookup(key))?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid numeric environment value");
            None
        }
    }
}
