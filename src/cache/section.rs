//! Per-section freshness cache
//!
//! [`SectionCacheStore`] owns the in-memory state of every section, decides
//! when a section is stale, runs fetch-merge cycles against a [`NewsSource`],
//! and assembles paginated responses. It never returns an error to callers:
//! failed refreshes degrade to serving the last known good records.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::pagination::paginate;
use super::store::{SectionStore, StoredSection};
use crate::config::{SectionConfig, ServiceConfig, DEFAULT_PAGE_SIZE, MIN_REFRESH_INTERVAL};
use crate::data::{now_millis, NewsSource, Record};
use crate::dedup::{filter_and_clean, merge, CleanOptions, MergeOptions};

/// Shown when a section has nothing to serve
pub const NO_DATA_MESSAGE: &str = "No data available";

/// Minimum title length for a fetched record to be kept
const MIN_TITLE_LEN: usize = 6;

/// Mutable state of one section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionCacheEntry {
    /// Deduplicated records, newest first
    pub records: Vec<Record>,
    /// When `records` were last replaced (epoch ms, 0 = never)
    pub timestamp: i64,
    /// When a fetch was last started
    pub last_fetch_attempt: i64,
    /// When a fetch last produced usable records
    pub last_success: i64,
    /// Error from the most recent failed cycle
    pub error_msg: Option<String>,
    /// Snapshot served when a refresh yields nothing
    pub last_valid_records: Vec<Record>,
    pub total_api_calls: u64,
    pub rate_limit_hits: u64,
}

/// What a fetch-merge cycle did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// New records replaced the section's state
    Refreshed { count: usize },
    /// The fetch produced nothing usable; prior state kept
    Failed { error_msg: String, rate_limited: bool },
    /// Another cycle was already running
    Skipped,
}

/// Page parameters as received from a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
    /// Bypass the freshness check and refresh before answering
    pub force: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            force: false,
        }
    }
}

/// Coarse status reported with each response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStatus {
    Ok,
    Error,
    Cooldown,
    RateLimit,
    Fallback,
}

/// Paging and freshness details of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub real_max_pages: usize,
    pub cooldown_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// RFC 3339 time of the last successful write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    /// Seconds since the last successful write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_age: Option<i64>,
}

/// JSON body returned for a section request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionResponse {
    pub noticias: Vec<Record>,
    /// Served without a refresh completing during this request
    pub cached: bool,
    /// Records were replaced during this request
    pub hubo_cambio: bool,
    pub error_msg: String,
    /// Served the last known good snapshot after a failed refresh
    pub fallback: bool,
    pub api_status: ApiStatus,
    pub meta: ResponseMeta,
}

impl SectionResponse {
    /// An empty response carrying only an error
    pub fn unavailable(error_msg: impl Into<String>, page_size: usize) -> Self {
        Self {
            noticias: Vec::new(),
            cached: false,
            hubo_cambio: false,
            error_msg: error_msg.into(),
            fallback: false,
            api_status: ApiStatus::Error,
            meta: ResponseMeta {
                page: 1,
                page_size,
                total: 0,
                real_max_pages: 1,
                cooldown_active: false,
                region: None,
                last_update: None,
                cache_age: None,
            },
        }
    }
}

/// Result of a forced refresh of one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub section: String,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
}

/// Per-section outcome of an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// A section's state plus its in-flight marker
struct SectionSlot {
    config: SectionConfig,
    entry: Mutex<SectionCacheEntry>,
    updating: AtomicBool,
    /// Serializes memory-plus-disk writes so both always agree
    writes: Mutex<()>,
}

/// Clears the `updating` flag when the cycle ends, however it ends
struct UpdatingGuard<'a>(&'a AtomicBool);

impl<'a> UpdatingGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns every section's cache state
///
/// Construct once at startup and share through an `Arc`. Sections are created
/// on first access, seeded from the [`SectionStore`].
pub struct SectionCacheStore {
    configs: Vec<SectionConfig>,
    slots: Mutex<HashMap<String, Arc<SectionSlot>>>,
    source: Arc<dyn NewsSource>,
    store: SectionStore,
    max_pages: usize,
    max_page_size: usize,
    max_items: usize,
}

impl SectionCacheStore {
    pub fn new(config: &ServiceConfig, source: Arc<dyn NewsSource>, store: SectionStore) -> Self {
        Self {
            configs: config.sections.clone(),
            slots: Mutex::new(HashMap::new()),
            source,
            store,
            max_pages: config.max_pages,
            max_page_size: config.max_page_size.max(1),
            max_items: config.max_items(),
        }
    }

    /// Names of all configured sections, in configuration order
    pub fn section_names(&self) -> Vec<String> {
        self.configs.iter().map(|c| c.name.clone()).collect()
    }

    pub fn store(&self) -> &SectionStore {
        &self.store
    }

    /// Copy of a section's current state
    pub fn snapshot(&self, section: &str) -> Option<SectionCacheEntry> {
        self.slot(section).map(|slot| slot.entry.lock().clone())
    }

    /// Returns the slot for a section, creating it from disk on first use
    fn slot(&self, section: &str) -> Option<Arc<SectionSlot>> {
        let config = self.configs.iter().find(|c| c.name == section)?;

        if let Some(slot) = self.slots.lock().get(section) {
            return Some(Arc::clone(slot));
        }

        // Disk read happens outside the map lock; a racing first access
        // seeds its own copy and the first insert wins.
        let seeded = Arc::new(SectionSlot {
            config: config.clone(),
            entry: Mutex::new(self.seed_entry(section)),
            updating: AtomicBool::new(false),
            writes: Mutex::new(()),
        });

        let mut slots = self.slots.lock();
        let slot = slots.entry(section.to_string()).or_insert(seeded);
        Some(Arc::clone(slot))
    }

    /// Clamps a requested page size to `[1, max_page_size]`
    pub fn clamp_page_size(&self, page_size: usize) -> usize {
        page_size.clamp(1, self.max_page_size)
    }

    /// Builds a section's initial state from its file
    fn seed_entry(&self, section: &str) -> SectionCacheEntry {
        let Some(stored) = self.store.load(section) else {
            debug!(section, "Starting with an empty cache");
            return SectionCacheEntry::default();
        };

        let clean = CleanOptions {
            merge: MergeOptions::for_sections(self.max_items),
            ..CleanOptions::default()
        };
        let records = filter_and_clean(&stored.records, &clean);

        info!(section, count = records.len(), timestamp = stored.timestamp, "Seeded cache from disk");

        SectionCacheEntry {
            last_valid_records: records.clone(),
            records,
            timestamp: stored.timestamp,
            last_success: stored.timestamp,
            ..SectionCacheEntry::default()
        }
    }

    /// Serves one page of a section
    ///
    /// Returns `None` for an unknown section. Stale, empty or forced sections
    /// are refreshed before answering; fresh ones answer from memory and may
    /// start a background refresh.
    pub async fn serve(self: &Arc<Self>, section: &str, request: PageRequest) -> Option<SectionResponse> {
        let slot = self.slot(section)?;
        let config = &slot.config;

        let page = request.page.max(1);
        let page_size = self.clamp_page_size(request.page_size);

        let now = now_millis();
        let (stale, empty, last_attempt) = {
            let entry = slot.entry.lock();
            let age = now - entry.timestamp;
            (
                entry.timestamp == 0 || age > config.cache_duration.as_millis() as i64,
                entry.records.is_empty(),
                entry.last_fetch_attempt,
            )
        };

        debug!(section, page, page_size, force = request.force, stale, empty, "Serving section");

        let cycle = if request.force || stale || empty {
            Some(self.run_cycle(&slot).await)
        } else {
            let idle = now - last_attempt >= MIN_REFRESH_INTERVAL.as_millis() as i64;
            if idle && !slot.updating.load(Ordering::Acquire) {
                self.spawn_background_refresh(Arc::clone(&slot));
            }
            None
        };

        Some(self.build_response(&slot, cycle, page, page_size))
    }

    /// Starts a detached refresh whose result is only logged
    fn spawn_background_refresh(self: &Arc<Self>, slot: Arc<SectionSlot>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.run_cycle(&slot).await {
                CycleOutcome::Refreshed { count } => {
                    debug!(section = %slot.config.name, count, "Background refresh done");
                }
                CycleOutcome::Failed { error_msg, rate_limited } => {
                    warn!(section = %slot.config.name, rate_limited, error = %error_msg, "Background refresh failed");
                }
                CycleOutcome::Skipped => {}
            }
        });
    }

    /// Fetches, filters, deduplicates and stores new records for a section
    ///
    /// A no-op returning [`CycleOutcome::Skipped`] if a cycle for the same
    /// section is already running.
    async fn run_cycle(&self, slot: &SectionSlot) -> CycleOutcome {
        let Some(_guard) = UpdatingGuard::claim(&slot.updating) else {
            debug!(section = %slot.config.name, "Refresh already in progress");
            return CycleOutcome::Skipped;
        };
        let config = &slot.config;

        {
            let mut entry = slot.entry.lock();
            entry.last_fetch_attempt = now_millis();
            entry.total_api_calls += 1;
        }

        let outcome = self
            .source
            .fetch_with_retry(&config.query, &config.fetch_options, &config.retry)
            .await;

        let valid: Vec<Record> = outcome
            .records
            .into_iter()
            .filter(is_minimally_valid)
            .collect();
        let merged = merge(&valid, &[], &MergeOptions::for_sections(self.max_items));

        if merged.is_empty() {
            let error_msg = outcome
                .error_msg
                .unwrap_or_else(|| "The news API returned no usable records".to_string());
            let mut entry = slot.entry.lock();
            entry.error_msg = Some(error_msg.clone());
            if outcome.rate_limited {
                entry.rate_limit_hits += 1;
            }
            warn!(
                section = %config.name,
                rate_limited = outcome.rate_limited,
                rate_limit_hits = entry.rate_limit_hits,
                error = %error_msg,
                "Refresh produced no records, keeping previous state"
            );
            return CycleOutcome::Failed {
                error_msg,
                rate_limited: outcome.rate_limited,
            };
        }

        let _write = slot.writes.lock();
        let now = now_millis();
        let count = merged.len();
        let total_api_calls = {
            let mut entry = slot.entry.lock();
            entry.records = merged.clone();
            entry.last_valid_records = merged.clone();
            entry.timestamp = now;
            entry.last_success = now;
            entry.error_msg = None;
            entry.total_api_calls
        };

        if let Err(e) = self.store.save_at(&config.name, &merged, now) {
            warn!(section = %config.name, error = %e, "Could not persist section cache");
        }

        info!(section = %config.name, count, total_api_calls, "Section cache refreshed");
        CycleOutcome::Refreshed { count }
    }

    /// Assembles the response from the section's current state
    fn build_response(
        &self,
        slot: &SectionSlot,
        cycle: Option<CycleOutcome>,
        page: usize,
        page_size: usize,
    ) -> SectionResponse {
        let config = &slot.config;
        let entry = slot.entry.lock();
        let now = now_millis();

        let refreshed = matches!(cycle, Some(CycleOutcome::Refreshed { .. }));
        let (error, rate_limited) = match &cycle {
            Some(CycleOutcome::Failed { error_msg, rate_limited }) => (Some(error_msg.clone()), *rate_limited),
            _ => (None, false),
        };
        let refresh_missed = matches!(
            cycle,
            Some(CycleOutcome::Failed { .. }) | Some(CycleOutcome::Skipped)
        );

        let source_records = if refresh_missed {
            &entry.last_valid_records
        } else {
            &entry.records
        };
        let fallback = refresh_missed && !source_records.is_empty();

        let paged = paginate(source_records, page, page_size, self.max_pages);

        let cooldown_ms = config.cooldown.as_millis() as i64;
        let cooldown_active = entry.last_success > 0 && now - entry.last_success < cooldown_ms;

        let error_msg = if paged.total_items == 0 {
            match error.as_deref().or(entry.error_msg.as_deref()) {
                Some(e) => format!("{NO_DATA_MESSAGE}: {e}"),
                None => NO_DATA_MESSAGE.to_string(),
            }
        } else {
            error.clone().unwrap_or_default()
        };

        let api_status = if rate_limited {
            ApiStatus::RateLimit
        } else if fallback {
            ApiStatus::Fallback
        } else if paged.total_items == 0 {
            ApiStatus::Error
        } else if cooldown_active {
            ApiStatus::Cooldown
        } else {
            ApiStatus::Ok
        };

        let (last_update, cache_age) = if entry.timestamp > 0 {
            (
                Utc.timestamp_millis_opt(entry.timestamp)
                    .single()
                    .map(|t| t.to_rfc3339()),
                Some((now - entry.timestamp) / 1000),
            )
        } else {
            (None, None)
        };

        SectionResponse {
            noticias: paged.items,
            cached: !refreshed,
            hubo_cambio: refreshed,
            error_msg,
            fallback,
            api_status,
            meta: ResponseMeta {
                page,
                page_size,
                total: paged.total_items,
                real_max_pages: paged.real_max_pages,
                cooldown_active,
                region: config.region.clone(),
                last_update,
                cache_age,
            },
        }
    }

    /// Forces a refresh of every section concurrently
    pub async fn refresh_all(&self) -> Vec<RefreshSummary> {
        let slots: Vec<Arc<SectionSlot>> = self
            .configs
            .iter()
            .filter_map(|c| self.slot(&c.name))
            .collect();

        let outcomes = futures::future::join_all(slots.iter().map(|slot| self.run_cycle(slot))).await;

        slots
            .iter()
            .zip(outcomes)
            .map(|(slot, outcome)| RefreshSummary {
                section: slot.config.name.clone(),
                outcome,
            })
            .collect()
    }

    /// Snapshot of every section as it would be persisted
    pub fn export(&self) -> BTreeMap<String, StoredSection> {
        self.configs
            .iter()
            .filter_map(|c| {
                let slot = self.slot(&c.name)?;
                let entry = slot.entry.lock();
                Some((
                    c.name.clone(),
                    StoredSection {
                        records: entry.records.clone(),
                        timestamp: entry.timestamp,
                    },
                ))
            })
            .collect()
    }

    /// Replaces sections from an exported snapshot
    ///
    /// Every configured section whose value carries a `noticias` array is
    /// deduplicated, capped, written to disk and swapped into memory.
    /// Sections missing from `data` or with unreadable records are skipped.
    pub fn import(&self, data: &Value) -> ImportReport {
        let mut report = ImportReport::default();

        for config in &self.configs {
            let name = &config.name;
            let raw = data.get(name).and_then(|section| section.get("noticias"));
            let records: Vec<Record> = match raw {
                Some(array @ Value::Array(_)) => match serde_json::from_value(array.clone()) {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(section = %name, error = %e, "Import records are malformed");
                        report.skipped.push(name.clone());
                        continue;
                    }
                },
                _ => {
                    debug!(section = %name, "No import data for section");
                    report.skipped.push(name.clone());
                    continue;
                }
            };

            let Some(slot) = self.slot(name) else {
                continue;
            };
            let capped = merge(&records, &[], &MergeOptions::for_sections(self.max_items));

            let _write = slot.writes.lock();
            let now = now_millis();
            if let Err(e) = self.store.save_at(name, &capped, now) {
                warn!(section = %name, error = %e, "Could not persist imported section");
                report.failed.push(name.clone());
                continue;
            }

            {
                let mut entry = slot.entry.lock();
                entry.records = capped.clone();
                entry.last_valid_records = capped.clone();
                entry.timestamp = now;
                entry.error_msg = None;
            }

            info!(section = %name, count = capped.len(), "Section imported");
            report.imported.push(name.clone());
        }

        report
    }
}

/// Minimal shape check applied to fetched records
fn is_minimally_valid(record: &Record) -> bool {
    record.title.trim().chars().count() > MIN_TITLE_LEN && record.link.starts_with("http")
}
