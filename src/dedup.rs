//! Record deduplication and merging
//!
//! Two batches of records are folded into one recency-ordered batch where no
//! two records share an identity key. Duplicates are merged rather than
//! dropped so the richest version of each field survives.

use std::collections::HashMap;

use crate::data::{now_millis, Record};
use crate::text::normalize_text;

/// Separator between normalized key fields in an identity key
const KEY_SEPARATOR: &str = "|";

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// How two records are judged to be the same item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityPolicy {
    /// Every normalized key field must be equal
    #[default]
    Exact,
    /// Every normalized key field must be within `max_distance` edits
    Fuzzy { max_distance: usize },
}

/// Parameters for [`merge`]
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub key_fields: Vec<String>,
    pub date_field: String,
    pub max_items: usize,
    /// Fields where the longer non-empty value wins on merge
    pub merge_fields: Vec<String>,
    pub identity: IdentityPolicy,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            key_fields: vec!["title".to_string(), "link".to_string()],
            date_field: "pubDate".to_string(),
            max_items: 20,
            merge_fields: Vec::new(),
            identity: IdentityPolicy::Exact,
        }
    }
}

impl MergeOptions {
    /// Options used on the live refresh path
    pub fn for_sections(max_items: usize) -> Self {
        Self {
            max_items,
            merge_fields: ["description", "image_url", "source_id", "content"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Self::default()
        }
    }
}

/// Computes the identity key of a record
pub fn identity_key(record: &Record, key_fields: &[String]) -> String {
    key_fields
        .iter()
        .map(|field| normalize_text(record.field(field)))
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// Merges two batches into one deduplicated, recency-ordered batch
///
/// Records are ordered newest first by `date_field`; records with a missing
/// or unparseable date sort last but are still eligible. A record whose
/// identity matches an already accepted one is folded into it. At most
/// `max_items` records are returned.
pub fn merge(batch_a: &[Record], batch_b: &[Record], options: &MergeOptions) -> Vec<Record> {
    let mut all: Vec<(i64, &Record)> = batch_a
        .iter()
        .chain(batch_b.iter())
        .map(|r| (r.timestamp_of(&options.date_field), r))
        .collect();
    // Stable, so equal dates keep batch order
    all.sort_by(|a, b| b.0.cmp(&a.0));

    let mut result: Vec<Record> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (_, record) in all {
        if result.len() >= options.max_items {
            break;
        }

        let key = identity_key(record, &options.key_fields);
        let existing = match seen.get(&key) {
            Some(&idx) => Some(idx),
            None => find_similar(&result, record, options),
        };

        match existing {
            Some(idx) => merge_into(&mut result[idx], record, options),
            None => {
                seen.insert(key, result.len());
                result.push(record.clone());
            }
        }
    }

    result
}

/// Finds an accepted record matching `candidate` under the fuzzy policy
fn find_similar(accepted: &[Record], candidate: &Record, options: &MergeOptions) -> Option<usize> {
    let IdentityPolicy::Fuzzy { max_distance } = options.identity else {
        return None;
    };

    accepted.iter().position(|prev| {
        options.key_fields.iter().all(|field| {
            let a = normalize_text(prev.field(field));
            let b = normalize_text(candidate.field(field));
            !a.is_empty() && !b.is_empty() && strsim::levenshtein(&a, &b) <= max_distance
        })
    })
}

/// Folds `incoming` into `existing`
///
/// Merge fields take the longer non-empty value, the date field takes the
/// more recent value, and every other field keeps the existing value.
fn merge_into(existing: &mut Record, incoming: &Record, options: &MergeOptions) {
    for field in &options.merge_fields {
        let Some(candidate) = incoming.field(field).filter(|v| !v.is_empty()) else {
            continue;
        };
        let current_len = existing.field(field).map(|v| v.chars().count()).unwrap_or(0);
        if candidate.chars().count() > current_len {
            existing.set_field(field, candidate.to_string());
        }
    }

    if let Some(incoming_date) = incoming.field(&options.date_field) {
        let incoming_ts = incoming.timestamp_of(&options.date_field);
        let existing_missing = existing.field(&options.date_field).is_none();
        if existing_missing || incoming_ts > existing.timestamp_of(&options.date_field) {
            existing.set_field(&options.date_field, incoming_date.to_string());
        }
    }
}

/// Quality filter applied before deduplication
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Titles must be strictly longer than this many characters
    pub min_title: Option<usize>,
    /// Descriptions must be at least this many characters
    pub min_description: Option<usize>,
    /// Dated records older than this many days are dropped
    pub max_age_days: Option<i64>,
    /// Records whose lowercase title contains any of these are dropped
    pub exclude_title: Vec<String>,
    /// Records whose lowercase description contains any of these are dropped
    pub exclude_description: Vec<String>,
    pub merge: MergeOptions,
}

/// Filters low-quality records, then deduplicates the remainder
pub fn filter_and_clean(records: &[Record], options: &CleanOptions) -> Vec<Record> {
    let now = now_millis();
    let date_field = &options.merge.date_field;

    let kept: Vec<Record> = records
        .iter()
        .filter(|r| !r.title.is_empty() && !r.link.is_empty())
        .filter(|r| {
            options
                .min_title
                .map_or(true, |min| r.title.chars().count() > min)
        })
        .filter(|r| {
            let title = r.title.to_lowercase();
            !options.exclude_title.iter().any(|ex| title.contains(ex.as_str()))
        })
        .filter(|r| match options.min_description {
            Some(min) => r
                .description
                .as_deref()
                .is_some_and(|d| d.chars().count() >= min),
            None => true,
        })
        .filter(|r| {
            if options.exclude_description.is_empty() {
                return true;
            }
            let desc = r.description.as_deref().unwrap_or_default().to_lowercase();
            !options
                .exclude_description
                .iter()
                .any(|ex| desc.contains(ex.as_str()))
        })
        .filter(|r| match (options.max_age_days, r.field(date_field)) {
            (Some(days), Some(_)) => {
                let ts = r.timestamp_of(date_field);
                ts > 0 && now - ts < days * MILLIS_PER_DAY
            }
            _ => true,
        })
        .cloned()
        .collect();

    merge(&kept, &[], &options.merge)
}
