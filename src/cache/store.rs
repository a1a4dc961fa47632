//! Section store for persisting record batches to disk
//!
//! Provides a `SectionStore` that keeps one JSON file per section, holding the
//! section's records and the time they were written. Unreadable files are
//! treated as absent so a corrupt cache never blocks serving.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::data::{now_millis, Record};

/// Errors that can occur when writing a section to disk
#[derive(Debug, Error)]
pub enum StoreError {
    /// Directory creation, write or rename failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Records could not be encoded
    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// On-disk shape of a section file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSection {
    /// The section's records in recency order
    #[serde(rename = "noticias", alias = "records")]
    pub records: Vec<Record>,
    /// When the records were written, in epoch milliseconds
    #[serde(default)]
    pub timestamp: i64,
}

/// Reads and writes section files
///
/// Files live in an XDG-compliant cache directory (`~/.cache/radiofeed/` on
/// Linux) unless a directory is given explicitly.
#[derive(Debug, Clone)]
pub struct SectionStore {
    /// Directory where section files are stored
    cache_dir: PathBuf,
}

impl SectionStore {
    /// Creates a store using the XDG cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "radiofeed")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { cache_dir })
    }

    /// Creates a store with a custom directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to the file for a section
    pub fn section_path(&self, section: &str) -> PathBuf {
        self.cache_dir.join(format!("{}-cache.json", section))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// Loads a section
    ///
    /// Returns `None` if the file doesn't exist or cannot be parsed.
    pub fn load(&self, section: &str) -> Option<StoredSection> {
        let path = self.section_path(section);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!(section, path = %path.display(), error = %e, "No readable cache file");
                return None;
            }
        };

        match serde_json::from_str::<StoredSection>(&content) {
            Ok(stored) => Some(stored),
            Err(e) => {
                debug!(section, path = %path.display(), error = %e, "Ignoring malformed cache file");
                None
            }
        }
    }

    /// Saves a section stamped with the current time
    ///
    /// The whole file is replaced; no cap is applied here.
    pub fn save(&self, section: &str, records: &[Record]) -> Result<(), StoreError> {
        self.save_at(section, records, now_millis())
    }

    /// Saves a section with an explicit timestamp
    ///
    /// Each call writes its own uniquely named sibling file and renames it
    /// into place, so readers never observe a partial file and overlapping
    /// writers never share a temporary path.
    pub fn save_at(&self, section: &str, records: &[Record], timestamp: i64) -> Result<(), StoreError> {
        self.ensure_dir()?;

        let stored = StoredSectionRef { records, timestamp };
        let json = serde_json::to_string_pretty(&stored)?;

        let target = self.section_path(section);
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}-cache.", section))
            .suffix(".tmp")
            .tempfile_in(&self.cache_dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;

        debug!(section, count = records.len(), "Section cache written");
        Ok(())
    }
}

/// Borrowing twin of [`StoredSection`] for writes
#[derive(Serialize)]
struct StoredSectionRef<'a> {
    #[serde(rename = "noticias")]
    records: &'a [Record],
    timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SectionStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = SectionStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    fn sample_records() -> Vec<Record> {
        vec![
            Record::new("Primera noticia del día", "https://x.uy/1").with_pub_date("2024-01-02"),
            Record::new("Segunda noticia del día", "https://x.uy/2"),
        ]
    }

    #[test]
    fn test_save_creates_section_file() {
        let (store, temp_dir) = create_test_store();

        store.save("noticias", &sample_records()).expect("Save should succeed");

        let expected_path = temp_dir.path().join("noticias-cache.json");
        assert!(expected_path.exists(), "Section file should exist");

        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("\"noticias\""));
        assert!(content.contains("\"timestamp\""));
        assert!(content.contains("Primera noticia"));
    }

    #[test]
    fn test_load_returns_none_for_missing_section() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.load("musica").is_none());
    }

    #[test]
    fn test_load_returns_none_for_malformed_file() {
        let (store, temp_dir) = create_test_store();
        fs::write(temp_dir.path().join("musica-cache.json"), "{ broken").unwrap();

        assert!(store.load("musica").is_none());
    }

    #[test]
    fn test_load_returns_none_when_records_missing() {
        let (store, temp_dir) = create_test_store();
        fs::write(temp_dir.path().join("musica-cache.json"), r#"{"timestamp": 5}"#).unwrap();

        assert!(store.load("musica").is_none());
    }

    #[test]
    fn test_save_then_load_returns_same_records() {
        let (store, _temp_dir) = create_test_store();
        let records = sample_records();

        let before = now_millis();
        store.save("farandula", &records).expect("Save should succeed");

        let loaded = store.load("farandula").expect("Should load section");
        assert_eq!(loaded.records, records);
        assert!(loaded.timestamp >= before);
    }

    #[test]
    fn test_load_accepts_records_key() {
        let (store, temp_dir) = create_test_store();
        fs::write(
            temp_dir.path().join("noticias-cache.json"),
            r#"{"records": [{"title": "T", "link": "https://x"}], "timestamp": 9}"#,
        )
        .unwrap();

        let loaded = store.load("noticias").expect("Should load section");
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.timestamp, 9);
    }

    #[test]
    fn test_save_at_keeps_timestamp() {
        let (store, _temp_dir) = create_test_store();

        store.save_at("noticias", &sample_records(), 123).expect("Save should succeed");

        assert_eq!(store.load("noticias").unwrap().timestamp, 123);
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_temp_file() {
        let (store, temp_dir) = create_test_store();
        let records = sample_records();

        store.save("noticias", &records).expect("First save should succeed");
        store.save("noticias", &records[..1]).expect("Second save should succeed");

        assert_eq!(store.load("noticias").unwrap().records.len(), 1);
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_concurrent_saves_to_one_section_all_succeed() {
        let (store, temp_dir) = create_test_store();
        let records = sample_records();

        for _ in 0..50 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|i| {
                        let store = &store;
                        let batch = &records[..1 + i % 2];
                        scope.spawn(move || store.save("noticias", batch))
                    })
                    .collect();
                for handle in handles {
                    handle
                        .join()
                        .expect("writer thread panicked")
                        .expect("Concurrent save should succeed");
                }
            });

            let loaded = store.load("noticias").expect("Should load section");
            assert!(!loaded.records.is_empty());
        }

        let leftovers = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_save_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = SectionStore::with_dir(nested_path.clone());

        store.save("musica", &sample_records()).expect("Save should succeed");

        assert!(nested_path.join("musica-cache.json").exists());
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = SectionStore::new() {
            let path_str = store.cache_dir().to_string_lossy();
            assert!(path_str.contains("radiofeed"), "Cache path should contain project name");
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }
}
