//! Core data model for the news sections
//!
//! A [`Record`] is a single news item as served to the site. The named fields
//! are the ones the cache reasons about; everything else the upstream API
//! sends is kept verbatim in [`Record::extra`].

pub mod newsdata;

pub use newsdata::{
    FetchError, FetchOptions, FetchOutcome, NewsDataClient, NewsSource, RetryPolicy,
};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A news item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Headline
    pub title: String,
    /// Canonical URL of the article
    pub link: String,
    /// Publication timestamp as sent upstream
    #[serde(rename = "pubDate", default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Upstream source identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Passthrough fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    /// Creates a record with only the required fields set
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            pub_date: None,
            description: None,
            source_id: None,
            image_url: None,
            extra: Map::new(),
        }
    }

    /// Sets the publication date
    pub fn with_pub_date(mut self, pub_date: impl Into<String>) -> Self {
        self.pub_date = Some(pub_date.into());
        self
    }

    /// Sets the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the source identifier
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Looks up a field by its wire name
    ///
    /// Named fields are matched first; extension fields only resolve when they
    /// hold a JSON string.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "title" => Some(self.title.as_str()),
            "link" => Some(self.link.as_str()),
            "pubDate" => self.pub_date.as_deref(),
            "description" => self.description.as_deref(),
            "source_id" => self.source_id.as_deref(),
            "image_url" => self.image_url.as_deref(),
            other => self.extra.get(other).and_then(Value::as_str),
        }
    }

    /// Sets a field by its wire name
    pub fn set_field(&mut self, name: &str, value: String) {
        match name {
            "title" => self.title = value,
            "link" => self.link = value,
            "pubDate" => self.pub_date = Some(value),
            "description" => self.description = Some(value),
            "source_id" => self.source_id = Some(value),
            "image_url" => self.image_url = Some(value),
            other => {
                self.extra.insert(other.to_string(), Value::String(value));
            }
        }
    }

    /// Epoch milliseconds of the given date field, 0 when missing or unparseable
    pub fn timestamp_of(&self, date_field: &str) -> i64 {
        self.field(date_field).map(parse_timestamp).unwrap_or(0)
    }
}

/// Parses a publication timestamp into epoch milliseconds
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (read as UTC) and bare
/// `YYYY-MM-DD`. Anything else yields 0 so the record sorts as oldest.
pub fn parse_timestamp(value: &str) -> i64 {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.timestamp_millis();
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return naive.and_utc().timestamp_millis();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return naive.and_utc().timestamp_millis();
        }
    }
    0
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization_uses_wire_names() {
        let record = Record::new("Title", "https://example.com/a")
            .with_pub_date("2024-01-01 10:00:00")
            .with_source_id("elpais");

        let json = serde_json::to_value(&record).expect("Failed to serialize Record");

        assert_eq!(json["pubDate"], "2024-01-01 10:00:00");
        assert_eq!(json["source_id"], "elpais");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_record_preserves_extra_fields() {
        let json = r#"{
            "title": "Title",
            "link": "https://example.com/a",
            "keywords": ["a", "b"],
            "content": "body"
        }"#;

        let record: Record = serde_json::from_str(json).expect("Failed to deserialize Record");
        assert_eq!(record.extra["keywords"], serde_json::json!(["a", "b"]));
        assert_eq!(record.field("content"), Some("body"));

        let back = serde_json::to_value(&record).expect("Failed to serialize Record");
        assert_eq!(back["keywords"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_record_requires_title() {
        let json = r#"{ "link": "https://example.com/a" }"#;
        assert!(serde_json::from_str::<Record>(json).is_err());
    }

    #[test]
    fn test_set_field_routes_to_named_and_extra() {
        let mut record = Record::new("Title", "https://example.com/a");
        record.set_field("description", "desc".to_string());
        record.set_field("content", "body".to_string());

        assert_eq!(record.description.as_deref(), Some("desc"));
        assert_eq!(record.extra["content"], "body");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let date_only = parse_timestamp("2024-01-01");
        let spaced = parse_timestamp("2024-01-01 00:00:00");
        let rfc = parse_timestamp("2024-01-01T00:00:00Z");

        assert_eq!(date_only, 1_704_067_200_000);
        assert_eq!(spaced, date_only);
        assert_eq!(rfc, date_only);
    }

    #[test]
    fn test_parse_timestamp_invalid_is_epoch() {
        assert_eq!(parse_timestamp("yesterday"), 0);
        assert_eq!(parse_timestamp(""), 0);
    }

    #[test]
    fn test_timestamp_of_missing_field_is_epoch() {
        let record = Record::new("Title", "https://example.com/a");
        assert_eq!(record.timestamp_of("pubDate"), 0);
    }
}
