//! Storage module for persisting harvested records
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - The dedup check ("has this URL been harvested before?")
//! - First-time insertion of enriched records
//! - Unmatched record batches and match results for re-scoring
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::scoring::MatchResult;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// How a record's body text was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnrichmentSource {
    /// Only text extracted directly from the page
    TextOnly,
    /// Page text plus OCR output of embedded images
    OcrAugmented,
}

impl EnrichmentSource {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::TextOnly => "text-only",
            Self::OcrAugmented => "ocr-augmented",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "text-only" => Some(Self::TextOnly),
            "ocr-augmented" => Some(Self::OcrAugmented),
            _ => None,
        }
    }
}

/// One harvested item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRecord {
    /// Database ID, None until first persisted
    pub id: Option<i64>,

    /// Canonical source URL; the dedup key
    pub url: String,

    pub title: Option<String>,

    /// Structured fields extracted by configured selectors
    pub fields: BTreeMap<String, String>,

    /// Body text as extracted from the page
    pub raw_text: String,

    /// Cleaned, OCR-augmented and possibly rewritten body text
    pub body_text: String,

    pub enrichment: EnrichmentSource,

    /// Whether the external rewrite succeeded for `body_text`
    pub rewritten: bool,

    pub harvested_at: DateTime<Utc>,

    /// Set once the record has been re-scored
    pub checked: bool,

    pub checked_at: Option<DateTime<Utc>>,

    /// Scorer output applied to this record
    pub assessment: Option<MatchResult>,
}

impl DetailRecord {
    /// Creates an unenriched, unpersisted record
    pub fn new(
        url: impl Into<String>,
        title: Option<String>,
        fields: BTreeMap<String, String>,
        raw_text: impl Into<String>,
    ) -> Self {
        let raw_text = raw_text.into();
        Self {
            id: None,
            url: url.into(),
            title,
            fields,
            body_text: raw_text.clone(),
            raw_text,
            enrichment: EnrichmentSource::TextOnly,
            rewritten: false,
            harvested_at: Utc::now(),
            checked: false,
            checked_at: None,
            assessment: None,
        }
    }
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub stop_reason: Option<String>,
    pub pages_walked: u32,
    pub harvested: u32,
    pub rescored: u32,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Cancelled,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
        assert_eq!(EnrichmentSource::from_db_string("invalid"), None);
    }

    #[test]
    fn test_new_record_starts_unchecked_text_only() {
        let record = DetailRecord::new("https://example.com/job/1", None, BTreeMap::new(), "body");
        assert_eq!(record.id, None);
        assert_eq!(record.body_text, "body");
        assert_eq!(record.enrichment, EnrichmentSource::TextOnly);
        assert!(!record.checked);
        assert!(record.assessment.is_none());
    }
}
