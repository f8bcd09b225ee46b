//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types. The pipeline only ever reaches persisted state
//! through [`Storage`].

use crate::crawler::RunSummary;
use crate::scoring::MatchResult;
use crate::storage::{DetailRecord, EnrichmentSource, RunRecord, RunStatus};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    RecordNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This is the single authority for "already harvested": a URL is known
/// once a record with that canonical URL has been inserted.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Records the outcome of a run with a finish timestamp
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StorageResult<()>;

    // ===== Dedup =====

    /// Returns the subset of `urls` that already have a record
    ///
    /// One round trip per call; repeated or overlapping calls give the same
    /// answer as long as nothing is inserted in between.
    fn exists_batch(&self, urls: &[String]) -> StorageResult<HashSet<String>>;

    /// Persists a record for the first time
    ///
    /// Returns the new ID, or None if a record with the same URL already
    /// exists (the existing record is left untouched).
    fn insert(&mut self, record: &DetailRecord) -> StorageResult<Option<i64>>;

    /// Gets a record by ID
    fn get_record(&self, id: i64) -> StorageResult<DetailRecord>;

    // ===== Re-scoring =====

    /// Counts records that have not been checked yet
    fn count_unmatched(&self) -> StorageResult<u64>;

    /// Gets up to `limit` unchecked records in ascending ID order
    fn get_unmatched(&self, limit: usize) -> StorageResult<Vec<DetailRecord>>;

    /// Commits one scored batch in a single transaction
    ///
    /// Writes scorer output onto the matching records and flags every ID in
    /// `ids` as checked, so they never appear in unmatched batches again.
    /// Either all of it lands or none of it does.
    fn commit_batch(&mut self, results: &[MatchResult], ids: &[i64]) -> StorageResult<()>;

    /// Gets the most recently harvested records, newest first
    fn get_recent(&self, limit: usize) -> StorageResult<Vec<DetailRecord>>;

    // ===== Statistics =====

    /// Gets total record count
    fn count_total_records(&self) -> StorageResult<u64>;

    /// Counts records by enrichment provenance
    fn count_by_enrichment(&self, source: EnrichmentSource) -> StorageResult<u64>;

    /// Counts records the scorer recommended
    fn count_recommended(&self) -> StorageResult<u64>;
}
