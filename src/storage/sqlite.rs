//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::RunSummary;
use crate::scoring::MatchResult;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{DetailRecord, EnrichmentSource, RunRecord, RunStatus};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Upper bound on bound parameters per `IN (...)` query
const EXISTS_CHUNK: usize = 500;

const RECORD_COLUMNS: &str = "id, url, title, fields, raw_text, body_text, enrichment, rewritten,
     harvested_at, checked, checked_at, score, reason, strength, weakness, recommend";

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, stop_reason, pages_walked, harvested, rescored";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_timestamp(index: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .map_err(|e| conversion_error(index, e))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DetailRecord> {
    let id: i64 = row.get(0)?;
    let fields_json: String = row.get(3)?;
    let fields: BTreeMap<String, String> =
        serde_json::from_str(&fields_json).map_err(|e| conversion_error(3, e))?;
    let enrichment: String = row.get(6)?;
    let harvested_at: String = row.get(8)?;
    let checked_at: Option<String> = row.get(10)?;
    let score: Option<f64> = row.get(11)?;

    let assessment = match score {
        Some(score) => Some(MatchResult {
            id,
            score,
            reason: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
            strength: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
            weakness: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
            recommend: row.get::<_, Option<bool>>(15)?.unwrap_or(false),
        }),
        None => None,
    };

    Ok(DetailRecord {
        id: Some(id),
        url: row.get(1)?,
        title: row.get(2)?,
        fields,
        raw_text: row.get(4)?,
        body_text: row.get(5)?,
        enrichment: EnrichmentSource::from_db_string(&enrichment)
            .unwrap_or(EnrichmentSource::TextOnly),
        rewritten: row.get(7)?,
        harvested_at: parse_timestamp(8, &harvested_at)?,
        checked: row.get(9)?,
        checked_at: checked_at
            .as_deref()
            .map(|s| parse_timestamp(10, s))
            .transpose()?,
        assessment,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        stop_reason: row.get(5)?,
        pages_walked: row.get(6)?,
        harvested: row.get(7)?,
        rescored: row.get(8)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, stop_reason = ?3, pages_walked = ?4,
             candidates = ?5, harvested = ?6, failed = ?7, rescored = ?8 WHERE id = ?9",
            params![
                status.to_db_string(),
                now,
                summary.stop_reason.map(|r| r.to_db_string()),
                summary.pages_walked,
                summary.candidates as i64,
                summary.harvested,
                summary.failed,
                summary.rescored as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Dedup =====

    fn exists_batch(&self, urls: &[String]) -> StorageResult<HashSet<String>> {
        let mut known = HashSet::new();

        for chunk in urls.chunks(EXISTS_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT url FROM records WHERE url IN ({})",
                placeholders
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?;
            for row in rows {
                known.insert(row?);
            }
        }

        Ok(known)
    }

    fn insert(&mut self, record: &DetailRecord) -> StorageResult<Option<i64>> {
        let fields = serde_json::to_string(&record.fields)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO records
             (url, title, fields, raw_text, body_text, enrichment, rewritten, harvested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.url,
                record.title,
                fields,
                record.raw_text,
                record.body_text,
                record.enrichment.to_db_string(),
                record.rewritten,
                record.harvested_at.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    fn get_record(&self, id: i64) -> StorageResult<DetailRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLUMNS),
                params![id],
                record_from_row,
            )
            .optional()?
            .ok_or(StorageError::RecordNotFound(id))
    }

    // ===== Re-scoring =====

    fn count_unmatched(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM records WHERE checked = 0", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn get_unmatched(&self, limit: usize) -> StorageResult<Vec<DetailRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM records WHERE checked = 0 ORDER BY id ASC LIMIT ?1",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![limit as i64], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn commit_batch(&mut self, results: &[MatchResult], ids: &[i64]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        for result in results {
            tx.execute(
                "UPDATE records SET score = ?1, reason = ?2, strength = ?3, weakness = ?4,
                 recommend = ?5 WHERE id = ?6",
                params![
                    result.score,
                    result.reason,
                    result.strength,
                    result.weakness,
                    result.recommend,
                    result.id
                ],
            )?;
        }

        for id in ids {
            tx.execute(
                "UPDATE records SET checked = 1, checked_at = ?1 WHERE id = ?2 AND checked = 0",
                params![now, id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_recent(&self, limit: usize) -> StorageResult<Vec<DetailRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM records ORDER BY harvested_at DESC, id DESC LIMIT ?1",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![limit as i64], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== Statistics =====

    fn count_total_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_by_enrichment(&self, source: EnrichmentSource) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE enrichment = ?1",
            params![source.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_recommended(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE recommend = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
