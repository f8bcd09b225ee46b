//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    stop_reason TEXT,
    pages_walked INTEGER NOT NULL DEFAULT 0,
    candidates INTEGER NOT NULL DEFAULT 0,
    harvested INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    rescored INTEGER NOT NULL DEFAULT 0
);

-- Harvested records, one per canonical URL
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT,
    fields TEXT NOT NULL DEFAULT '{}',
    raw_text TEXT NOT NULL,
    body_text TEXT NOT NULL,
    enrichment TEXT NOT NULL,
    rewritten INTEGER NOT NULL DEFAULT 0,
    harvested_at TEXT NOT NULL,
    checked INTEGER NOT NULL DEFAULT 0,
    checked_at TEXT,
    score REAL,
    reason TEXT,
    strength TEXT,
    weakness TEXT,
    recommend INTEGER
);

CREATE INDEX IF NOT EXISTS idx_records_checked ON records(checked, id);
CREATE INDEX IF NOT EXISTS idx_records_harvested ON records(harvested_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
