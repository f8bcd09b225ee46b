//! Re-scoring of harvested records against a profile
//!
//! Records are harvested unchecked. The [`BatchScheduler`] later feeds them to
//! a [`MatchScorer`](crate::services::MatchScorer) in bounded batches, writes
//! the [`MatchResult`]s back and flips each record to checked.

mod scheduler;

pub use scheduler::{BatchReport, BatchScheduler, BatchStop};

use serde::{Deserialize, Serialize};

/// Scorer output for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// ID of the record this result applies to
    pub id: i64,
    pub score: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub strength: String,
    #[serde(default)]
    pub weakness: String,
    #[serde(default)]
    pub recommend: bool,
}

/// Progress of one scheduler invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    /// Unmatched records counted when the run started
    pub total_unmatched: u64,
    /// Records committed so far; never decreases
    pub total_processed: usize,
    /// Number of the batch being processed (1-based, 0 before the first)
    pub batch_number: u32,
}
