//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics and recent records from the storage layer.

use crate::storage::{DetailRecord, EnrichmentSource, RunRecord, Storage};
use crate::HarvestError;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Records not yet re-scored
    pub unmatched: u64,

    /// Records whose body includes OCR output
    pub ocr_augmented: u64,

    /// Records the scorer recommended
    pub recommended: u64,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl HarvestStatistics {
    pub fn checked(&self) -> u64 {
        self.total_records.saturating_sub(self.unmatched)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics, HarvestError> {
    Ok(HarvestStatistics {
        total_records: storage.count_total_records()?,
        unmatched: storage.count_unmatched()?,
        ocr_augmented: storage.count_by_enrichment(EnrichmentSource::OcrAugmented)?,
        recommended: storage.count_recommended()?,
        latest_run: storage.get_latest_run()?,
    })
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Records:");
    println!("  Total harvested: {}", stats.total_records);
    println!(
        "  Checked: {} ({:.1}%)",
        stats.checked(),
        percentage(stats.checked(), stats.total_records)
    );
    println!("  Awaiting re-scoring: {}", stats.unmatched);
    println!(
        "  OCR-augmented: {} ({:.1}%)",
        stats.ocr_augmented,
        percentage(stats.ocr_augmented, stats.total_records)
    );
    println!(
        "  Recommended: {} ({:.1}% of checked)",
        stats.recommended,
        percentage(stats.recommended, stats.checked())
    );
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run (#{}):", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            if let Some(reason) = &run.stop_reason {
                println!("  Stop reason: {}", reason);
            }
            println!("  Pages walked: {}", run.pages_walked);
            println!("  Harvested: {}", run.harvested);
            println!("  Re-scored: {}", run.rescored);
        }
        None => println!("No harvest runs recorded yet"),
    }
}

/// Formats one record as a single summary line
pub fn format_record_line(record: &DetailRecord) -> String {
    let title = record.title.as_deref().unwrap_or("(untitled)");
    let verdict = match &record.assessment {
        Some(m) if m.recommend => format!("recommended, score {:.0}", m.score),
        Some(m) => format!("score {:.0}", m.score),
        None => "unscored".to_string(),
    };
    format!(
        "[{}] {} - {} ({}, {})",
        record.harvested_at.format("%Y-%m-%d %H:%M"),
        title,
        record.url,
        record.enrichment.to_db_string(),
        verdict
    )
}

/// Prints the most recently harvested records, newest first
pub fn print_recent(records: &[DetailRecord]) {
    println!("=== Recent Records ({}) ===\n", records.len());
    for record in records {
        println!("{}", format_record_line(record));
        if let Some(m) = &record.assessment {
            if !m.reason.is_empty() {
                println!("    {}", m.reason);
            }
        }
    }
}
