//! Output module for harvest statistics and record listings
//!
//! This module handles:
//! - Aggregating record and run counts from storage
//! - Printing statistics and recently harvested records

pub mod stats;

pub use stats::{
    format_record_line, load_statistics, print_recent, print_statistics, HarvestStatistics,
};
