//! State module for tracking listing walk progress
//!
//! # Components
//!
//! - `CrawlState`: consecutive empty/duplicate page counters for one walk
//! - `PageOutcome`: what a single listing page contributed
//! - `StopReason`: why the walk ended

mod crawl_state;

// Re-export main types
pub use crawl_state::{CrawlState, PageOutcome, StopReason, Thresholds};
