//! Crawler module for listing walks and detail harvesting
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching of listing pages, detail pages and images
//! - HTML parsing for candidate links and detail content
//! - The listing walk with its termination heuristics
//! - Per-item harvesting with retries and enrichment
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod harvester;
mod parser;
mod walker;

pub use coordinator::{run_harvest, Coordinator, HarvestContext, RunOptions, RunSummary};
pub use fetcher::{
    build_http_client, user_agent_string, FetchError, FetchedPage, HttpFetcher, PageFetcher,
};
pub use harvester::DetailHarvester;
pub use parser::{extract_candidates, parse_detail, ParsedDetail};
pub use walker::{ListingWalker, WalkOutcome};
