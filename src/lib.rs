//! Sumi-Harvest: an incremental listing harvester
//!
//! This crate walks paginated listing pages, harvests each detail page at most
//! once, enriches embedded images through a size-limited document
//! understanding service, and periodically re-scores unmatched records
//! against a profile.

pub mod config;
pub mod crawler;
pub mod enrich;
pub mod output;
pub mod retry;
pub mod scoring;
pub mod services;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transient network failure for {url}: {message}")]
    TransientNetwork { url: String, message: String },

    #[error("Rate limited by {service}")]
    RateLimited { service: String },

    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Malformed content at {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("Parse failure for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("External service {service} unavailable: {message}")]
    ServiceUnavailable { service: String, message: String },

    #[error("External service {service} rejected the request: {message}")]
    ServiceRejected { service: String, message: String },

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true if retrying the failed operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork { .. } | Self::RateLimited { .. } | Self::ServiceUnavailable { .. }
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, RunSummary};
pub use state::{CrawlState, StopReason};
pub use url::normalize_url;
