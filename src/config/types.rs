use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub listing: ListingConfig,
    pub detail: DetailConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub services: ServicesConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Listing pagination and termination heuristics
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Listing URL with a `{page}` placeholder
    #[serde(rename = "url-template")]
    pub url_template: String,

    /// First page number to fetch (inclusive)
    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    /// Last page number to fetch (inclusive)
    #[serde(rename = "end-page")]
    pub end_page: u32,

    /// CSS selector matching item links on a listing page
    #[serde(rename = "link-selector")]
    pub link_selector: String,

    /// Optional CSS selector that must be present before a page counts as loaded
    #[serde(rename = "wait-selector", default)]
    pub wait_selector: Option<String>,

    /// Consecutive pages without candidates before the walk stops
    #[serde(rename = "empty-threshold", default = "default_threshold")]
    pub empty_threshold: u32,

    /// Consecutive fully-known pages before the walk stops
    #[serde(rename = "duplicate-threshold", default = "default_threshold")]
    pub duplicate_threshold: u32,

    /// Minimum candidates on a page for it to count as a duplicate page
    #[serde(rename = "min-sample", default = "default_min_sample")]
    pub min_sample: usize,

    /// Listing page fetch timeout (milliseconds)
    #[serde(rename = "page-timeout-ms", default = "default_timeout_ms")]
    pub page_timeout_ms: u64,

    /// Pause between listing page fetches (milliseconds)
    #[serde(rename = "page-delay-ms", default)]
    pub page_delay_ms: u64,
}

/// Detail page extraction and retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct DetailConfig {
    /// CSS selector for the item title
    #[serde(rename = "title-selector", default = "default_title_selector")]
    pub title_selector: String,

    /// CSS selector for the item body
    #[serde(rename = "body-selector")]
    pub body_selector: String,

    /// CSS selector for embedded images, evaluated inside the body
    #[serde(rename = "image-selector", default = "default_image_selector")]
    pub image_selector: String,

    /// Named structured fields (name -> CSS selector)
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Retries after the first failed attempt
    #[serde(default = "default_detail_retries")]
    pub retries: u32,

    /// Fixed delay between detail retries (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_detail_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Detail page fetch timeout (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Image tiling and enrichment settings
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    /// Byte-size ceiling of the document understanding service
    #[serde(rename = "max-image-bytes", default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    /// Width ceiling that triggers tiling
    #[serde(rename = "max-image-width", default = "default_max_image_dimension")]
    pub max_image_width: u32,

    /// Height ceiling that triggers tiling
    #[serde(rename = "max-image-height", default = "default_max_image_dimension")]
    pub max_image_height: u32,

    /// Maximum tile width
    #[serde(rename = "tile-width", default = "default_tile_dimension")]
    pub tile_width: u32,

    /// Maximum tile height
    #[serde(rename = "tile-height", default = "default_tile_dimension")]
    pub tile_height: u32,

    /// Shared band between vertically stacked tiles (pixels)
    #[serde(rename = "tile-overlap", default = "default_tile_overlap")]
    pub tile_overlap: u32,

    /// Maximum concurrent OCR calls for one image
    #[serde(rename = "ocr-concurrency", default = "default_ocr_concurrency")]
    pub ocr_concurrency: usize,

    /// Whether to attempt the readability rewrite
    #[serde(default = "default_true")]
    pub rewrite: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: default_max_image_bytes(),
            max_image_width: default_max_image_dimension(),
            max_image_height: default_max_image_dimension(),
            tile_width: default_tile_dimension(),
            tile_height: default_tile_dimension(),
            tile_overlap: default_tile_overlap(),
            ocr_concurrency: default_ocr_concurrency(),
            rewrite: true,
        }
    }
}

/// Backoff bounds shared by every rate-limited external call
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(rename = "initial-backoff-ms", default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Batch re-scoring settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Whether the crawl run re-scores unmatched records after harvesting
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches (milliseconds)
    #[serde(rename = "cooldown-ms", default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Path to the profile text records are scored against
    #[serde(rename = "profile-path", default)]
    pub profile_path: Option<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: default_batch_size(),
            cooldown_ms: default_cooldown_ms(),
            profile_path: None,
        }
    }
}

/// External service endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(rename = "ocr-endpoint")]
    pub ocr_endpoint: String,

    #[serde(rename = "rewrite-endpoint")]
    pub rewrite_endpoint: String,

    #[serde(rename = "scorer-endpoint")]
    pub scorer_endpoint: String,

    /// Name of the environment variable holding the bearer token
    #[serde(rename = "api-key-env", default)]
    pub api_key_env: Option<String>,

    /// Request timeout for service calls (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_service_timeout_ms")]
    pub timeout_ms: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_start_page() -> u32 {
    1
}

fn default_threshold() -> u32 {
    3
}

fn default_min_sample() -> usize {
    5
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_title_selector() -> String {
    "h1".to_string()
}

fn default_image_selector() -> String {
    "img[src]".to_string()
}

fn default_detail_retries() -> u32 {
    2
}

fn default_detail_retry_delay_ms() -> u64 {
    3_000
}

fn default_max_image_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_max_image_dimension() -> u32 {
    4_000
}

fn default_tile_dimension() -> u32 {
    2_000
}

fn default_tile_overlap() -> u32 {
    50
}

fn default_ocr_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    2_000
}

fn default_max_backoff_ms() -> u64 {
    15_000
}

fn default_batch_size() -> usize {
    10
}

fn default_cooldown_ms() -> u64 {
    3_000
}

fn default_service_timeout_ms() -> u64 {
    120_000
}

fn default_true() -> bool {
    true
}
