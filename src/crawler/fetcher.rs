//! HTTP fetcher implementation
//!
//! This module handles all page requests for the harvester, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for listing and detail pages
//! - Optional wait conditions (a CSS selector that must be present)
//! - Raw downloads of embedded images
//! - Error classification

use crate::config::UserAgentConfig;
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;

/// A fetched HTML document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Page body content
    pub body: String,
}

/// Failure of a page fetch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {code} from {url}")]
    Status { url: String, code: u16 },

    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("wait condition {selector:?} not met at {url}")]
    ConditionNotMet { url: String, selector: String },
}

impl FetchError {
    /// Timeouts, connection failures, 429 and 5xx may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Status { code, .. } => *code == 429 || *code >= 500,
            Self::NotFound { .. } | Self::ConditionNotMet { .. } => false,
        }
    }
}

impl From<FetchError> for HarvestError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout { url } => HarvestError::TransientNetwork {
                url,
                message: "timeout".to_string(),
            },
            FetchError::Network { url, message } => HarvestError::TransientNetwork { url, message },
            FetchError::Status { url, code } if code == 429 => HarvestError::RateLimited { service: url },
            FetchError::Status { url, code } if code >= 500 => HarvestError::TransientNetwork {
                url,
                message: format!("HTTP {}", code),
            },
            FetchError::Status { url, code } => HarvestError::Malformed {
                url,
                message: format!("HTTP {}", code),
            },
            FetchError::NotFound { url } => HarvestError::NotFound { url },
            FetchError::ConditionNotMet { url, selector } => HarvestError::Parse {
                url,
                message: format!("no element matches {}", selector),
            },
        }
    }
}

/// Source of listing and detail pages
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches an HTML document
    ///
    /// When `wait_for` is set, the document must contain an element matching
    /// that CSS selector, otherwise the fetch fails with `ConditionNotMet`.
    async fn fetch(
        &self,
        url: &str,
        wait_for: Option<&str>,
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError>;

    /// Downloads a raw resource such as an embedded image
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// Formats the crawler's user agent
///
/// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::UserAgentConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`PageFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                code: status.as_u16(),
            });
        }

        Ok(response)
    }
}

fn classify_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_connect() {
        FetchError::Network {
            url: url.to_string(),
            message: "connection refused".to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Returns true if `selector` matches anything in `html`
///
/// An unparseable selector never matches.
fn condition_met(html: &str, selector: &str) -> bool {
    let selector = match Selector::parse(selector) {
        Ok(selector) => selector,
        Err(_) => return false,
    };
    let document = Html::parse_document(html);
    let found = document.select(&selector).next().is_some();
    found
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        wait_for: Option<&str>,
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError> {
        let response = self.get(url, timeout).await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let body = response.text().await.map_err(|e| classify_error(url, e))?;

        if let Some(selector) = wait_for {
            if !condition_met(&body, selector) {
                return Err(FetchError::ConditionNotMet {
                    url: url.to_string(),
                    selector: selector.to_string(),
                });
            }
        }

        Ok(FetchedPage {
            url: final_url,
            status,
            body,
        })
    }

    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url, timeout).await?;
        let bytes = response.bytes().await.map_err(|e| classify_error(url, e))?;
        Ok(bytes.to_vec())
    }
}
