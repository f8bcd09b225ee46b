//! Detail harvester
//!
//! Fetches one item page with a small fixed-delay retry budget, parses it,
//! downloads its images and runs the result through enrichment. Any failure
//! yields no record; the URL stays unknown to the store and is picked up
//! again by a later run.

use super::fetcher::{FetchError, PageFetcher};
use super::parser::parse_detail;
use crate::config::DetailConfig;
use crate::enrich::{EmbeddedImage, EnrichmentService};
use crate::retry::{RetryGateway, RetryPolicy};
use crate::storage::DetailRecord;
use std::time::Duration;
use url::Url;

/// Harvests single detail pages
pub struct DetailHarvester {
    config: DetailConfig,
    gateway: RetryGateway,
    enrichment: EnrichmentService,
}

impl DetailHarvester {
    pub fn new(config: DetailConfig, enrichment: EnrichmentService) -> Self {
        let policy = RetryPolicy::fixed(config.retries, Duration::from_millis(config.retry_delay_ms));
        Self {
            config,
            gateway: RetryGateway::new(policy),
            enrichment,
        }
    }

    /// Fetches, parses and enriches one item
    ///
    /// Returns None when the page cannot be fetched after retries, is not
    /// found, fails to parse, or fails enrichment.
    pub async fn harvest(&self, fetcher: &dyn PageFetcher, url: &str) -> Option<DetailRecord> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let operation = format!("harvest {}", url);

        let page = match self
            .gateway
            .call(
                &operation,
                || fetcher.fetch(url, None, timeout),
                FetchError::is_transient,
            )
            .await
        {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(url, error = %e, "Detail fetch failed, leaving for a later run");
                return None;
            }
        };

        let base = match Url::parse(&page.url).or_else(|_| Url::parse(url)) {
            Ok(base) => base,
            Err(e) => {
                tracing::warn!(url, error = %e, "Unusable detail URL");
                return None;
            }
        };

        let parsed = match parse_detail(&page.body, &base, &self.config) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(url, error = %e, "Skipping unparseable detail page");
                return None;
            }
        };

        let mut images = Vec::with_capacity(parsed.image_urls.len());
        for image_url in &parsed.image_urls {
            match fetcher.fetch_bytes(image_url, timeout).await {
                Ok(bytes) => images.push(EmbeddedImage {
                    url: image_url.clone(),
                    bytes,
                }),
                Err(e) => tracing::debug!(url = %image_url, error = %e, "Skipping image"),
            }
        }

        let enriched = match self.enrichment.enrich(&parsed.body_text, &images).await {
            Ok(enriched) => enriched,
            Err(e) => {
                tracing::warn!(url, error = %e, "Enrichment failed, leaving for a later run");
                return None;
            }
        };

        let mut record = DetailRecord::new(url, parsed.title, parsed.fields, parsed.body_text);
        record.body_text = enriched.text;
        record.enrichment = enriched.source;
        record.rewritten = enriched.rewritten;

        tracing::debug!(url, source = ?record.enrichment, "Harvested detail page");
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnrichmentConfig;
    use crate::crawler::fetcher::FetchedPage;
    use crate::services::{DocumentUnderstanding, ImagePayload, ServiceError};
    use crate::storage::EnrichmentSource;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails the first `failures` fetches with `error`, then serves `body`
    struct FlakyPage {
        failures: u32,
        error: FetchError,
        body: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PageFetcher for FlakyPage {
        async fn fetch(
            &self,
            url: &str,
            _wait_for: Option<&str>,
            _timeout: Duration,
        ) -> Result<FetchedPage, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(FetchedPage {
                url: url.to_string(),
                status: 200,
                body: self.body.clone(),
            })
        }

        async fn fetch_bytes(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::NotFound {
                url: url.to_string(),
            })
        }
    }

    struct NoOcr;

    #[async_trait]
    impl DocumentUnderstanding for NoOcr {
        async fn ocr(&self, _image: &ImagePayload) -> Result<String, ServiceError> {
            Ok(String::new())
        }
    }

    fn harvester() -> DetailHarvester {
        let config = DetailConfig {
            title_selector: "h1".to_string(),
            body_selector: "div.description".to_string(),
            image_selector: "img[src]".to_string(),
            fields: BTreeMap::new(),
            retries: 2,
            retry_delay_ms: 3000,
            timeout_ms: 1000,
        };
        let enrichment = EnrichmentService::new(
            Arc::new(NoOcr),
            None,
            &EnrichmentConfig::default(),
            RetryGateway::default(),
        );
        DetailHarvester::new(config, enrichment)
    }

    fn flaky(failures: u32, error: FetchError) -> FlakyPage {
        FlakyPage {
            failures,
            error,
            body: r#"<h1>Engineer</h1><div class="description"><p>Write <b>Rust</b></p><img src="/x.png"></div>"#
                .to_string(),
            calls: AtomicU32::new(0),
        }
    }

    fn busy() -> FetchError {
        FetchError::Status {
            url: "https://example.com/job/1".to_string(),
            code: 503,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_harvest_success_after_transient_failures() {
        let fetcher = flaky(2, busy());
        let start = tokio::time::Instant::now();

        let record = harvester()
            .harvest(&fetcher, "https://example.com/job/1")
            .await
            .unwrap();

        assert_eq!(record.url, "https://example.com/job/1");
        assert_eq!(record.title.as_deref(), Some("Engineer"));
        assert_eq!(record.raw_text, "Write\nRust");
        assert_eq!(record.body_text, "Write\nRust");
        assert_eq!(record.enrichment, EnrichmentSource::TextOnly);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_harvest_gives_up_after_two_retries() {
        let fetcher = flaky(10, busy());

        let record = harvester().harvest(&fetcher, "https://example.com/job/1").await;

        assert!(record.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let fetcher = flaky(
            10,
            FetchError::NotFound {
                url: "https://example.com/job/1".to_string(),
            },
        );

        let record = harvester().harvest(&fetcher, "https://example.com/job/1").await;

        assert!(record.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_page_is_skipped() {
        let mut fetcher = flaky(0, busy());
        fetcher.body = "<html><body>No description</body></html>".to_string();

        let record = harvester().harvest(&fetcher, "https://example.com/job/1").await;

        assert!(record.is_none());
    }
}
