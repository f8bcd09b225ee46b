//! Listing walker
//!
//! Pages through the listing strictly in order, one fetch at a time. Each
//! page's candidates are checked against the store in a single batch call and
//! the page's [`PageOutcome`] drives the pure [`CrawlState`] transition that
//! decides when to stop.

use super::fetcher::PageFetcher;
use super::parser::extract_candidates;
use crate::config::ListingConfig;
use crate::state::{CrawlState, PageOutcome, StopReason, Thresholds};
use crate::storage::Storage;
use crate::HarvestError;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// What a walk produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    /// New URLs in discovery order, not yet in the store
    pub urls: Vec<String>,
    pub stop_reason: StopReason,
    pub pages_walked: u32,
    /// Candidates seen across all pages, including known ones
    pub candidates: usize,
    /// Candidates skipped because the store already had them
    pub skipped_existing: usize,
}

/// Walks one listing range
#[derive(Debug, Clone)]
pub struct ListingWalker {
    config: ListingConfig,
    thresholds: Thresholds,
}

impl ListingWalker {
    pub fn new(config: ListingConfig) -> Self {
        let thresholds = Thresholds {
            empty: config.empty_threshold,
            duplicate: config.duplicate_threshold,
            min_sample: config.min_sample,
        };
        Self { config, thresholds }
    }

    /// Walks pages `start_page..=end_page` until a stop condition holds
    ///
    /// A page that fails to fetch or parse counts as an empty page. Only
    /// store errors abort the walk.
    pub async fn walk<S: Storage>(
        &self,
        fetcher: &dyn PageFetcher,
        storage: &S,
        cancel: &CancellationToken,
    ) -> Result<WalkOutcome, HarvestError> {
        let timeout = Duration::from_millis(self.config.page_timeout_ms);
        let delay = Duration::from_millis(self.config.page_delay_ms);

        let mut state = CrawlState::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut outcome = WalkOutcome {
            urls: Vec::new(),
            stop_reason: StopReason::RangeComplete,
            pages_walked: 0,
            candidates: 0,
            skipped_existing: 0,
        };

        for page in self.config.start_page..=self.config.end_page {
            if cancel.is_cancelled() {
                outcome.stop_reason = StopReason::Cancelled;
                break;
            }

            if page > self.config.start_page && !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        outcome.stop_reason = StopReason::Cancelled;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let page_url = self.config.page_url(page);
            outcome.pages_walked += 1;

            let candidates = self.fetch_candidates(fetcher, &page_url, timeout).await;
            let known_in_store = storage.exists_batch(&candidates)?;

            let mut known = 0;
            let mut fresh = 0;
            for url in candidates.iter() {
                if known_in_store.contains(url) {
                    known += 1;
                    outcome.skipped_existing += 1;
                } else if !seen.insert(url.clone()) {
                    // Repeated from an earlier page of this walk
                    known += 1;
                } else {
                    fresh += 1;
                    outcome.urls.push(url.clone());
                }
            }
            outcome.candidates += candidates.len();

            let page_outcome = PageOutcome {
                candidates: candidates.len(),
                known,
            };
            let (next, stop) = state.advance(page_outcome, &self.thresholds);
            state = next;

            info!(
                page,
                candidates = candidates.len(),
                new = fresh,
                known,
                empty_run = state.consecutive_empty_pages,
                duplicate_run = state.consecutive_duplicate_pages,
                "Walked listing page"
            );

            if let Some(reason) = stop {
                outcome.stop_reason = reason;
                break;
            }
        }

        info!(
            pages = outcome.pages_walked,
            new_urls = outcome.urls.len(),
            reason = %outcome.stop_reason,
            "Listing walk finished"
        );

        Ok(outcome)
    }

    /// Fetches a page and extracts its candidates; failures yield none
    async fn fetch_candidates(
        &self,
        fetcher: &dyn PageFetcher,
        page_url: &str,
        timeout: Duration,
    ) -> Vec<String> {
        let page = match fetcher
            .fetch(page_url, self.config.wait_selector.as_deref(), timeout)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(url = page_url, error = %e, "Listing page fetch failed, treating as empty");
                return Vec::new();
            }
        };

        let base = match Url::parse(&page.url).or_else(|_| Url::parse(page_url)) {
            Ok(base) => base,
            Err(e) => {
                warn!(url = page_url, error = %e, "Unusable listing URL");
                return Vec::new();
            }
        };

        match extract_candidates(&page.body, &base, &self.config.link_selector) {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(url = page_url, error = %e, "Listing page parse failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::{FetchError, FetchedPage};
    use crate::storage::{DetailRecord, SqliteStorage};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    /// Serves canned listing pages keyed by page number
    struct FakeListing {
        pages: HashMap<u32, Result<Vec<String>, FetchError>>,
        fetched: Mutex<Vec<u32>>,
    }

    impl FakeListing {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn page(mut self, page: u32, ids: impl IntoIterator<Item = u32>) -> Self {
            let urls = ids
                .into_iter()
                .map(|id| format!("https://example.com/job/{}", id))
                .collect();
            self.pages.insert(page, Ok(urls));
            self
        }

        fn failing(mut self, page: u32) -> Self {
            self.pages.insert(
                page,
                Err(FetchError::Status {
                    url: format!("https://example.com/list?page={}", page),
                    code: 503,
                }),
            );
            self
        }

        fn fetched(&self) -> Vec<u32> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeListing {
        async fn fetch(
            &self,
            url: &str,
            _wait_for: Option<&str>,
            _timeout: Duration,
        ) -> Result<FetchedPage, FetchError> {
            let page: u32 = url.rsplit('=').next().unwrap().parse().unwrap();
            self.fetched.lock().unwrap().push(page);

            let links = match self.pages.get(&page) {
                Some(Ok(urls)) => urls
                    .iter()
                    .map(|u| format!("<a class=\"job\" href=\"{}\">job</a>", u))
                    .collect::<String>(),
                Some(Err(e)) => return Err(e.clone()),
                None => String::new(),
            };

            Ok(FetchedPage {
                url: url.to_string(),
                status: 200,
                body: format!("<html><body>{}</body></html>", links),
            })
        }

        async fn fetch_bytes(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::NotFound {
                url: url.to_string(),
            })
        }
    }

    fn listing(end_page: u32) -> ListingConfig {
        ListingConfig {
            url_template: "https://example.com/list?page={page}".to_string(),
            start_page: 1,
            end_page,
            link_selector: "a.job".to_string(),
            wait_selector: None,
            empty_threshold: 3,
            duplicate_threshold: 3,
            min_sample: 5,
            page_timeout_ms: 1000,
            page_delay_ms: 0,
        }
    }

    fn store_with(ids: impl IntoIterator<Item = u32>) -> SqliteStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for id in ids {
            storage
                .insert(&DetailRecord::new(
                    format!("https://example.com/job/{}", id),
                    None,
                    BTreeMap::new(),
                    "",
                ))
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_stops_after_three_empty_pages() {
        let fetcher = FakeListing::new().page(1, 0..10).page(2, 10..20);
        let storage = store_with([]);

        let outcome = ListingWalker::new(listing(10))
            .walk(&fetcher, &storage, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.urls.len(), 20);
        assert_eq!(outcome.stop_reason, StopReason::ExhaustedEmpty);
        assert_eq!(outcome.pages_walked, 5);
        assert_eq!(fetcher.fetched(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_stops_after_three_known_pages() {
        let fetcher = FakeListing::new()
            .page(1, 100..105)
            .page(2, 0..5)
            .page(3, 5..10)
            .page(4, 10..15)
            .page(5, 200..205);
        let storage = store_with(0..15);

        let outcome = ListingWalker::new(listing(10))
            .walk(&fetcher, &storage, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::ExhaustedDuplicate);
        assert_eq!(fetcher.fetched(), vec![1, 2, 3, 4]);
        assert_eq!(outcome.urls.len(), 5);
        assert_eq!(outcome.skipped_existing, 15);
    }

    #[tokio::test]
    async fn test_small_known_pages_do_not_count_as_duplicates() {
        // Fully known, but below the minimum sample of 5
        let fetcher = FakeListing::new()
            .page(1, 0..4)
            .page(2, 0..4)
            .page(3, 0..4)
            .page(4, 0..4);
        let storage = store_with(0..4);

        let outcome = ListingWalker::new(listing(4))
            .walk(&fetcher, &storage, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::RangeComplete);
        assert!(outcome.urls.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failures_count_as_empty() {
        let fetcher = FakeListing::new()
            .page(1, 0..6)
            .failing(2)
            .failing(3)
            .page(4, 6..12)
            .failing(5)
            .failing(6)
            .failing(7);
        let storage = store_with([]);

        let outcome = ListingWalker::new(listing(10))
            .walk(&fetcher, &storage, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.urls.len(), 12);
        assert_eq!(outcome.stop_reason, StopReason::ExhaustedEmpty);
        assert_eq!(fetcher.fetched(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_range_complete_and_repeat_urls_within_walk() {
        let fetcher = FakeListing::new().page(1, 0..6).page(2, 3..9);
        let storage = store_with([]);

        let outcome = ListingWalker::new(listing(2))
            .walk(&fetcher, &storage, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::RangeComplete);
        assert_eq!(outcome.urls.len(), 9);
        assert_eq!(outcome.candidates, 12);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let fetcher = FakeListing::new().page(1, 0..6);
        let storage = store_with([]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = ListingWalker::new(listing(3))
            .walk(&fetcher, &storage, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert_eq!(outcome.pages_walked, 0);
        assert!(fetcher.fetched().is_empty());
    }
}
