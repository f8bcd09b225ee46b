//! Harvest coordinator - main run orchestration logic
//!
//! This module composes one harvest run:
//! - Recording the run in storage
//! - Walking the listing for new URLs
//! - Harvesting and enriching each new item, inserting it once
//! - Re-scoring unmatched records in batches
//! - Recording the run's outcome
//!
//! All collaborators come in through an explicit [`HarvestContext`] built
//! once at start-up.

use crate::config::Config;
use crate::crawler::fetcher::{HttpFetcher, PageFetcher};
use crate::crawler::harvester::DetailHarvester;
use crate::crawler::walker::ListingWalker;
use crate::enrich::EnrichmentService;
use crate::retry::{RetryGateway, RetryPolicy};
use crate::scoring::{BatchScheduler, BatchStop};
use crate::services::{
    DocumentUnderstanding, HttpDocumentUnderstanding, HttpMatchScorer, HttpTextQuality,
    MatchScorer, ServiceClient, TextQuality,
};
use crate::state::StopReason;
use crate::storage::{RunStatus, SqliteStorage, Storage};
use crate::HarvestError;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// External collaborators for one process
#[derive(Clone)]
pub struct HarvestContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub ocr: Arc<dyn DocumentUnderstanding>,
    pub rewriter: Arc<dyn TextQuality>,
    pub scorer: Arc<dyn MatchScorer>,
}

impl HarvestContext {
    /// Builds the HTTP-backed collaborators from configuration
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let fetcher = HttpFetcher::new(&config.user_agent)?;
        let client = ServiceClient::from_config(&config.services, &config.user_agent)?;

        Ok(Self {
            fetcher: Arc::new(fetcher),
            ocr: Arc::new(HttpDocumentUnderstanding::new(
                client.clone(),
                config.services.ocr_endpoint.clone(),
            )),
            rewriter: Arc::new(HttpTextQuality::new(
                client.clone(),
                config.services.rewrite_endpoint.clone(),
            )),
            scorer: Arc::new(HttpMatchScorer::new(
                client,
                config.services.scorer_endpoint.clone(),
            )),
        })
    }
}

/// Which phases a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub harvest: bool,
    pub rescore: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            harvest: true,
            rescore: true,
        }
    }
}

/// Counts for one run, persisted to the run's row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: i64,
    pub pages_walked: u32,
    /// Why the listing walk ended; None when the walk was skipped
    pub stop_reason: Option<StopReason>,
    pub candidates: usize,
    /// Records inserted for the first time
    pub harvested: u32,
    /// Candidates the store already had
    pub skipped_existing: usize,
    /// New URLs that could not be harvested this run
    pub failed: u32,
    /// Records re-scored and marked checked
    pub rescored: usize,
}

/// Main harvest coordinator structure
pub struct Coordinator<S: Storage> {
    config: Config,
    storage: S,
    context: HarvestContext,
    cancel: CancellationToken,
    config_hash: String,
}

impl<S: Storage> Coordinator<S> {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The harvester configuration
    /// * `storage` - The store for records and runs
    /// * `context` - External collaborators
    /// * `config_hash` - Hash of the configuration, recorded with the run
    pub fn new(config: Config, storage: S, context: HarvestContext, config_hash: impl Into<String>) -> Self {
        Self {
            config,
            storage,
            context,
            cancel: CancellationToken::new(),
            config_hash: config_hash.into(),
        }
    }

    /// Uses an externally controlled cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Runs one harvest and records its outcome
    ///
    /// On error the run is recorded as failed with whatever was counted up
    /// to that point; records already inserted stay.
    pub async fn run(&mut self, options: RunOptions) -> Result<RunSummary, HarvestError> {
        let run_id = self.storage.create_run(&self.config_hash)?;
        tracing::info!("Starting harvest run {}", run_id);

        let mut summary = RunSummary {
            run_id,
            ..RunSummary::default()
        };

        let result = self.execute(options, &mut summary).await;

        let status = match &result {
            Ok(()) if self.cancel.is_cancelled() => RunStatus::Cancelled,
            Ok(()) => RunStatus::Completed,
            Err(_) => RunStatus::Failed,
        };
        self.storage.finish_run(run_id, status, &summary)?;

        match result {
            Ok(()) => {
                tracing::info!(
                    run_id,
                    status = status.to_db_string(),
                    pages = summary.pages_walked,
                    harvested = summary.harvested,
                    failed = summary.failed,
                    rescored = summary.rescored,
                    "Harvest run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(run_id, error = %e, "Harvest run failed");
                Err(e)
            }
        }
    }

    async fn execute(&mut self, options: RunOptions, summary: &mut RunSummary) -> Result<(), HarvestError> {
        if options.harvest {
            self.harvest_new(summary).await?;
        }

        if options.rescore && self.config.scoring.enabled && !self.cancel.is_cancelled() {
            self.rescore(summary).await?;
        }

        Ok(())
    }

    async fn harvest_new(&mut self, summary: &mut RunSummary) -> Result<(), HarvestError> {
        let walker = ListingWalker::new(self.config.listing.clone());
        let walk = walker
            .walk(self.context.fetcher.as_ref(), &self.storage, &self.cancel)
            .await?;

        summary.pages_walked = walk.pages_walked;
        summary.stop_reason = Some(walk.stop_reason);
        summary.candidates = walk.candidates;
        summary.skipped_existing = walk.skipped_existing;

        if walk.urls.is_empty() {
            return Ok(());
        }

        let gateway = RetryGateway::new(RetryPolicy::from_config(&self.config.retry));
        let rewriter = self
            .config
            .enrichment
            .rewrite
            .then(|| Arc::clone(&self.context.rewriter));
        let enrichment = EnrichmentService::new(
            Arc::clone(&self.context.ocr),
            rewriter,
            &self.config.enrichment,
            gateway,
        );
        let harvester = DetailHarvester::new(self.config.detail.clone(), enrichment);

        tracing::info!("Harvesting {} new items", walk.urls.len());

        for (done, url) in walk.urls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!("Cancelled, {} items left unharvested", walk.urls.len() - done);
                break;
            }

            match harvester.harvest(self.context.fetcher.as_ref(), url).await {
                Some(record) => match self.storage.insert(&record)? {
                    Some(id) => {
                        summary.harvested += 1;
                        tracing::debug!(id, url = %url, "Stored record");
                    }
                    None => {
                        summary.skipped_existing += 1;
                        tracing::debug!(url = %url, "Record already stored");
                    }
                },
                None => summary.failed += 1,
            }
        }

        Ok(())
    }

    async fn rescore(&mut self, summary: &mut RunSummary) -> Result<(), HarvestError> {
        let Some(profile_path) = self.config.scoring.profile_path.clone() else {
            tracing::warn!("No scoring profile configured, skipping re-scoring");
            return Ok(());
        };
        let profile = std::fs::read_to_string(&profile_path)?;

        let scheduler = BatchScheduler::from_config(&self.config.scoring, &self.config.retry);
        let report = scheduler
            .run(&mut self.storage, self.context.scorer.as_ref(), &profile, &self.cancel)
            .await?;

        summary.rescored = report.progress.total_processed;
        if let BatchStop::ScorerFailed(reason) = &report.stop {
            tracing::warn!("Re-scoring stopped early: {}", reason);
        }

        Ok(())
    }
}

/// Opens the configured database, builds HTTP collaborators and runs once
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::load_config_with_hash;
/// use sumi_harvest::crawler::{run_harvest, RunOptions};
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let summary = run_harvest(config, hash, RunOptions::default(), CancellationToken::new()).await?;
/// println!("Harvested {} records", summary.harvested);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(
    config: Config,
    config_hash: String,
    options: RunOptions,
    cancel: CancellationToken,
) -> Result<RunSummary, HarvestError> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let context = HarvestContext::from_config(&config)?;
    let mut coordinator =
        Coordinator::new(config, storage, context, config_hash).with_cancellation(cancel);
    coordinator.run(options).await
}
