//! Batch enrichment scheduler
//!
//! Batches are strictly sequential: fetch the next `batch_size` unchecked
//! records in ascending ID order, score them through the retry gateway,
//! commit, cool down, repeat. A short batch is the last one. A scorer failure
//! ends the run; batches committed before it stay committed.

use super::{BatchProgress, MatchResult};
use crate::config::{RetryConfig, ScoringConfig};
use crate::retry::{RetryGateway, RetryPolicy};
use crate::services::{MatchScorer, ServiceError};
use crate::storage::Storage;
use crate::HarvestError;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a scheduler run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStop {
    /// There were no unmatched records
    NothingToDo,
    /// A batch came back shorter than the batch size (or empty)
    Exhausted,
    /// The scorer failed; remaining batches were skipped
    ScorerFailed(String),
    /// Cancellation was requested before the next batch
    Cancelled,
}

/// Result of one scheduler run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub progress: BatchProgress,
    pub stop: BatchStop,
}

/// Re-scores unmatched records in bounded batches
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    cooldown: Duration,
    gateway: RetryGateway,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, cooldown: Duration, gateway: RetryGateway) -> Self {
        Self {
            batch_size: batch_size.max(1),
            cooldown,
            gateway,
        }
    }

    pub fn from_config(scoring: &ScoringConfig, retry: &RetryConfig) -> Self {
        Self::new(
            scoring.batch_size,
            Duration::from_millis(scoring.cooldown_ms),
            RetryGateway::new(RetryPolicy::from_config(retry)),
        )
    }

    /// Runs batches until exhaustion, scorer failure or cancellation
    ///
    /// Storage errors propagate; scorer errors are reported in the
    /// returned [`BatchReport`].
    pub async fn run<S: Storage>(
        &self,
        storage: &mut S,
        scorer: &dyn MatchScorer,
        profile: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, HarvestError> {
        let mut progress = BatchProgress {
            total_unmatched: storage.count_unmatched()?,
            ..BatchProgress::default()
        };

        if progress.total_unmatched == 0 {
            info!("No unmatched records to score");
            return Ok(BatchReport {
                progress,
                stop: BatchStop::NothingToDo,
            });
        }

        info!(
            unmatched = progress.total_unmatched,
            batch_size = self.batch_size,
            "Starting re-scoring"
        );

        loop {
            if cancel.is_cancelled() {
                info!(processed = progress.total_processed, "Re-scoring cancelled");
                return Ok(BatchReport {
                    progress,
                    stop: BatchStop::Cancelled,
                });
            }

            let batch = storage.get_unmatched(self.batch_size)?;
            if batch.is_empty() {
                return Ok(BatchReport {
                    progress,
                    stop: BatchStop::Exhausted,
                });
            }

            progress.batch_number += 1;
            let operation = format!("score batch {}", progress.batch_number);
            debug!(batch = progress.batch_number, size = batch.len(), "Scoring batch");

            let scored = self
                .gateway
                .call(
                    &operation,
                    || scorer.score(profile, &batch),
                    ServiceError::is_retryable,
                )
                .await;

            let results = match scored {
                Ok(results) => results,
                Err(e) => {
                    let err = e.into_harvest_error("scorer");
                    warn!(batch = progress.batch_number, error = %err, "Scorer failed, stopping re-scoring");
                    return Ok(BatchReport {
                        progress,
                        stop: BatchStop::ScorerFailed(err.to_string()),
                    });
                }
            };

            let ids: Vec<i64> = batch.iter().filter_map(|r| r.id).collect();
            let in_batch: HashSet<i64> = ids.iter().copied().collect();
            let results: Vec<MatchResult> = results
                .into_iter()
                .filter(|r| in_batch.contains(&r.id))
                .collect();

            storage.commit_batch(&results, &ids)?;
            progress.total_processed += ids.len();

            info!(
                batch = progress.batch_number,
                scored = results.len(),
                processed = progress.total_processed,
                total = progress.total_unmatched,
                "Committed batch"
            );

            if batch.len() < self.batch_size {
                return Ok(BatchReport {
                    progress,
                    stop: BatchStop::Exhausted,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.cooldown) => {}
            }
        }
    }
}
