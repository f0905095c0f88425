//! Bounded-concurrency queue for multi-part uploads.
//!
//! At most `concurrency` parts are in flight; each part runs under the job
//! timeout. The first failure or timeout aborts the batch: parts still in
//! flight are dropped (cancelling their transfers) and no further parts start.
//! There is no partial-success result.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::constants::{BULK_CONCURRENCY, BULK_JOB_TIMEOUT};
use crate::error::{DispatchError, Result};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Maximum parts in flight (default: 3).
    pub concurrency: usize,
    /// Per-part timeout (default: 30 minutes).
    pub job_timeout: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            concurrency: BULK_CONCURRENCY,
            job_timeout: BULK_JOB_TIMEOUT,
        }
    }
}

/// Progress report emitted after each completed part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkProgress {
    /// Submission index of the part that just completed.
    pub index: usize,
    /// Parts completed so far, this one included.
    pub completed: usize,
    /// Parts in the batch.
    pub total: usize,
}

/// Runs batches of independent parts.
#[derive(Debug, Clone, Default)]
pub struct BulkTransferQueue {
    config: BulkConfig,
}

impl BulkTransferQueue {
    /// Creates a queue with `config`.
    pub fn new(config: BulkConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Runs every job, returning their results in submission order.
    ///
    /// `on_progress` fires once per completed part, in completion order.
    /// A job is only invoked once a slot is free.
    pub async fn run<J, Fut, T, P>(&self, jobs: Vec<J>, mut on_progress: P) -> Result<Vec<T>>
    where
        J: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnMut(BulkProgress),
    {
        let total = jobs.len();
        let job_timeout = self.config.job_timeout;
        debug!(
            "Bulk transfer of {} parts, concurrency {}",
            total, self.config.concurrency
        );

        let mut in_flight = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| async move {
                let result = match tokio::time::timeout(job_timeout, job()).await {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::Timeout {
                        timeout_ms: job_timeout.as_millis() as u64,
                    }),
                };
                (index, result)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut completed = 0;

        while let Some((index, result)) = in_flight.next().await {
            match result {
                Ok(value) => {
                    results[index] = Some(value);
                    completed += 1;
                    on_progress(BulkProgress {
                        index,
                        completed,
                        total,
                    });
                }
                Err(err) => {
                    warn!(
                        "Bulk transfer aborted: part {} failed after {} of {} completed: {}",
                        index, completed, total, err
                    );
                    return Err(DispatchError::Batch {
                        index,
                        completed,
                        source: Box::new(err),
                    });
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}
