//! Batched, rate-limited concurrent download engine.
//!
//! Three controls compose here:
//!
//! 1. a semaphore capping the number of downloads in flight,
//! 2. a global [`RateGate`] spacing out download starts,
//! 3. fixed-size batches that are joined completely, followed by a pause,
//!    before the next batch is admitted.
//!
//! Existing files are skipped before any of the three is touched, so skips cost
//! no throughput.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_retry2::{Retry, RetryError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::download::download_file;
use crate::error::SyncError;
use crate::fetch::retry_strategy;
use crate::filename::{format_bytes, media_filename};
use crate::rate_gate::RateGate;
use crate::stats::{RunStatistics, Statistics};
use crate::types::{DownloadJob, DownloadOutcome, SyncConfig};

/// Executes [`DownloadJob`]s and accumulates [`RunStatistics`].
pub struct DownloadEngine {
    client: reqwest::Client,
    slots: Arc<Semaphore>,
    gate: Arc<RateGate>,
    cancel: CancellationToken,
    progress: indicatif::ProgressBar,
    skip_existing: bool,
    max_retries: u32,
    retry_delay: Duration,
    batch_size: usize,
    batch_pause: Duration,
}

impl DownloadEngine {
    pub fn new(client: reqwest::Client, config: &SyncConfig) -> Self {
        Self {
            client,
            slots: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1))),
            gate: Arc::new(RateGate::new(config.rate_limit_delay)),
            cancel: CancellationToken::new(),
            progress: indicatif::ProgressBar::hidden(),
            skip_existing: config.skip_existing,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            batch_size: config.batch_size.max(1),
            batch_pause: config.batch_pause,
        }
    }

    /// Stops admitting work once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Advances `progress` once per finished job.
    pub fn with_progress(mut self, progress: indicatif::ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Runs every job and returns the final counts.
    ///
    /// If the run is cancelled, jobs that never started have no outcome and the
    /// returned counts sum to less than `total`.
    pub async fn run(&self, jobs: Vec<DownloadJob>) -> RunStatistics {
        let stats = Arc::new(Statistics::new(jobs.len() as u64));
        let batch_count = jobs.len().div_ceil(self.batch_size);

        info!(
            "Downloading {} files in {} batch(es) (max {} concurrent, {:?} between starts)",
            jobs.len(),
            batch_count,
            self.slots.available_permits(),
            self.gate.interval()
        );

        let runner = JobRunner {
            client: self.client.clone(),
            slots: Arc::clone(&self.slots),
            gate: Arc::clone(&self.gate),
            stats: Arc::clone(&stats),
            cancel: self.cancel.clone(),
            skip_existing: self.skip_existing,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        };

        let mut pending = jobs.into_iter();
        for batch_index in 0..batch_count {
            if self.cancel.is_cancelled() {
                warn!(
                    "Interrupted, {} batch(es) not started",
                    batch_count - batch_index
                );
                break;
            }

            let mut tasks = JoinSet::new();
            for job in pending.by_ref().take(self.batch_size) {
                tasks.spawn(runner.clone().run(job));
            }

            // Batch barrier: everything admitted must finish first.
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Some(_)) => self.progress.inc(1),
                    Ok(None) => {}
                    Err(e) => {
                        error!("Download task failed: {}", e);
                        stats.record(&DownloadOutcome::Failed(format!("Task failed: {}", e)));
                        self.progress.inc(1);
                    }
                }
            }

            if batch_index + 1 < batch_count {
                debug!(
                    "Batch {}/{} complete, pausing for {:?}",
                    batch_index + 1,
                    batch_count,
                    self.batch_pause
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.batch_pause) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        stats.snapshot()
    }
}

/// Per-run state cloned into every job task.
#[derive(Clone)]
struct JobRunner {
    client: reqwest::Client,
    slots: Arc<Semaphore>,
    gate: Arc<RateGate>,
    stats: Arc<Statistics>,
    cancel: CancellationToken,
    skip_existing: bool,
    max_retries: u32,
    retry_delay: Duration,
}

impl JobRunner {
    async fn run(self, job: DownloadJob) -> Option<DownloadOutcome> {
        let outcome = self.process(&job).await?;

        match &outcome {
            DownloadOutcome::Downloaded(bytes) => {
                debug!("Downloaded {} ({})", job.source_url, format_bytes(*bytes))
            }
            DownloadOutcome::Skipped => debug!("Skipping existing file for {}", job.source_url),
            DownloadOutcome::Failed(reason) => {
                error!("Failed to download {}: {}", job.source_url, reason)
            }
        }

        self.stats.record(&outcome);
        Some(outcome)
    }

    /// Returns `None` when cancelled before the job's first request or between
    /// two of its attempts. Every failed attempt is retried.
    async fn process(&self, job: &DownloadJob) -> Option<DownloadOutcome> {
        let filename = media_filename(&job.source_url, job.sequence_index);
        let target = job.dest_dir.join(filename);

        if self.skip_existing && tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Some(DownloadOutcome::Skipped);
        }

        let _permit = tokio::select! {
            permit = self.slots.acquire() => permit.ok()?,
            _ = self.cancel.cancelled() => return None,
        };
        tokio::select! {
            _ = self.gate.wait() => {}
            _ = self.cancel.cancelled() => return None,
        }

        let strategy = retry_strategy(self.max_retries, self.retry_delay);
        let url = job.source_url.as_str();
        let target = target.as_path();
        let sequence_index = job.sequence_index;

        let result = Retry::spawn(strategy, move || async move {
            if self.cancel.is_cancelled() {
                return RetryError::to_permanent(SyncError::Cancelled);
            }
            match download_file(&self.client, url, target, sequence_index).await {
                Ok(bytes) => Ok(bytes),
                Err(e) => {
                    warn!("Failed to download {} due to error: {}", url, e);
                    RetryError::to_transient(e)
                }
            }
        })
        .await;

        match result {
            Ok(bytes) => Some(DownloadOutcome::Downloaded(bytes)),
            Err(SyncError::Cancelled) => None,
            Err(e) => Some(DownloadOutcome::Failed(e.to_string())),
        }
    }
}
