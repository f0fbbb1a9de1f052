//! Run statistics: a concurrent accumulator and the presentation summary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::filename::format_bytes;
use crate::types::DownloadOutcome;

/// Point-in-time counts for one engine run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub total: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes: u64,
}

impl RunStatistics {
    /// Jobs that produced an outcome.
    pub fn completed(&self) -> u64 {
        self.downloaded + self.skipped + self.failed
    }
}

/// Counters updated concurrently by download tasks.
///
/// A fresh instance is created per run and never reset.
#[derive(Debug, Default)]
pub struct Statistics {
    total: u64,
    downloaded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

impl Statistics {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Folds one job outcome into the counters.
    pub fn record(&self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded(bytes) => {
                self.bytes.fetch_add(*bytes, Ordering::Relaxed);
                self.downloaded.fetch_add(1, Ordering::Relaxed);
            }
            DownloadOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            DownloadOutcome::Failed(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> RunStatistics {
        RunStatistics {
            total: self.total,
            downloaded: self.downloaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Final report printed at the end of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: RunStatistics,
    pub elapsed: Duration,
    pub interrupted: bool,
}

impl RunSummary {
    /// Downloaded share of all jobs, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.stats.total == 0 {
            return 0.0;
        }
        self.stats.downloaded as f64 / self.stats.total as f64 * 100.0
    }

    pub fn total_size(&self) -> String {
        format_bytes(self.stats.bytes)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        // Whole seconds are enough for a summary line.
        let elapsed = Duration::from_secs(self.elapsed.as_secs());

        writeln!(f, "{}", rule)?;
        if self.interrupted {
            writeln!(f, "DOWNLOAD SUMMARY (interrupted)")?;
        } else {
            writeln!(f, "DOWNLOAD SUMMARY")?;
        }
        writeln!(f, "{}", rule)?;
        writeln!(f, "Total files:      {}", self.stats.total)?;
        writeln!(f, "Downloaded:       {}", self.stats.downloaded)?;
        writeln!(f, "Skipped:          {}", self.stats.skipped)?;
        writeln!(f, "Failed:           {}", self.stats.failed)?;
        writeln!(f, "Success rate:     {:.1}%", self.success_rate())?;
        writeln!(f, "Total size:       {}", self.total_size())?;
        writeln!(f, "Elapsed:          {}", humantime::format_duration(elapsed))?;
        write!(f, "{}", rule)
    }
}
