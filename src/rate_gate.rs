//! Global minimum spacing between download starts.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between successive starts across every worker.
///
/// Waiters queue on the inner mutex, so at most one of them is ever sleeping
/// towards the next start time. The lock is never held across network I/O.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    /// `None` until the first start; the first caller passes immediately.
    last_start: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the interval since the previous start has elapsed, then
    /// records and returns this caller's start time.
    pub async fn wait(&self) -> Instant {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            tokio::time::sleep_until(previous + self.interval).await;
        }
        let now = Instant::now();
        *last_start = Some(now);
        now
    }
}
