//! Page fetching over HTTP.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;
use tokio_retry2::strategy::FixedInterval;
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, warn};

use crate::error::{FetchError, SyncError};
use crate::types::SyncConfig;

/// Source of page HTML.
///
/// The crawler only depends on this trait, so a rendering browser or a canned
/// fake can stand in for the HTTP implementation.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the body of `url` as text.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Builds the HTTP client shared by page fetches and media downloads.
///
/// Failing here is fatal for the run.
pub fn build_client(config: &SyncConfig) -> Result<reqwest::Client, SyncError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout)
        .default_headers(headers)
        .danger_accept_invalid_certs(!config.verify_ssl)
        .build()
        .map_err(|e| SyncError::Client(e.to_string()))
}

/// Fixed-interval retry schedule allowing `max_attempts` attempts in total.
pub(crate) fn retry_strategy(
    max_attempts: u32,
    delay: Duration,
) -> std::iter::Take<FixedInterval> {
    let retries = max_attempts.saturating_sub(1) as usize;
    FixedInterval::from_millis(delay.as_millis() as u64).take(retries)
}

/// [`PageFetcher`] backed by a `reqwest` client.
///
/// Cloning is cheap and shares the connection pool; each crawl worker holds its
/// own clone.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, config: &SyncConfig) -> Self {
        Self {
            client,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!("Fetching {}", url);
        let strategy = retry_strategy(self.max_retries, self.retry_delay);

        Retry::spawn(strategy, move || async move {
            match self.fetch_once(url).await {
                Ok(html) => Ok(html),
                Err(e) if e.is_transient() => {
                    warn!("Failed to fetch {} due to error: {}", url, e);
                    RetryError::to_transient(e)
                }
                Err(e) => RetryError::to_permanent(e),
            }
        })
        .await
    }
}
