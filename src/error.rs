//! Error types for crawl and download operations.

use std::io;
use thiserror::Error;

/// Errors raised while fetching a listing page, post page or media file.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, body read).
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Client errors other than 408 and 429 are treated as permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(_) => true,
            FetchError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
        }
    }
}

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// Page or media fetch failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// JSON serialization error while writing the crawl manifest.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// The configured base URL could not be parsed.
    #[error("Invalid base URL {url}: {source}")]
    InvalidBaseUrl {
        /// The offending value.
        url: String,
        /// Parse failure.
        source: url::ParseError,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// The listing produced no posts at all.
    #[error("No posts found for user {0}")]
    NoPosts(String),

    /// The run was interrupted before the operation could start.
    #[error("Operation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let status = |status| FetchError::Status {
            url: "https://example.com".to_string(),
            status,
        };
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(status(408).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
    }
}
