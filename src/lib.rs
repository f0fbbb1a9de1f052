//! kemosync - Mirror a creator's posted media from a kemono-style archive site
//!
//! This library walks a user's paginated post listing, extracts the media links of
//! every post and downloads them with bounded concurrency, a global start-rate
//! limit, batching and retries. Files that already exist are skipped, so an
//! interrupted run can simply be started again.
//!
//! # Features
//!
//! - **Paginated Crawl**: Follows listing offsets until the last page, deduplicating posts
//! - **Parallel Extraction**: A small worker pool reads post pages concurrently
//! - **Rate Limiting**: Concurrency cap, minimum spacing between starts, batch pauses
//! - **Automatic Retry**: Fixed-interval retries for transient failures
//! - **Skip Existing**: Already downloaded files cost no requests
//!
//! # Example
//!
//! ```no_run
//! use kemosync::{sync_user, SyncConfig, SyncRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let request = SyncRequest {
//!     user_id: "167293545".to_string(),
//!     output_dir: "./downloads".into(),
//!     max_posts: None,
//! };
//!
//! let report = sync_user(&config, &request, CancellationToken::new()).await?;
//! println!("{}", report.summary);
//! # Ok(())
//! # }
//! ```

pub mod crawl;
mod download;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod filename;
pub mod orchestrator;
pub mod rate_gate;
pub mod stats;
pub mod types;

pub use crawl::PostCrawler;
pub use engine::DownloadEngine;
pub use error::{FetchError, SyncError};
pub use extract::{KemonoExtractor, LinkExtractor};
pub use fetch::{build_client, HttpFetcher, PageFetcher};
pub use orchestrator::{sync_user, SyncReport, SyncRequest};
pub use rate_gate::RateGate;
pub use stats::{RunStatistics, RunSummary, Statistics};
pub use types::{DownloadJob, DownloadOutcome, PostMediaSet, PostRef, SyncConfig};
