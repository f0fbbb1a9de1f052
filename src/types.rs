//! Data structures shared by the crawler, the download engine and the CLI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::extract::post_id_from_url;

/// Configuration for a sync run.
///
/// Built once at startup and handed to every component by reference; nothing
/// mutates it afterwards.
///
/// # Example
///
/// ```
/// use kemosync::SyncConfig;
///
/// let config = SyncConfig {
///     max_concurrent_downloads: 8,
///     skip_existing: false,
///     ..SyncConfig::default()
/// };
/// assert_eq!(config.batch_size, 50);
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Site root, e.g. `https://kemono.cr`.
    pub base_url: String,
    /// Service segment of listing URLs (`patreon`, `fanbox`, ...).
    pub service: String,
    /// Total attempts per request, including the first one.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Delay between successive listing page requests.
    pub request_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Verify TLS certificates.
    pub verify_ssl: bool,
    /// User-Agent sent with every request.
    pub user_agent: String,
    /// Maximum number of media downloads in flight (default: 30).
    pub max_concurrent_downloads: usize,
    /// Leave files that already exist on disk untouched.
    pub skip_existing: bool,
    /// Minimum interval between the starts of two downloads, across all workers.
    pub rate_limit_delay: Duration,
    /// Number of jobs admitted per batch.
    pub batch_size: usize,
    /// Pause after each batch has drained.
    pub batch_pause: Duration,
    /// Posts per listing page, used when the next offset has to be inferred.
    pub page_size: u64,
    /// Number of workers extracting media links from post pages.
    pub extract_workers: usize,
}

/// Browser User-Agent; the site serves reduced markup to unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "https://kemono.cr".to_string(),
            service: "patreon".to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            request_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            verify_ssl: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrent_downloads: 30,
            skip_existing: true,
            rate_limit_delay: Duration::from_millis(20),
            batch_size: 50,
            batch_pause: Duration::from_millis(300),
            page_size: 50,
            extract_workers: 5,
        }
    }
}

impl SyncConfig {
    /// Listing URL for `user_id` at `offset`. The first page carries no offset parameter.
    pub fn listing_url(&self, user_id: &str, offset: u64) -> String {
        let base = self.base_url.trim_end_matches('/');
        if offset > 0 {
            format!("{}/{}/user/{}?o={}", base, self.service, user_id, offset)
        } else {
            format!("{}/{}/user/{}", base, self.service, user_id)
        }
    }
}

/// A post discovered on a listing page. Identity is the URL.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostRef {
    /// Numeric post id taken from the URL, or `"unknown"`.
    pub id: String,
    /// Absolute post URL.
    pub url: String,
}

impl PostRef {
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let id = post_id_from_url(&url).unwrap_or_else(|| "unknown".to_string());
        Self { id, url }
    }
}

/// A post together with the media URLs found on its page, in page order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostMediaSet {
    pub post: PostRef,
    pub media_urls: Vec<String>,
}

/// One file to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    /// Directory the file is written into; the filename is derived from the URL.
    pub dest_dir: PathBuf,
    /// Media URL.
    pub source_url: String,
    /// 1-based position of the URL within its post, used for fallback names.
    pub sequence_index: usize,
}

impl DownloadJob {
    /// Expands a media set into jobs under `<user_dir>/post_<id>/`.
    pub fn for_media_set(user_dir: &std::path::Path, set: &PostMediaSet) -> Vec<DownloadJob> {
        let dest_dir = user_dir.join(format!("post_{}", set.post.id));
        set.media_urls
            .iter()
            .enumerate()
            .map(|(index, url)| DownloadJob {
                dest_dir: dest_dir.clone(),
                source_url: url.clone(),
                sequence_index: index + 1,
            })
            .collect()
    }
}

/// Result of processing a single [`DownloadJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// File written; carries the number of bytes received.
    Downloaded(u64),
    /// Destination already existed.
    Skipped,
    /// All attempts failed.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_listing_url() {
        let config = SyncConfig {
            base_url: "https://kemono.cr/".to_string(),
            ..SyncConfig::default()
        };
        assert_eq!(
            config.listing_url("123", 0),
            "https://kemono.cr/patreon/user/123"
        );
        assert_eq!(
            config.listing_url("123", 50),
            "https://kemono.cr/patreon/user/123?o=50"
        );
    }

    #[test]
    fn test_post_ref_id() {
        let post = PostRef::from_url("https://kemono.cr/patreon/user/1/post/98765");
        assert_eq!(post.id, "98765");
        assert_eq!(PostRef::from_url("https://kemono.cr/about").id, "unknown");
    }

    #[test]
    fn test_jobs_for_media_set() {
        let set = PostMediaSet {
            post: PostRef::from_url("https://kemono.cr/patreon/user/1/post/7"),
            media_urls: vec!["https://n1/data/a.png".into(), "https://n1/data/b.png".into()],
        };
        let jobs = DownloadJob::for_media_set(Path::new("out/user_1"), &set);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].dest_dir, Path::new("out/user_1/post_7"));
        assert_eq!(jobs[0].sequence_index, 1);
        assert_eq!(jobs[1].sequence_index, 2);
        assert_eq!(jobs[1].source_url, "https://n1/data/b.png");
    }
}
