//! Main orchestration logic: crawl a user's posts, then download their media.

use crate::crawl::PostCrawler;
use crate::engine::DownloadEngine;
use crate::error::SyncError;
use crate::extract::KemonoExtractor;
use crate::fetch::{build_client, HttpFetcher};
use crate::stats::{RunStatistics, RunSummary};
use crate::types::{DownloadJob, PostMediaSet, SyncConfig};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What to sync and where to put it.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Creator id as it appears in listing URLs.
    pub user_id: String,
    /// Root output directory; files land in `user_<id>/post_<id>/`.
    pub output_dir: PathBuf,
    /// Only process the first N posts of the listing.
    pub max_posts: Option<usize>,
}

/// Outcome of [`sync_user`].
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Posts considered after applying `max_posts`.
    pub posts: usize,
    /// Posts that had at least one media file.
    pub media_posts: usize,
    pub summary: RunSummary,
}

/// Name of the crawl manifest written into the user directory.
pub const MANIFEST_FILE: &str = "posts.json";

/// Crawls and downloads everything for one user.
///
/// The steps are:
///
/// 1. Creates the output directory and the HTTP client (failures are fatal)
/// 2. Walks the listing pages to collect post URLs
/// 3. Extracts media URLs from every post in parallel and writes `posts.json`
/// 4. Downloads all media through the [`DownloadEngine`]
///
/// A listing with no posts is an error; posts without any media are not.
/// When `cancel` fires, whatever has been counted so far is returned with
/// `summary.interrupted` set.
///
/// # Example
///
/// ```no_run
/// use kemosync::{sync_user, SyncConfig, SyncRequest};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let request = SyncRequest {
///     user_id: "167293545".to_string(),
///     output_dir: "./downloads".into(),
///     max_posts: Some(10),
/// };
/// let report = sync_user(&SyncConfig::default(), &request, CancellationToken::new()).await?;
/// println!("{}", report.summary);
/// # Ok(())
/// # }
/// ```
pub async fn sync_user(
    config: &SyncConfig,
    request: &SyncRequest,
    cancel: CancellationToken,
) -> Result<SyncReport, SyncError> {
    let started = Instant::now();

    std::fs::create_dir_all(&request.output_dir)?;
    let client = build_client(config)?;
    let extractor = KemonoExtractor::new(&config.base_url, config.page_size)?;
    let fetcher = HttpFetcher::new(client.clone(), config);
    let show_progress = atty::is(atty::Stream::Stderr);

    let report = |posts: usize, media_posts: usize, stats: RunStatistics| SyncReport {
        posts,
        media_posts,
        summary: RunSummary {
            stats,
            elapsed: started.elapsed(),
            interrupted: cancel.is_cancelled(),
        },
    };

    info!("PHASE 1: Fetching post URLs");
    let crawler = PostCrawler::new(fetcher, extractor, config).with_cancellation(cancel.clone());
    let mut posts = crawler.crawl_user_posts(&request.user_id).await;

    if posts.is_empty() {
        if cancel.is_cancelled() {
            return Ok(report(0, 0, RunStatistics::default()));
        }
        return Err(SyncError::NoPosts(request.user_id.clone()));
    }
    info!("Found {} posts", posts.len());

    if let Some(max_posts) = request.max_posts {
        if posts.len() > max_posts {
            info!("Limiting to first {} posts", max_posts);
            posts.truncate(max_posts);
        }
    }
    let post_count = posts.len();

    info!("PHASE 2: Extracting media from posts");
    let extract_pb = progress_bar(post_count as u64, show_progress);
    extract_pb.set_message(format!("🔎 Extracting media from {} posts", post_count));
    let crawler = crawler.with_progress(extract_pb.clone());
    let media_sets = crawler.collect_media(posts).await;
    extract_pb.finish_and_clear();

    let total_media: usize = media_sets.iter().map(|set| set.media_urls.len()).sum();
    info!(
        "Found {} media files across {} posts",
        total_media,
        media_sets.len()
    );

    let user_dir = request.output_dir.join(format!("user_{}", request.user_id));
    tokio::fs::create_dir_all(&user_dir).await?;
    if let Err(e) = write_manifest(&user_dir, &media_sets).await {
        warn!("Failed to write {}: {}", MANIFEST_FILE, e);
    }

    if total_media == 0 {
        warn!("No media found to download");
        return Ok(report(post_count, 0, RunStatistics::default()));
    }

    info!("PHASE 3: Downloading media");
    let jobs: Vec<DownloadJob> = media_sets
        .iter()
        .flat_map(|set| DownloadJob::for_media_set(&user_dir, set))
        .collect();

    let download_pb = progress_bar(jobs.len() as u64, show_progress);
    download_pb.set_message(format!("📦 Downloading {} files", jobs.len()));
    let engine = DownloadEngine::new(client, config)
        .with_cancellation(cancel.clone())
        .with_progress(download_pb.clone());
    let stats = engine.run(jobs).await;

    if cancel.is_cancelled() {
        download_pb.abandon_with_message("⚠️  Download interrupted");
    } else {
        download_pb.finish_with_message("✅ Download complete");
    }

    Ok(report(post_count, media_sets.len(), stats))
}

/// Persists the crawl result as pretty JSON next to the downloaded posts.
async fn write_manifest(user_dir: &Path, media_sets: &[PostMediaSet]) -> Result<(), SyncError> {
    let manifest_path = user_dir.join(MANIFEST_FILE);
    let manifest = serde_json::to_string_pretty(media_sets)?;
    tokio::fs::write(&manifest_path, manifest).await?;
    info!("Persisted crawl manifest to {}", manifest_path.display());
    Ok(())
}

fn progress_bar(len: u64, visible: bool) -> indicatif::ProgressBar {
    if !visible {
        return indicatif::ProgressBar::hidden();
    }

    let pb = indicatif::ProgressBar::new(len);
    if let Ok(style) = indicatif::ProgressStyle::with_template(
        "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed, ETA {eta_precise}",
    ) {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}
