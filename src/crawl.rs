//! Listing pagination and per-post media extraction.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::extract::LinkExtractor;
use crate::fetch::PageFetcher;
use crate::types::{PostMediaSet, PostRef, SyncConfig};

/// Walks a user's listing pages and the posts they link to.
///
/// `F` is cloned once per extraction worker, so every worker owns its own
/// fetcher handle.
pub struct PostCrawler<F, E> {
    fetcher: F,
    extractor: Arc<E>,
    config: SyncConfig,
    cancel: CancellationToken,
    progress: indicatif::ProgressBar,
}

impl<F, E> PostCrawler<F, E>
where
    F: PageFetcher + Clone + 'static,
    E: LinkExtractor + 'static,
{
    pub fn new(fetcher: F, extractor: E, config: &SyncConfig) -> Self {
        Self {
            fetcher,
            extractor: Arc::new(extractor),
            config: config.clone(),
            cancel: CancellationToken::new(),
            progress: indicatif::ProgressBar::hidden(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Advances `progress` once per post examined by [`collect_media`](Self::collect_media).
    pub fn with_progress(mut self, progress: indicatif::ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Collects every post of `user_id`, deduplicated by URL, in discovery order.
    ///
    /// Stops at the first page that fails to load, yields no posts, or does not
    /// advance the offset. A failed page ends the crawl with what has been found
    /// so far rather than an error.
    pub async fn crawl_user_posts(&self, user_id: &str) -> Vec<PostRef> {
        let mut seen = HashSet::new();
        let mut posts = Vec::new();
        let mut offset = 0u64;
        let mut page = 1u32;

        info!("Fetching posts for user {}", user_id);

        loop {
            if self.cancel.is_cancelled() {
                warn!("Interrupted while fetching page {}", page);
                break;
            }

            let url = self.config.listing_url(user_id, offset);
            info!("Fetching page {} (offset: {})", page, offset);

            let html = match self.fetcher.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    error!("Error fetching posts page {}: {}", page, e);
                    break;
                }
            };

            let links = self.extractor.extract_post_links(&html);
            if links.is_empty() {
                info!("No more posts found");
                break;
            }

            let before = posts.len();
            for link in links {
                if seen.insert(link.clone()) {
                    posts.push(PostRef::from_url(link));
                }
            }
            info!(
                "Found {} new posts (total: {})",
                posts.len() - before,
                posts.len()
            );

            // The offset must strictly increase, otherwise a stuck pagination
            // link would loop forever.
            match self.extractor.extract_next_offset(&html, offset) {
                Some(next) if next > offset => offset = next,
                _ => break,
            }
            page += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.config.request_delay) => {}
                _ = self.cancel.cancelled() => {}
            }
        }

        info!("Total posts found: {}", posts.len());
        posts
    }

    /// Fetches each post page and pairs it with its media URLs.
    ///
    /// Runs `extract_workers` workers in parallel; results arrive in completion
    /// order. Posts without media and posts that fail to load are left out.
    pub async fn collect_media(&self, posts: Vec<PostRef>) -> Vec<PostMediaSet> {
        if posts.is_empty() {
            return Vec::new();
        }

        let posts: Arc<[PostRef]> = posts.into();
        let cursor = Arc::new(AtomicUsize::new(0));
        let workers = self.config.extract_workers.clamp(1, posts.len());

        info!(
            "Extracting media from {} posts ({} workers)",
            posts.len(),
            workers
        );

        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let fetcher = self.fetcher.clone();
            let extractor = Arc::clone(&self.extractor);
            let posts = Arc::clone(&posts);
            let cursor = Arc::clone(&cursor);
            let cancel = self.cancel.clone();
            let progress = self.progress.clone();

            tasks.spawn(async move {
                let mut found = Vec::new();
                while !cancel.is_cancelled() {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(post) = posts.get(index) else {
                        break;
                    };

                    match fetcher.fetch(&post.url).await {
                        Ok(html) => {
                            let media_urls = extractor.extract_media_links(&html);
                            if media_urls.is_empty() {
                                debug!("No media in post {}", post.id);
                            } else {
                                debug!("Found {} media in post {}", media_urls.len(), post.id);
                                found.push(PostMediaSet {
                                    post: post.clone(),
                                    media_urls,
                                });
                            }
                        }
                        Err(e) => warn!("Error processing post {}: {}", post.url, e),
                    }
                    progress.inc(1);
                }
                found
            });
        }

        let mut sets = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(found) => sets.extend(found),
                Err(e) => error!("Extraction worker failed: {}", e),
            }
        }
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Serves canned pages and counts requests.
    #[derive(Clone, Default)]
    struct FakeFetcher {
        pages: Arc<HashMap<String, String>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: Arc::new(
                    pages
                        .iter()
                        .map(|(url, html)| (url.to_string(), html.to_string()))
                        .collect(),
                ),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages.get(url).cloned().ok_or(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    /// Line-oriented page format: `post <url>`, `media <url>`, `next <offset>`.
    struct LineExtractor;

    fn lines_with<'a>(html: &'a str, tag: &'a str) -> impl Iterator<Item = &'a str> {
        html.lines()
            .filter_map(move |line| line.trim().strip_prefix(tag))
            .map(str::trim)
    }

    impl LinkExtractor for LineExtractor {
        fn extract_post_links(&self, html: &str) -> Vec<String> {
            lines_with(html, "post ").map(String::from).collect()
        }

        fn extract_media_links(&self, html: &str) -> Vec<String> {
            lines_with(html, "media ").map(String::from).collect()
        }

        fn extract_next_offset(&self, html: &str, _current_offset: u64) -> Option<u64> {
            lines_with(html, "next ").next().and_then(|n| n.parse().ok())
        }
    }

    fn config() -> SyncConfig {
        SyncConfig {
            base_url: "https://site.test".to_string(),
            request_delay: Duration::ZERO,
            ..SyncConfig::default()
        }
    }

    const FIRST: &str = "https://site.test/patreon/user/u";
    const SECOND: &str = "https://site.test/patreon/user/u?o=50";
    const THIRD: &str = "https://site.test/patreon/user/u?o=100";

    #[tokio::test]
    async fn test_overlapping_pages_are_deduplicated() {
        let fetcher = FakeFetcher::new(&[
            (FIRST, "post https://site.test/post/1\npost https://site.test/post/2\nnext 50"),
            (SECOND, "post https://site.test/post/2\npost https://site.test/post/3\nnext 100"),
            (THIRD, "nothing here"),
        ]);
        let crawler = PostCrawler::new(fetcher.clone(), LineExtractor, &config());

        let posts = crawler.crawl_user_posts("u").await;

        let urls: Vec<_> = posts.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://site.test/post/1",
                "https://site.test/post/2",
                "https://site.test/post/3",
            ]
        );
        assert_eq!(posts[2].id, "3");
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_constant_next_offset_terminates() {
        let fetcher = FakeFetcher::new(&[
            (FIRST, "post https://site.test/post/1\nnext 50"),
            (SECOND, "post https://site.test/post/2\nnext 50"),
        ]);
        let crawler = PostCrawler::new(fetcher.clone(), LineExtractor, &config());

        let posts = crawler.crawl_user_posts("u").await;

        assert_eq!(posts.len(), 2);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_non_advancing_offset_on_first_page() {
        let fetcher = FakeFetcher::new(&[(FIRST, "post https://site.test/post/1\nnext 0")]);
        let crawler = PostCrawler::new(fetcher.clone(), LineExtractor, &config());

        assert_eq!(crawler.crawl_user_posts("u").await.len(), 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_keeps_earlier_results() {
        // The second page is missing, so the fetch fails.
        let fetcher = FakeFetcher::new(&[(FIRST, "post https://site.test/post/1\nnext 50")]);
        let crawler = PostCrawler::new(fetcher, LineExtractor, &config());

        let posts = crawler.crawl_user_posts("u").await;
        assert_eq!(posts, vec![PostRef::from_url("https://site.test/post/1")]);
    }

    #[tokio::test]
    async fn test_cancelled_crawl_fetches_nothing() {
        let fetcher = FakeFetcher::new(&[(FIRST, "post https://site.test/post/1")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let crawler =
            PostCrawler::new(fetcher.clone(), LineExtractor, &config()).with_cancellation(cancel);

        assert!(crawler.crawl_user_posts("u").await.is_empty());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_posts_without_media_are_dropped() {
        let fetcher = FakeFetcher::new(&[
            ("https://site.test/post/1", "media a.png\nmedia b.png"),
            ("https://site.test/post/2", "text only"),
        ]);
        let crawler = PostCrawler::new(fetcher, LineExtractor, &config());

        let sets = crawler
            .collect_media(vec![
                PostRef::from_url("https://site.test/post/1"),
                PostRef::from_url("https://site.test/post/2"),
            ])
            .await;

        assert_eq!(
            sets,
            vec![PostMediaSet {
                post: PostRef::from_url("https://site.test/post/1"),
                media_urls: vec!["a.png".to_string(), "b.png".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_failing_post_is_isolated() {
        let mut pages = Vec::new();
        let urls: Vec<String> = (1..=12)
            .map(|i| format!("https://site.test/post/{}", i))
            .collect();
        for url in &urls[1..] {
            pages.push((url.as_str(), "media https://cdn.test/data/file.png"));
        }
        let fetcher = FakeFetcher::new(&pages);
        let crawler = PostCrawler::new(fetcher.clone(), LineExtractor, &config());

        let sets = crawler
            .collect_media(urls.iter().map(PostRef::from_url).collect())
            .await;

        assert_eq!(sets.len(), 11);
        assert!(sets.iter().all(|s| s.post.id != "1"));
        assert_eq!(fetcher.calls(), 12);
    }

    #[tokio::test]
    async fn test_collect_media_with_no_posts() {
        let crawler = PostCrawler::new(FakeFetcher::default(), LineExtractor, &config());
        assert!(crawler.collect_media(Vec::new()).await.is_empty());
    }
}
