//! Link extraction from listing and post pages.
//!
//! Extraction never fails: markup that does not match the expected shape simply
//! yields no links, which the crawler treats as the end of the listing or as a post
//! without media.

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::error::SyncError;

static ARTICLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article").unwrap());

static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

static POST_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/post/(\d+)").unwrap());

static OFFSET_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?o=(\d+)").unwrap());

const MEDIA_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg"];

/// Pulls post links, media links and pagination state out of page HTML.
pub trait LinkExtractor: Send + Sync {
    /// Post URLs on a listing page, in page order, without duplicates.
    fn extract_post_links(&self, html: &str) -> Vec<String>;

    /// Full-resolution media URLs on a post page, in page order, without duplicates.
    fn extract_media_links(&self, html: &str) -> Vec<String>;

    /// Offset of the next listing page, if there is one beyond `current_offset`.
    fn extract_next_offset(&self, html: &str, current_offset: u64) -> Option<u64>;
}

/// Numeric post id contained in a post URL.
pub fn post_id_from_url(url: &str) -> Option<String> {
    POST_PATH.captures(url).map(|caps| caps[1].to_string())
}

/// Extractor for kemono-style markup.
///
/// Posts are `<article>` cards linking to `/post/<id>`, media are anchors pointing
/// into `/data/`, and pagination uses `?o=<offset>` links.
#[derive(Debug, Clone)]
pub struct KemonoExtractor {
    base: Url,
    page_size: u64,
}

impl KemonoExtractor {
    /// Creates an extractor resolving relative links against `base_url`.
    ///
    /// `page_size` is the offset step used when the page only implies that more
    /// posts exist.
    pub fn new(base_url: &str, page_size: u64) -> Result<Self, SyncError> {
        let base = Url::parse(base_url).map_err(|source| SyncError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        Ok(Self { base, page_size })
    }

    fn absolutize(&self, href: &str) -> Option<String> {
        self.base.join(href).ok().map(String::from)
    }
}

fn is_media_url(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.contains("/data/") && MEDIA_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

fn offset_of(href: &str) -> Option<u64> {
    OFFSET_PARAM
        .captures(href)
        .and_then(|caps| caps[1].parse().ok())
}

impl LinkExtractor for KemonoExtractor {
    fn extract_post_links(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut posts = Vec::new();

        for article in document.select(&ARTICLE) {
            let href = article
                .select(&LINK)
                .filter_map(|a| a.value().attr("href"))
                .find(|href| POST_PATH.is_match(href));

            if let Some(url) = href.and_then(|h| self.absolutize(h)) {
                if seen.insert(url.clone()) {
                    posts.push(url);
                }
            }
        }

        posts
    }

    fn extract_media_links(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut media = Vec::new();

        for href in document
            .select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| is_media_url(href))
        {
            if let Some(url) = self.absolutize(href) {
                if seen.insert(url.clone()) {
                    media.push(url);
                }
            }
        }

        media
    }

    fn extract_next_offset(&self, html: &str, current_offset: u64) -> Option<u64> {
        let document = Html::parse_document(html);

        // An explicit ">" button carries the exact next offset.
        let next_button = document
            .select(&LINK)
            .find(|a| a.text().collect::<String>().trim() == ">");
        if let Some(offset) = next_button
            .and_then(|a| a.value().attr("href"))
            .and_then(offset_of)
        {
            if offset > current_offset {
                return Some(offset);
            }
        }

        // Otherwise any link further along implies one more page.
        let furthest = document
            .select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(offset_of)
            .max()?;

        (furthest > current_offset).then(|| current_offset + self.page_size)
    }
}
