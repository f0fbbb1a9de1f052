//! Filename derivation for downloaded media, plus byte formatting for summaries.

use regex::Regex;
use std::sync::LazyLock;

/// Extensions accepted when synthesizing a fallback name.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];

const DEFAULT_EXTENSION: &str = ".png";

/// Longest filename kept after sanitizing.
const MAX_FILENAME_CHARS: usize = 200;

static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([a-zA-Z0-9]+)(?:\?|$)").unwrap());

/// Derives the on-disk filename for a media URL.
///
/// The last path segment (query string removed) is used when it is longer than
/// five characters; otherwise the name is `image_NNN.ext` built from `index`.
pub fn media_filename(url: &str, index: usize) -> String {
    let original = url
        .rsplit('/')
        .next()
        .and_then(|segment| segment.split('?').next())
        .unwrap_or("");

    if original.chars().count() > 5 {
        let sanitized = sanitize_filename(original);
        if !sanitized.is_empty() {
            return sanitized;
        }
    }

    format!("image_{:03}{}", index, file_extension(url))
}

/// Image extension of `url` including the dot, `.png` when absent or not an image.
pub fn file_extension(url: &str) -> String {
    EXTENSION
        .captures(url)
        .map(|caps| caps[1].to_ascii_lowercase())
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Strips characters that are invalid in filenames on common filesystems.
///
/// Overlong names are cut to 200 characters, keeping the extension.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_ascii_control())
        .collect();

    let cleaned = if cleaned.chars().count() > MAX_FILENAME_CHARS {
        let (stem, ext) = match cleaned.rfind('.') {
            Some(dot) if dot > 0 => cleaned.split_at(dot),
            _ => (cleaned.as_str(), ""),
        };
        let keep = MAX_FILENAME_CHARS.saturating_sub(ext.chars().count());
        let stem: String = stem.chars().take(keep).collect();
        format!("{}{}", stem, ext)
    } else {
        cleaned
    };

    cleaned.trim().to_string()
}

/// Formats a byte count as `1.5 MB` style text (base 1024).
pub fn format_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            media_filename("https://n1.kemono.cr/data/ab/cd/abc.jpg?x=1", 1),
            "abc.jpg"
        );
        assert_eq!(
            media_filename("https://n1.kemono.cr/data/ab/cd/0f3a9c.webp", 4),
            "0f3a9c.webp"
        );
    }

    #[test]
    fn test_short_segment_falls_back_to_index() {
        assert_eq!(media_filename("https://n1.kemono.cr/data/x", 7), "image_007.png");
        assert_eq!(media_filename("https://n1.kemono.cr/data/a.GIF", 12), "image_012.gif");
        assert_eq!(media_filename("https://n1.kemono.cr/data/", 1), "image_001.png");
    }

    #[test]
    fn test_unusable_name_falls_back_to_index() {
        assert_eq!(media_filename("https://n1/data/<<<>>>?q", 2), "image_002.png");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("https://n1/data/photo.JPEG"), ".jpeg");
        assert_eq!(file_extension("https://n1/data/photo.png?f=1"), ".png");
        assert_eq!(file_extension("https://n1/data/archive.zip"), ".png");
        assert_eq!(file_extension("https://n1/data/noext"), ".png");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a<b>c:d\"e|f?g*h.png"), "abcdefgh.png");
        assert_eq!(sanitize_filename(" tab\there.jpg "), "tabhere.jpg");

        let long = format!("{}.jpg", "x".repeat(250));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.chars().count(), 200);
        assert!(sanitized.ends_with(".jpg"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.0 B");
        assert_eq!(format_bytes(512), "512.0 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 * 1024), "3.0 TB");
    }
}
