//! Streaming media download to disk.

use crate::error::{FetchError, SyncError};
use futures_util::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Path of the in-progress file for `filename`, unique per job.
pub(crate) fn partial_path(filename: &Path, tag: usize) -> PathBuf {
    let mut part = filename.as_os_str().to_owned();
    part.push(format!(".{}.part", tag));
    PathBuf::from(part)
}

/// Downloads `url` into `filename`, returning the number of bytes written.
///
/// The body is streamed chunk by chunk into `<filename>.<tag>.part` and renamed
/// into place once complete, so an existing `filename` always holds a whole file
/// even when two jobs resolve to the same name.
pub(crate) async fn download_file(
    client: &reqwest::Client,
    url: &str,
    filename: &Path,
    tag: usize,
) -> Result<u64, SyncError> {
    // Create parent directory if needed
    if let Some(parent) = filename.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let part = partial_path(filename, tag);
    match stream_to_file(client, url, &part).await {
        Ok(bytes) => {
            tokio::fs::rename(&part, filename).await?;
            Ok(bytes)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            Err(e)
        }
    }
}

async fn stream_to_file(
    client: &reqwest::Client,
    url: &str,
    part: &Path,
) -> Result<u64, SyncError> {
    let response = client.get(url).send().await.map_err(FetchError::from)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
        .into());
    }
    let content_length = response.content_length();

    let mut file = BufWriter::new(tokio::fs::File::create(part).await?);
    let mut byte_stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(piece) = byte_stream.next().await {
        let chunk = piece.map_err(FetchError::from)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    match content_length {
        Some(expected) if expected != written => {
            return Err(SyncError::IoError(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Size mismatch for {}: expected {} bytes, got {} bytes",
                    url, expected, written
                ),
            )));
        }
        Some(_) => {}
        None => debug!("Content-Length header was not present for {}", url),
    }

    if written == 0 {
        warn!("Empty body received for {}", url);
    }

    Ok(written)
}
