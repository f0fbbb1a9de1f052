use anyhow::Context;
use clap::Parser;
use kemosync::types::DEFAULT_USER_AGENT;
use kemosync::{sync_user, SyncConfig, SyncRequest};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kemosync")]
#[command(about = "Download all media from a creator's posts", long_about = None)]
#[command(version)]
struct Args {
    /// Creator id (e.g., 167293545)
    #[arg(short, long)]
    user_id: String,

    /// Output directory
    #[arg(short, long, default_value = "./downloads")]
    output: PathBuf,

    /// Log file path (appended to)
    #[arg(long, default_value = "kemosync.log")]
    log_file: PathBuf,

    /// Log to stderr only
    #[arg(long)]
    no_log_file: bool,

    /// Logging level
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"], ignore_case = true)]
    log_level: String,

    /// Re-download files that already exist
    #[arg(long)]
    no_skip_existing: bool,

    /// Maximum number of posts to process (default: all)
    #[arg(long)]
    max_posts: Option<usize>,

    /// Site base URL
    #[arg(long, default_value = "https://kemono.cr")]
    base_url: String,

    /// Service segment of the listing URL
    #[arg(long, default_value = "patreon")]
    service: String,

    /// Attempts per request, including the first
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Delay between attempts (e.g. "2s", "500ms")
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    retry_delay: Duration,

    /// Delay between listing page requests
    #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
    request_delay: Duration,

    /// Per-request timeout
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// User-Agent header sent with every request
    #[arg(long)]
    user_agent: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// Maximum concurrent downloads
    #[arg(short = 'j', long, default_value_t = 30)]
    max_concurrent: usize,

    /// Minimum time between two download starts
    #[arg(long, default_value = "20ms", value_parser = humantime::parse_duration)]
    rate_limit_delay: Duration,

    /// Downloads per batch
    #[arg(long, default_value_t = 50)]
    batch_size: usize,

    /// Pause after each batch
    #[arg(long, default_value = "300ms", value_parser = humantime::parse_duration)]
    batch_pause: Duration,

    /// Posts per listing page, used when the next page has to be inferred
    #[arg(long, default_value_t = 50)]
    page_size: u64,

    /// Parallel workers extracting media links from posts
    #[arg(long, default_value_t = 5)]
    extract_workers: usize,
}

impl Args {
    fn log_file(&self) -> Option<&Path> {
        (!self.no_log_file).then_some(self.log_file.as_path())
    }

    fn config(&self) -> SyncConfig {
        SyncConfig {
            base_url: self.base_url.clone(),
            service: self.service.clone(),
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            request_delay: self.request_delay,
            timeout: self.timeout,
            verify_ssl: !self.insecure,
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            max_concurrent_downloads: self.max_concurrent,
            skip_existing: !self.no_skip_existing,
            rate_limit_delay: self.rate_limit_delay,
            batch_size: self.batch_size,
            batch_pause: self.batch_pause,
            page_size: self.page_size,
            extract_workers: self.extract_workers,
            ..SyncConfig::default()
        }
    }
}

/// Logs to stderr, and additionally to `log_file` without ANSI colors.
fn init_tracing(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kemosync={}", log_level.to_lowercase())));

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_file())?;

    info!("🚀 kemosync - creator media downloader");
    info!("User ID: {}", args.user_id);
    info!("Output directory: {:?}", args.output);

    let config = args.config();
    let request = SyncRequest {
        user_id: args.user_id.clone(),
        output_dir: args.output.clone(),
        max_posts: args.max_posts,
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, letting in-flight downloads finish");
            interrupt.cancel();
        }
    });

    match sync_user(&config, &request, cancel).await {
        Ok(report) => {
            println!("\n{}", report.summary);
            if report.summary.interrupted {
                warn!("Download interrupted by user");
                std::process::exit(1);
            }
            info!(
                "✅ Processed {} posts ({} with media)",
                report.posts, report.media_posts
            );
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {}", e);
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        let args = Args::try_parse_from(["kemosync", "-u", "42"]).unwrap();
        let config = args.config();
        let defaults = SyncConfig::default();

        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.retry_delay, defaults.retry_delay);
        assert_eq!(config.max_concurrent_downloads, defaults.max_concurrent_downloads);
        assert!(config.skip_existing);
        assert_eq!(args.log_file(), Some(Path::new("kemosync.log")));
    }

    #[test]
    fn test_log_file_can_be_disabled() {
        let args = Args::try_parse_from(["kemosync", "-u", "42", "--no-log-file"]).unwrap();
        assert_eq!(args.log_file(), None);
    }

    #[test]
    fn test_user_agent_and_durations_from_flags() {
        let args = Args::try_parse_from([
            "kemosync",
            "-u",
            "42",
            "--user-agent",
            "kemosync-test/1.0",
            "--rate-limit-delay",
            "250ms",
            "--no-skip-existing",
        ])
        .unwrap();
        let config = args.config();

        assert_eq!(config.user_agent, "kemosync-test/1.0");
        assert_eq!(config.rate_limit_delay, Duration::from_millis(250));
        assert!(!config.skip_existing);
    }
}
