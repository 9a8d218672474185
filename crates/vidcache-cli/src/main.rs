//! vidcache - inspect and maintain the local video cache.
//!
//! Opens the cache directory once, runs a single command against it, and
//! closes the store before exiting.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidcache_core::{Config, FileStore, NewVideo, VideoCache, VideoRecord, VideoStore};

/// Environment variable overriding the configured cache directory
const CACHE_DIR_ENV: &str = "VIDCACHE_CACHE_DIR";

/// Environment variable enabling a daily log file in the given directory
const LOG_DIR_ENV: &str = "VIDCACHE_LOG_DIR";

const USAGE: &str = "\
Usage: vidcache <command>

Commands:
  status              Show record count and last refresh time
  list                Print every cached record as JSON
  stale [hours]       Print records older than the threshold (config default: 24)
  import <file.json>  Bulk refresh from a JSON array of records
  clear               Remove every record and the refresh time";

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level (e.g., RUST_LOG=debug).
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vidcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

enum Command {
    Status,
    List,
    Stale(Option<u64>),
    Import(PathBuf),
    Clear,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        match args.first().map(String::as_str) {
            Some("status") | None => Ok(Command::Status),
            Some("list") => Ok(Command::List),
            Some("stale") => {
                let hours = args
                    .get(1)
                    .map(|h| h.parse::<u64>())
                    .transpose()
                    .context("stale threshold must be a whole number of hours")?;
                Ok(Command::Stale(hours))
            }
            Some("import") => match args.get(1) {
                Some(path) => Ok(Command::Import(PathBuf::from(path))),
                None => bail!("import needs a file path\n\n{}", USAGE),
            },
            Some("clear") => Ok(Command::Clear),
            Some(other) => bail!("unknown command: {}\n\n{}", other, USAGE),
        }
    }
}

fn print_records(records: &[VideoRecord]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

async fn run(cache: &VideoCache<FileStore>, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Status => {
            let records = cache.fetch_all().await?;
            let age = cache.refresh_age().await;
            println!("Cache directory: {}", cache.store().dir().display());
            println!("Records:         {}", records.len());
            match age.refreshed_at() {
                Some(at) => println!("Last refresh:    {} ({})", at.to_rfc3339(), age),
                None => println!("Last refresh:    {}", age),
            }
            let threshold = config.stale_threshold();
            println!(
                "Refresh due:     {}",
                if cache.refresh_due(threshold).await { "yes" } else { "no" }
            );
        }
        Command::List => {
            print_records(&cache.fetch_all().await?)?;
        }
        Command::Stale(hours) => {
            let threshold = hours
                .map(|h| Duration::from_secs(h.saturating_mul(3600)))
                .unwrap_or_else(|| config.stale_threshold());
            print_records(&cache.find_stale(threshold).await)?;
        }
        Command::Import(path) => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let videos: Vec<NewVideo> = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            let ids = cache.store_all(videos).await?;
            println!("Stored {} records", ids.len());
        }
        Command::Clear => {
            cache.clear_all().await?;
            println!("Cache cleared");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("-h" | "--help" | "help")) {
        println!("{}", USAGE);
        return Ok(());
    }
    let command = Command::parse(&args)?;

    let config = Config::load()?;
    let cache_dir = match std::env::var_os(CACHE_DIR_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => config.cache_dir()?,
    };

    let store = Arc::new(
        FileStore::open(&cache_dir)
            .await
            .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?,
    );
    info!(dir = %cache_dir.display(), "Video cache opened");

    let cache = VideoCache::new(Arc::clone(&store));
    let result = run(&cache, &config, command).await;

    store.close().await?;
    result
}
