//! Mirror the Go module index into a local SQLite database.
//!
//! ```bash
//! # Catch up with the index, resuming from the newest stored record.
//! modindex update
//!
//! # Same, but only report what would be written.
//! modindex update --dry-run
//!
//! # What's in the mirror right now.
//! modindex --database ./index.db status
//! ```
//!
//! Ctrl+C stops an update after the batch in flight has been committed.

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use exn::ResultExt;
use futures::StreamExt;
use modindex_config::Config;
use modindex_feed::{FeedClient, FeedHandle, format_timestamp};
use modindex_store::{Database, Repository};
use modindex_sync::{SyncEvent, Synchronizer};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

type Error = exn::Exn<ErrorKind>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("could not open the mirror database")]
    Database,
    #[display("could not set up the feed client")]
    Feed,
    #[display("synchronization failed")]
    Sync,
}

#[derive(Parser, Debug)]
#[command(name = "modindex")]
#[command(about = "Mirror the Go module index into SQLite")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mirror database, overriding the configured one
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch everything published since the newest stored record
    Update {
        /// Fetch and reconcile, but don't write anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show what the mirror holds
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = modindex_config::load(args.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(database) = args.database {
        config.database = database;
    }
    match args.command {
        Command::Update { dry_run } => update(&config, dry_run).await,
        Command::Status => status(&config).await,
    }
}

async fn open(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
    }
    tracing::debug!(path = %config.database.display(), "opening mirror database");
    Database::connect(&config.database).await.or_raise(|| ErrorKind::Database)
}

async fn update(config: &Config, dry_run: bool) -> Result<()> {
    let db = open(config).await?;
    let client = FeedClient::new(&config.feed.url, config.feed.timeout(), &config.feed.user_agent)
        .or_raise(|| ErrorKind::Feed)?;
    let feed: FeedHandle = Arc::new(client);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted; stopping after the current batch");
                cancel.cancel();
            }
        }
    });

    let sync = Synchronizer::new(feed, Repository::new(db.pool().clone(), dry_run))
        .with_limit(config.feed.limit)
        .with_cancellation(cancel);
    let result = report(&sync).await;
    db.close().await;
    result
}

/// Drive the synchronizer, printing progress reports as they arrive.
async fn report(sync: &Synchronizer) -> Result<()> {
    let (mut written, mut anomalies) = (0u64, 0u64);
    let mut events = std::pin::pin!(sync.events());
    while let Some(event) = events.next().await {
        match event.or_raise(|| ErrorKind::Sync)? {
            SyncEvent::Started { cursor: Some(cursor) } => println!("Resuming after {}", cursor.debug_string()),
            SyncEvent::Started { cursor: None } => println!("Empty mirror; starting from the beginning of the index"),
            SyncEvent::Progress(progress) => println!("{progress}"),
            SyncEvent::Anomaly(anomaly) => {
                anomalies += 1;
                println!("Anomaly: {anomaly}");
            },
            SyncEvent::Committed { written: count, .. } => written += count,
            SyncEvent::CaughtUp => println!("Caught up: {written} versions written, {anomalies} anomalies"),
            SyncEvent::Cancelled => println!("Cancelled: {written} versions written, {anomalies} anomalies"),
        }
    }
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let db = open(config).await?;
    let repo = Repository::from(&db);
    let paths = repo.count_paths().await.or_raise(|| ErrorKind::Database)?;
    let versions = repo.count_versions().await.or_raise(|| ErrorKind::Database)?;
    let last = repo.last_record().await.or_raise(|| ErrorKind::Database)?;
    db.close().await;

    println!("{:<10} {}", "Database", config.database.display());
    println!("{:<10} {}", "Paths", paths);
    println!("{:<10} {}", "Versions", versions);
    match last {
        Some(record) => {
            let timestamp = format_timestamp(&record.timestamp).or_raise(|| ErrorKind::Database)?;
            println!("{:<10} {} ({})", "Newest", record, timestamp);
        },
        None => println!("{:<10} none", "Newest"),
    }
    Ok(())
}
