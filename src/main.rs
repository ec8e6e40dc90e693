//! untappd-mirror: incremental mirror of an Untappd check-in feed.
//!
//! Each run reads the persisted cursor from object storage, pages through
//! new check-ins, downloads each photo (or a placeholder), stores it as the
//! original JPEG plus a WebP copy under date-partitioned keys, and moves the
//! cursor forward once.

#![warn(clippy::all)]

mod cli;
mod config;
mod feed;
mod photo;
mod shutdown;
mod store;
mod sync;
mod types;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::{PipelineConfig, StoreConfig};
use feed::{BatchSource, FeedClient, ItemSource};
use photo::{HttpPhotoAcquirer, WebpTranscoder};
use store::{CheckinStore, S3BlobStore};
use sync::Pipeline;

async fn open_store(config: &StoreConfig) -> Arc<CheckinStore> {
    tracing::debug!(?config, "Connecting to object storage");
    let backend = S3BlobStore::connect(config).await;
    Arc::new(CheckinStore::new(Arc::new(backend)))
}

/// Run the pipeline over `source` until it stops, printing a summary.
async fn run_pipeline(
    source: Arc<dyn ItemSource>,
    store: Arc<CheckinStore>,
    config: &PipelineConfig,
) -> anyhow::Result<()> {
    if !config.dry_run && !config.placeholder_path.exists() {
        tracing::warn!(
            "Placeholder {} not found; check-ins without a photo will fail",
            config.placeholder_path.display()
        );
    }

    let photos = HttpPhotoAcquirer::new(
        config.placeholder_path.clone(),
        config.photo_timeout,
        config.max_photo_bytes,
    )
    .context("Failed to build photo download client")?;
    let transcoder = WebpTranscoder::new(config.max_edge);

    tracing::info!(
        workers = config.workers,
        dry_run = config.dry_run,
        "Starting sync"
    );
    let pipeline = Pipeline::new(
        source,
        store,
        Arc::new(photos),
        Arc::new(transcoder),
        config.sync_config(),
    );

    let shutdown_token = shutdown::install_signal_handler();
    let summary = pipeline.run(shutdown_token).await?;
    if summary.failed > 0 {
        tracing::warn!(
            "{} checkins failed; the next run will retry them",
            summary.failed
        );
    }
    Ok(())
}

async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let store_config = StoreConfig::from_args(&args.store)?;
    let pipeline_config = PipelineConfig::from_args(&args.pipeline)?;
    if args.access_token.trim().is_empty() {
        anyhow::bail!("UNTAPPD_ACCESS_TOKEN must not be empty");
    }

    let source = FeedClient::new(&args.api_base, args.access_token.trim())
        .context("Failed to build feed client")?;
    let store = open_store(&store_config).await;
    run_pipeline(Arc::new(source), store, &pipeline_config).await
}

async fn run_backfill(args: cli::BackfillArgs) -> anyhow::Result<()> {
    let store_config = StoreConfig::from_args(&args.store)?;
    let pipeline_config = PipelineConfig::from_args(&args.pipeline)?;

    let csv_path = config::expand_tilde(&args.csv);
    let source = BatchSource::from_csv_path(&csv_path, args.page_size)?;
    if source.is_empty() {
        println!("No check-ins found in {}", csv_path.display());
        return Ok(());
    }
    tracing::info!("Backfilling {} checkins from {}", source.len(), csv_path.display());
    let store = open_store(&store_config).await;
    run_pipeline(Arc::new(source), store, &pipeline_config).await
}

async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let store_config = StoreConfig::from_args(&args.store)?;
    let store = open_store(&store_config).await;

    println!("Bucket: {}", store_config.bucket);
    match store.get_cursor(&CancellationToken::new()).await? {
        Some(cursor) => {
            println!("Latest mirrored checkin: {}", cursor.id);
            if let Some(created_at) = cursor.created_at {
                println!(
                    "Checked in at:           {}",
                    created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        None => {
            println!("No latest pointer found.");
            println!("The next sync mirrors only the newest checkin and starts tracking from there.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.command {
        Command::Sync(args) => run_sync(args).await,
        Command::Backfill(args) => run_backfill(args).await,
        Command::Status(args) => run_status(args).await,
    }
}
