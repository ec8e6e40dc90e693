use clap::{Args, Parser, Subcommand};

use crate::feed::batch::DEFAULT_PAGE_SIZE;
use crate::feed::client::DEFAULT_API_BASE;
use crate::photo::transcode::DEFAULT_MAX_EDGE;
use crate::photo::{DEFAULT_MAX_BYTES, DEFAULT_TIMEOUT};
use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "untappd-mirror",
    version,
    about = "Mirror Untappd check-ins and their photos into S3-compatible storage"
)]
pub struct Cli {
    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mirror new check-ins from the feed API
    Sync(SyncArgs),

    /// Mirror every check-in from an exported CSV file
    Backfill(BackfillArgs),

    /// Show the latest mirrored check-in
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// API access token.
    /// Prefer the UNTAPPD_ACCESS_TOKEN environment variable; flags are
    /// visible in process listings.
    #[arg(long, env = "UNTAPPD_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,

    /// Feed API base URL
    #[arg(long, env = "UNTAPPD_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// CSV export to import
    #[arg(long)]
    pub csv: String,

    /// Check-ins handed to the worker pool per batch
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Bucket that receives the mirrored photos
    #[arg(long, env = "BUCKET_NAME")]
    pub bucket: String,

    /// Cloudflare account ID; selects R2 when set
    #[arg(long, env = "R2_ACCOUNT_ID")]
    pub r2_account_id: Option<String>,

    /// R2 access key ID
    #[arg(long, env = "R2_ACCESS_KEY_ID", hide_env_values = true)]
    pub r2_access_key_id: Option<String>,

    /// R2 secret access key
    #[arg(long, env = "R2_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub r2_secret_access_key: Option<String>,

    /// AWS region; selects S3 with the default credential chain
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// Custom S3 endpoint (MinIO, LocalStack); forces path-style addressing
    #[arg(long, env = "S3_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Concurrent check-ins (unset or <= 0 uses the default of 10)
    #[arg(long, env = "WORKERS", allow_negative_numbers = true)]
    pub workers: Option<i64>,

    /// Image stored for check-ins without a photo
    #[arg(long, env = "PLACEHOLDER_PHOTO_PATH", default_value = "assets/missing.jpg")]
    pub placeholder: String,

    /// Photo download timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub photo_timeout_secs: u64,

    /// Largest photo accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BYTES)]
    pub max_photo_bytes: u64,

    /// Longest edge of the transcoded copy, in pixels
    #[arg(long, default_value_t = DEFAULT_MAX_EDGE)]
    pub max_edge: u32,

    /// Log what would be stored without downloading or uploading anything
    #[arg(long)]
    pub dry_run: bool,

    /// Rebuild missing transcoded copies of already mirrored check-ins
    #[arg(long)]
    pub repair_transcoded: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}
