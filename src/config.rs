use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::cli::{PipelineArgs, StoreArgs};
use crate::sync::{SyncConfig, DEFAULT_WORKERS};

/// Where the mirrored objects live.
#[derive(Clone)]
pub enum StorageProvider {
    R2 {
        account_id: String,
        access_key_id: String,
        secret_access_key: String,
    },
    Aws {
        region: String,
    },
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageProvider::R2 { account_id, .. } => f
                .debug_struct("R2")
                .field("account_id", account_id)
                .field("access_key_id", &"<redacted>")
                .field("secret_access_key", &"<redacted>")
                .finish(),
            StorageProvider::Aws { region } => {
                f.debug_struct("Aws").field("region", region).finish()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bucket: String,
    pub provider: StorageProvider,
    pub endpoint_url: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl StoreConfig {
    /// R2 wins when an account ID is present; otherwise an AWS region is
    /// required.
    pub fn from_args(args: &StoreArgs) -> anyhow::Result<Self> {
        let bucket = args.bucket.trim().to_string();
        if bucket.is_empty() {
            anyhow::bail!("BUCKET_NAME must not be empty");
        }

        let provider = if let Some(account_id) = non_empty(&args.r2_account_id) {
            let (Some(access_key_id), Some(secret_access_key)) = (
                non_empty(&args.r2_access_key_id),
                non_empty(&args.r2_secret_access_key),
            ) else {
                anyhow::bail!(
                    "R2_ACCOUNT_ID is set but R2_ACCESS_KEY_ID and R2_SECRET_ACCESS_KEY are not both set"
                );
            };
            StorageProvider::R2 {
                account_id,
                access_key_id,
                secret_access_key,
            }
        } else if let Some(region) = non_empty(&args.aws_region) {
            StorageProvider::Aws { region }
        } else {
            anyhow::bail!(
                "No storage provider configured: set R2_ACCOUNT_ID (with R2 keys) or AWS_REGION"
            );
        };

        Ok(Self {
            bucket,
            provider,
            endpoint_url: non_empty(&args.endpoint_url),
        })
    }
}

/// Settings for one pipeline run, resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub placeholder_path: PathBuf,
    pub photo_timeout: Duration,
    pub max_photo_bytes: u64,
    pub workers: usize,
    pub max_edge: u32,
    pub dry_run: bool,
    pub repair_transcoded: bool,
    pub no_progress_bar: bool,
}

impl PipelineConfig {
    pub fn from_args(args: &PipelineArgs) -> anyhow::Result<Self> {
        if args.photo_timeout_secs == 0 {
            anyhow::bail!("--photo-timeout-secs must be greater than zero");
        }
        if args.max_edge == 0 {
            anyhow::bail!("--max-edge must be greater than zero");
        }
        Ok(Self {
            placeholder_path: expand_tilde(&args.placeholder),
            photo_timeout: Duration::from_secs(args.photo_timeout_secs),
            max_photo_bytes: args.max_photo_bytes,
            workers: effective_workers(args.workers),
            max_edge: args.max_edge,
            dry_run: args.dry_run,
            repair_transcoded: args.repair_transcoded,
            no_progress_bar: args.no_progress_bar,
        })
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            workers: self.workers,
            dry_run: self.dry_run,
            repair_transcoded: self.repair_transcoded,
            no_progress_bar: self.no_progress_bar,
        }
    }
}

/// Unset or non-positive worker counts fall back to the default; huge ones
/// are capped at what the worker semaphore can hold.
pub fn effective_workers(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n > 0 => usize::try_from(n)
            .unwrap_or(Semaphore::MAX_PERMITS)
            .min(Semaphore::MAX_PERMITS),
        _ => DEFAULT_WORKERS,
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
