//! Sync engine: pages through an item source and mirrors each check-in
//! with bounded concurrency.
//!
//! Pages are fetched one at a time. Within a page every check-in runs on its
//! own task, gated by a semaphore so at most `workers` items are between
//! photo acquisition and their final upload. After the first page drains,
//! the latest pointer is moved to that page's first (newest) record, once
//! per run.

pub mod error;

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::feed::{CheckinRecord, ItemSource, Page, StopReason};
use crate::photo::transcode::transcode_blocking;
use crate::photo::{PhotoSource, Transcoder};
use crate::store::{ArtifactFormat, CheckinStore, StorageKey};

pub use error::{ItemError, SyncError};

pub const DEFAULT_WORKERS: usize = 10;

/// Subset of application config consumed by the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub(crate) workers: usize,
    pub(crate) dry_run: bool,
    pub(crate) repair_transcoded: bool,
    pub(crate) no_progress_bar: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            dry_run: false,
            repair_transcoded: false,
            no_progress_bar: false,
        }
    }
}

#[derive(Debug)]
pub enum ProcessingOutcome {
    Stored,
    Skipped,
    /// The original was present but its transcoded copy had to be rebuilt.
    Repaired,
    Failed(ItemError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: usize,
    pub stored: usize,
    pub skipped: usize,
    pub repaired: usize,
    pub failed: usize,
    pub stop: Option<StopReason>,
    /// Cursor written by this run, if it moved.
    pub cursor: Option<u64>,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record(&mut self, outcome: &ProcessingOutcome) {
        match outcome {
            ProcessingOutcome::Stored => self.stored += 1,
            ProcessingOutcome::Skipped => self.skipped += 1,
            ProcessingOutcome::Repaired => self.repaired += 1,
            ProcessingOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn log(&self, dry_run: bool, interrupted: bool) {
        if dry_run {
            tracing::info!("── Dry Run Summary ──");
            tracing::info!(
                "  {} checkins would be stored, {} already present",
                self.stored,
                self.skipped
            );
        } else {
            tracing::info!("── Summary ──");
            tracing::info!(
                "  {} stored, {} skipped, {} failed across {} page(s)",
                self.stored,
                self.skipped,
                self.failed,
                self.pages
            );
        }
        if self.repaired > 0 {
            tracing::info!("  {} transcoded copies repaired", self.repaired);
        }
        if interrupted {
            tracing::info!("  Interrupted by shutdown");
        } else if let Some(stop) = self.stop {
            tracing::info!("  stopped: {}", stop);
        }
        match self.cursor {
            Some(id) => tracing::info!("  latest: {}", id),
            None => tracing::info!("  latest pointer unchanged"),
        }
        tracing::info!("  elapsed: {}", format_duration(self.elapsed));
    }
}

/// Set-once guard for the latest pointer, scoped to one run.
enum CursorAdvance {
    Pending,
    Done,
}

pub struct Pipeline {
    source: Arc<dyn ItemSource>,
    store: Arc<CheckinStore>,
    worker: ItemWorker,
    config: SyncConfig,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ItemSource>,
        store: Arc<CheckinStore>,
        photos: Arc<dyn PhotoSource>,
        transcoder: Arc<dyn Transcoder>,
        config: SyncConfig,
    ) -> Self {
        let worker = ItemWorker {
            store: store.clone(),
            photos,
            transcoder,
            dry_run: config.dry_run,
            repair_transcoded: config.repair_transcoded,
        };
        Self {
            source,
            store,
            worker,
            config,
        }
    }

    /// Mirror pages until the source runs dry, is rate limited, or fails.
    ///
    /// Per-item failures are counted in the summary and never end the run.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, SyncError> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        let persisted = if self.source.tracks_cursor() {
            let cursor = self.store.get_cursor(&cancel).await?;
            match &cursor {
                Some(c) => tracing::info!("Resuming after checkin {}", c.id),
                None => tracing::info!("No latest pointer found, starting from the newest checkin"),
            }
            cursor.map(|c| c.id)
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(self.config.workers.clamp(1, Semaphore::MAX_PERMITS)));
        let mut advance = CursorAdvance::Pending;
        let mut cursor = persisted;

        loop {
            if cancel.is_cancelled() {
                return Err(self.interrupted(summary, started));
            }

            let (checkins, next) = match self.source.fetch(cursor, &cancel).await? {
                Page::Done(reason) => {
                    tracing::debug!("Source finished: {}", reason);
                    summary.stop = Some(reason);
                    break;
                }
                Page::Items { checkins, next } => (checkins, next),
            };
            summary.pages += 1;
            tracing::info!(page = summary.pages, "Processing {} checkins", checkins.len());

            let newest = checkins.first().map(|c| (c.id, c.created_at));
            self.dispatch_page(checkins, &semaphore, &cancel, &mut summary)
                .await;

            if cancel.is_cancelled() {
                return Err(self.interrupted(summary, started));
            }

            if let CursorAdvance::Pending = advance {
                advance = CursorAdvance::Done;
                if let Some((id, created_at)) = newest {
                    self.advance_cursor(persisted, id, &created_at, &cancel, &mut summary)
                        .await;
                }
            }

            match next {
                Some(next) => cursor = Some(next),
                None => {
                    summary.stop = Some(StopReason::NoMorePages);
                    break;
                }
            }
        }

        summary.elapsed = started.elapsed();
        summary.log(self.config.dry_run, false);
        Ok(summary)
    }

    fn interrupted(&self, mut summary: RunSummary, started: Instant) -> SyncError {
        summary.elapsed = started.elapsed();
        summary.log(self.config.dry_run, true);
        SyncError::Cancelled
    }

    /// Run every check-in of a page through the worker pool and wait for all
    /// of them.
    async fn dispatch_page(
        &self,
        checkins: Vec<CheckinRecord>,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) {
        let pb = create_progress_bar(self.config.no_progress_bar, checkins.len() as u64);
        let mut tasks = JoinSet::new();

        for checkin in checkins {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    pb.suspend(|| tracing::info!("Shutdown requested, not starting further checkins"));
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let worker = self.worker.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = worker.process(&checkin, &cancel).await;
                drop(permit);
                (checkin.id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, outcome)) => {
                    report(&pb, id, &outcome);
                    summary.record(&outcome);
                }
                Err(e) => {
                    pb.suspend(|| tracing::error!("Checkin task panicked: {}", e));
                    summary.failed += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
    }

    async fn advance_cursor(
        &self,
        persisted: Option<u64>,
        id: u64,
        created_at: &chrono::DateTime<chrono::Utc>,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) {
        if !self.source.tracks_cursor() {
            return;
        }
        if persisted.is_some_and(|current| id <= current) {
            tracing::debug!(
                checkin_id = id,
                "Latest pointer already at or past this checkin"
            );
            return;
        }
        if self.config.dry_run {
            tracing::info!("[DRY RUN] Would advance latest pointer to {}", id);
            return;
        }
        let result = match self.store.set_cursor(id, created_at, cancel).await {
            // Newest original was never stored; write the pointer from the placeholder.
            Err(e) if e.is_not_found() => self.put_cursor_fallback(id, created_at, cancel).await,
            other => other.map_err(ItemError::Upload),
        };
        match result {
            Ok(()) => summary.cursor = Some(id),
            // The next run sees the old cursor and retries from there.
            Err(e) => tracing::warn!(checkin_id = id, "Failed to advance latest pointer: {}", e),
        }
    }

    async fn put_cursor_fallback(
        &self,
        id: u64,
        created_at: &chrono::DateTime<chrono::Utc>,
        cancel: &CancellationToken,
    ) -> Result<(), ItemError> {
        tracing::debug!(checkin_id = id, "Newest original missing, writing pointer from placeholder");
        let body = self
            .worker
            .photos
            .acquire(None, cancel)
            .await
            .map_err(ItemError::Acquire)?;
        self.store
            .put_cursor(id, created_at, body, cancel)
            .await
            .map_err(ItemError::Upload)
    }
}

fn report(pb: &ProgressBar, id: u64, outcome: &ProcessingOutcome) {
    match outcome {
        ProcessingOutcome::Failed(e) if e.is_cancelled() => {
            tracing::debug!(checkin_id = id, "Cancelled");
        }
        ProcessingOutcome::Failed(e) if e.is_remote_photo_failure() => {
            pb.suspend(|| tracing::warn!(checkin_id = id, "Failed to mirror checkin: {}", e));
        }
        ProcessingOutcome::Failed(e) => {
            pb.suspend(|| tracing::error!(checkin_id = id, "Failed to mirror checkin: {}", e));
        }
        ProcessingOutcome::Stored => tracing::debug!(checkin_id = id, "Stored"),
        ProcessingOutcome::Skipped => tracing::debug!(checkin_id = id, "Already present"),
        ProcessingOutcome::Repaired => tracing::debug!(checkin_id = id, "Repaired transcoded copy"),
    }
}

/// Everything a task needs to mirror one check-in. Cheap to clone.
#[derive(Clone)]
struct ItemWorker {
    store: Arc<CheckinStore>,
    photos: Arc<dyn PhotoSource>,
    transcoder: Arc<dyn Transcoder>,
    dry_run: bool,
    repair_transcoded: bool,
}

impl ItemWorker {
    async fn process(&self, checkin: &CheckinRecord, cancel: &CancellationToken) -> ProcessingOutcome {
        match self.try_process(checkin, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => ProcessingOutcome::Failed(e),
        }
    }

    async fn try_process(
        &self,
        checkin: &CheckinRecord,
        cancel: &CancellationToken,
    ) -> Result<ProcessingOutcome, ItemError> {
        let present = self
            .store
            .exists(checkin.id, &checkin.created_at, cancel)
            .await
            .map_err(ItemError::Lookup)?;
        if present {
            if self.repair_transcoded {
                return self.repair(checkin, cancel).await;
            }
            return Ok(ProcessingOutcome::Skipped);
        }

        if self.dry_run {
            tracing::info!(
                checkin_id = checkin.id,
                "[DRY RUN] Would store {}",
                StorageKey::new(&checkin.created_at, checkin.id, ArtifactFormat::Original)
            );
            return Ok(ProcessingOutcome::Stored);
        }

        let original = self
            .photos
            .acquire(checkin.photo_url.as_deref(), cancel)
            .await
            .map_err(ItemError::Acquire)?;
        self.store
            .put_original(original.clone(), checkin, cancel)
            .await
            .map_err(ItemError::Upload)?;
        self.store_transcoded(original, checkin, cancel).await?;
        Ok(ProcessingOutcome::Stored)
    }

    async fn repair(
        &self,
        checkin: &CheckinRecord,
        cancel: &CancellationToken,
    ) -> Result<ProcessingOutcome, ItemError> {
        let has_transcoded = self
            .store
            .exists_as(
                checkin.id,
                &checkin.created_at,
                ArtifactFormat::Transcoded,
                cancel,
            )
            .await
            .map_err(ItemError::Lookup)?;
        if has_transcoded {
            return Ok(ProcessingOutcome::Skipped);
        }

        if self.dry_run {
            tracing::info!(checkin_id = checkin.id, "[DRY RUN] Would rebuild transcoded copy");
            return Ok(ProcessingOutcome::Repaired);
        }

        let original = self
            .store
            .get_original(checkin, cancel)
            .await
            .map_err(ItemError::Lookup)?;
        self.store_transcoded(original, checkin, cancel).await?;
        Ok(ProcessingOutcome::Repaired)
    }

    async fn store_transcoded(
        &self,
        original: Vec<u8>,
        checkin: &CheckinRecord,
        cancel: &CancellationToken,
    ) -> Result<(), ItemError> {
        let webp = transcode_blocking(self.transcoder.clone(), original)
            .await
            .map_err(ItemError::Transcode)?;
        self.store
            .put_transcoded(webp, checkin, cancel)
            .await
            .map_err(ItemError::Upload)?;
        Ok(())
    }
}

/// Create a progress bar with a consistent template.
///
/// Hidden when the user passed `--no-progress-bar` or stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .map(|s| s.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    let pb = ProgressBar::new(total);
    pb.set_style(style);
    pb
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
