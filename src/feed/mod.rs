//! Item sources: the paginated feed API and static export batches.
//!
//! Both hand out check-ins one page at a time through [`ItemSource::fetch`],
//! so the pipeline never holds more than a page of records in memory.

pub mod batch;
pub mod client;
pub mod error;
pub mod types;

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use batch::BatchSource;
pub use client::FeedClient;
pub use error::FeedError;
pub use types::{Beer, Brewery, CheckinRecord, Venue};

/// Why a source stopped producing pages. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RateLimited,
    EmptyPage,
    NoMorePages,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::RateLimited => "rate limit reached",
            StopReason::EmptyPage => "empty page",
            StopReason::NoMorePages => "no more pages",
        })
    }
}

#[derive(Debug)]
pub enum Page {
    /// A batch of records plus the cursor for the following page, if any.
    Items {
        checkins: Vec<CheckinRecord>,
        next: Option<u64>,
    },
    Done(StopReason),
}

#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Fetch the page starting at `cursor`; `None` requests the first page.
    async fn fetch(
        &self,
        cursor: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Page, FeedError>;

    /// Whether this source resumes from, and advances, the persisted cursor.
    ///
    /// Such sources deliver records newest-first, so the first record of the
    /// first page is the newest one overall.
    fn tracks_cursor(&self) -> bool;
}
