use std::path::PathBuf;

use thiserror::Error;

/// Failures while pulling check-ins from a source. All of them end the run.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed API returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("failed to decode feed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("checkin {id} has an unparseable timestamp {value:?}")]
    Timestamp { id: u64, value: String },

    #[error("unparseable pagination cursor {url:?}: {reason}")]
    Pagination { url: String, reason: String },

    #[error("failed to read export file {path}: {source}")]
    Import { path: PathBuf, source: csv::Error },

    #[error("feed request cancelled")]
    Cancelled,
}
