use thiserror::Error;

use crate::feed::FeedError;
use crate::photo::PhotoError;
use crate::store::StoreError;

/// Run-level failures. Anything here ends the run with a non-zero exit.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Feed error: {0}")]
    Feed(FeedError),

    #[error("Failed to read the latest pointer: {0}")]
    Cursor(StoreError),

    #[error("Sync cancelled before completion")]
    Cancelled,
}

impl From<FeedError> for SyncError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Cancelled => SyncError::Cancelled,
            other => SyncError::Feed(other),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Cancelled => SyncError::Cancelled,
            other => SyncError::Cursor(other),
        }
    }
}

/// Why a single check-in could not be mirrored, tagged by pipeline stage.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("existence check failed: {0}")]
    Lookup(StoreError),

    #[error("photo acquisition failed: {0}")]
    Acquire(PhotoError),

    #[error("transcode failed: {0}")]
    Transcode(PhotoError),

    #[error("upload failed: {0}")]
    Upload(StoreError),
}

impl ItemError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ItemError::Lookup(StoreError::Cancelled)
                | ItemError::Upload(StoreError::Cancelled)
                | ItemError::Acquire(PhotoError::Cancelled)
        )
    }

    /// Failures at the photo's origin are routine (deleted photos, slow CDN)
    /// and logged quieter than storage or decoding failures.
    pub fn is_remote_photo_failure(&self) -> bool {
        matches!(self, ItemError::Acquire(e) if e.is_remote())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_feed_maps_to_cancelled() {
        assert!(matches!(SyncError::from(FeedError::Cancelled), SyncError::Cancelled));
    }

    #[test]
    fn test_cancelled_store_maps_to_cancelled() {
        assert!(matches!(SyncError::from(StoreError::Cancelled), SyncError::Cancelled));
    }

    #[test]
    fn test_store_error_maps_to_cursor() {
        let e = SyncError::from(StoreError::InvalidCursor {
            key: "latest.jpg".into(),
            reason: "missing id metadata".into(),
        });
        assert!(matches!(e, SyncError::Cursor(_)));
    }

    #[test]
    fn test_item_cancellation_detected() {
        assert!(ItemError::Upload(StoreError::Cancelled).is_cancelled());
        assert!(ItemError::Acquire(PhotoError::Cancelled).is_cancelled());
        assert!(!ItemError::Upload(StoreError::NotFound("k".into())).is_cancelled());
    }

    #[test]
    fn test_remote_photo_failure() {
        let e = ItemError::Acquire(PhotoError::HttpStatus {
            status: 404,
            url: "u".into(),
        });
        assert!(e.is_remote_photo_failure());
        assert!(!ItemError::Lookup(StoreError::NotFound("k".into())).is_remote_photo_failure());
    }
}
