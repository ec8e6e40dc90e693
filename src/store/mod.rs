//! Object store adapter: artifact uploads, the dedup lookup and the
//! persisted cursor.
//!
//! [`CheckinStore`] speaks in check-ins and cursors; the raw object
//! operations live behind [`BlobStore`] so tests can swap S3 for memory.

pub mod error;
pub mod keys;
#[cfg(test)]
pub mod memory;
pub mod metadata;
pub mod s3;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::feed::CheckinRecord;

pub use error::StoreError;
pub use keys::{ArtifactFormat, StorageKey, LATEST_KEY};
pub use metadata::Metadata;
pub use s3::S3BlobStore;

/// Response to a HEAD request.
#[derive(Debug, Clone, Default)]
pub struct ObjectHead {
    pub metadata: HashMap<String, String>,
    pub content_length: Option<u64>,
}

/// Raw object operations.
///
/// This trait is object-safe and can be used with `Arc<dyn BlobStore>` for
/// shared access across worker tasks. A missing object must surface as
/// [`StoreError::NotFound`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn head(&self, key: &str) -> Result<ObjectHead, StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError>;

    /// Server-side copy of `source` onto `dest`, replacing its metadata.
    async fn copy(
        &self,
        source: &str,
        dest: &str,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError>;
}

/// The most recently mirrored check-in, as recorded on [`LATEST_KEY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub id: u64,
    pub created_at: Option<DateTime<Utc>>,
}

pub struct CheckinStore {
    backend: Arc<dyn BlobStore>,
}

impl CheckinStore {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self { backend }
    }

    /// Whether the original artifact for this check-in is already stored.
    pub async fn exists(
        &self,
        id: u64,
        created_at: &DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError> {
        self.exists_as(id, created_at, ArtifactFormat::Original, cancel)
            .await
    }

    pub async fn exists_as(
        &self,
        id: u64,
        created_at: &DateTime<Utc>,
        format: ArtifactFormat,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError> {
        let key = StorageKey::new(created_at, id, format);
        match cancellable(cancel, self.backend.head(key.as_str())).await {
            Ok(head) => {
                tracing::trace!(key = %key, size = ?head.content_length, "Already stored");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn put_original(
        &self,
        bytes: Vec<u8>,
        record: &CheckinRecord,
        cancel: &CancellationToken,
    ) -> Result<StorageKey, StoreError> {
        self.put_artifact(ArtifactFormat::Original, bytes, record, cancel)
            .await
    }

    pub async fn put_transcoded(
        &self,
        bytes: Vec<u8>,
        record: &CheckinRecord,
        cancel: &CancellationToken,
    ) -> Result<StorageKey, StoreError> {
        self.put_artifact(ArtifactFormat::Transcoded, bytes, record, cancel)
            .await
    }

    async fn put_artifact(
        &self,
        format: ArtifactFormat,
        bytes: Vec<u8>,
        record: &CheckinRecord,
        cancel: &CancellationToken,
    ) -> Result<StorageKey, StoreError> {
        let key = StorageKey::new(&record.created_at, record.id, format);
        let attrs = metadata::checkin_metadata(record);
        tracing::debug!(checkin_id = record.id, key = %key, size = bytes.len(), "Uploading");
        cancellable(
            cancel,
            self.backend
                .put(key.as_str(), bytes, format.content_type(), attrs),
        )
        .await?;
        Ok(key)
    }

    pub async fn get_original(
        &self,
        record: &CheckinRecord,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StoreError> {
        let key = StorageKey::new(&record.created_at, record.id, ArtifactFormat::Original);
        cancellable(cancel, self.backend.get(key.as_str())).await
    }

    /// Read the persisted cursor. `None` when nothing has been mirrored yet.
    pub async fn get_cursor(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Cursor>, StoreError> {
        let head = match cancellable(cancel, self.backend.head(LATEST_KEY)).await {
            Ok(head) => head,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let invalid = |reason: String| StoreError::InvalidCursor {
            key: LATEST_KEY.to_string(),
            reason,
        };
        let raw_id = head
            .metadata
            .get("id")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid("missing id metadata".to_string()))?;
        let id = raw_id
            .parse::<u64>()
            .map_err(|e| invalid(format!("id {raw_id:?}: {e}")))?;
        let created_at = head
            .metadata
            .get("created_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Some(Cursor { id, created_at }))
    }

    /// Point [`LATEST_KEY`] at a stored original. The original must already
    /// exist since the pointer is a server-side copy of it.
    pub async fn set_cursor(
        &self,
        id: u64,
        created_at: &DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let source = StorageKey::new(created_at, id, ArtifactFormat::Original);
        cancellable(
            cancel,
            self.backend.copy(
                source.as_str(),
                LATEST_KEY,
                ArtifactFormat::Original.content_type(),
                cursor_metadata(id, created_at),
            ),
        )
        .await?;
        tracing::info!(checkin_id = id, "Advanced latest pointer");
        Ok(())
    }

    /// Write [`LATEST_KEY`] directly from `body`. Used when the newest
    /// check-in has no stored original to copy.
    pub async fn put_cursor(
        &self,
        id: u64,
        created_at: &DateTime<Utc>,
        body: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        cancellable(
            cancel,
            self.backend.put(
                LATEST_KEY,
                body,
                ArtifactFormat::Original.content_type(),
                cursor_metadata(id, created_at),
            ),
        )
        .await?;
        tracing::info!(checkin_id = id, "Advanced latest pointer without a stored original");
        Ok(())
    }
}

fn cursor_metadata(id: u64, created_at: &DateTime<Utc>) -> Metadata {
    HashMap::from([
        ("id".to_string(), id.to_string()),
        ("created_at".to_string(), created_at.to_rfc3339()),
    ])
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    op: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        result = op => result,
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryBlobStore;
    use super::*;
    use crate::feed::{Beer, Brewery};
    use chrono::TimeZone;

    fn record(id: u64) -> CheckinRecord {
        CheckinRecord {
            id,
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap(),
            comment: String::new(),
            rating: 3.75,
            beer: Beer::default(),
            brewery: Brewery::default(),
            venue: None,
            photo_url: None,
            serving_type: None,
        }
    }

    fn store() -> (Arc<MemoryBlobStore>, CheckinStore) {
        let backend = Arc::new(MemoryBlobStore::default());
        (backend.clone(), CheckinStore::new(backend))
    }

    #[tokio::test]
    async fn test_exists_false_then_true_after_put() {
        let (backend, store) = store();
        let token = CancellationToken::new();
        let r = record(7);
        assert!(!store.exists(r.id, &r.created_at, &token).await.unwrap());

        let key = store.put_original(b"jpeg".to_vec(), &r, &token).await.unwrap();
        assert_eq!(key.as_str(), "2024/03/09/7.jpg");
        assert!(store.exists(r.id, &r.created_at, &token).await.unwrap());

        let object = backend.object("2024/03/09/7.jpg").unwrap();
        assert_eq!(object.content_type, "image/jpeg");
        assert_eq!(object.metadata["rating"], "3.75");
    }

    #[tokio::test]
    async fn test_exists_propagates_lookup_errors() {
        let (backend, store) = store();
        let r = record(8);
        backend.fail_key("2024/03/09/8.jpg");
        let err = store
            .exists(r.id, &r.created_at, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_transcoded_artifact_key_and_type() {
        let (backend, store) = store();
        let token = CancellationToken::new();
        let r = record(9);
        store.put_transcoded(b"webp".to_vec(), &r, &token).await.unwrap();
        let object = backend.object("2024/03/09/9.webp").unwrap();
        assert_eq!(object.content_type, "image/webp");
        assert!(!store.exists(r.id, &r.created_at, &token).await.unwrap());
        assert!(store
            .exists_as(r.id, &r.created_at, ArtifactFormat::Transcoded, &token)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cursor_absent_on_fresh_bucket() {
        let (_, store) = store();
        assert_eq!(store.get_cursor(&CancellationToken::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get_cursor() {
        let (backend, store) = store();
        let token = CancellationToken::new();
        let r = record(11);
        store.put_original(b"jpeg".to_vec(), &r, &token).await.unwrap();
        store.set_cursor(r.id, &r.created_at, &token).await.unwrap();
        // Idempotent.
        store.set_cursor(r.id, &r.created_at, &token).await.unwrap();

        let cursor = store.get_cursor(&token).await.unwrap().unwrap();
        assert_eq!(cursor.id, 11);
        assert_eq!(cursor.created_at, Some(r.created_at));

        let latest = backend.object(LATEST_KEY).unwrap();
        assert_eq!(latest.body, b"jpeg");
        assert_eq!(latest.metadata.len(), 2);
    }

    #[tokio::test]
    async fn test_set_cursor_requires_original() {
        let (_, store) = store();
        let r = record(12);
        let err = store
            .set_cursor(r.id, &r.created_at, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_put_cursor_without_original() {
        let (backend, store) = store();
        let token = CancellationToken::new();
        let r = record(15);
        store
            .put_cursor(r.id, &r.created_at, b"placeholder".to_vec(), &token)
            .await
            .unwrap();

        let cursor = store.get_cursor(&token).await.unwrap().unwrap();
        assert_eq!(cursor.id, 15);
        assert_eq!(cursor.created_at, Some(r.created_at));
        assert_eq!(backend.object(LATEST_KEY).unwrap().body, b"placeholder");
        assert!(backend.object("2024/03/09/15.jpg").is_none());
    }

    #[tokio::test]
    async fn test_invalid_cursor_metadata() {
        let token = CancellationToken::new();
        for bad in [None, Some(""), Some("twelve")] {
            let (backend, store) = store();
            let mut metadata = Metadata::new();
            if let Some(value) = bad {
                metadata.insert("id".to_string(), value.to_string());
            }
            backend.insert(LATEST_KEY, b"x".to_vec(), "image/jpeg", metadata);
            let err = store.get_cursor(&token).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidCursor { .. }), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_get_original_round_trip() {
        let (_, store) = store();
        let token = CancellationToken::new();
        let r = record(13);
        store.put_original(b"bytes".to_vec(), &r, &token).await.unwrap();
        assert_eq!(store.get_original(&r, &token).await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn test_cancelled_operations() {
        let (_, store) = store();
        let token = CancellationToken::new();
        token.cancel();
        let r = record(14);
        let err = store.exists(r.id, &r.created_at, &token).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
    }
}
