//! In-memory [`BlobStore`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BlobStore, Metadata, ObjectHead, StoreError};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub metadata: Metadata,
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    /// Every key written by `put` or `copy`, in order.
    writes: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryBlobStore {
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, body: Vec<u8>, content_type: &str, metadata: Metadata) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                metadata,
            },
        );
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// Make every operation on `key` fail with a backend error.
    pub fn fail_key(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    fn check(&self, op: &'static str, key: &str) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(StoreError::Backend {
                op,
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn head(&self, key: &str) -> Result<ObjectHead, StoreError> {
        self.check("head", key)?;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| ObjectHead {
                metadata: o.metadata.clone(),
                content_length: Some(o.body.len() as u64),
            })
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.check("get", key)?;
        self.object(key)
            .map(|o| o.body)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        self.check("put", key)?;
        self.insert(key, body, content_type, metadata);
        self.writes.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn copy(
        &self,
        source: &str,
        dest: &str,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        self.check("copy", dest)?;
        let body = self
            .object(source)
            .ok_or_else(|| StoreError::NotFound(source.to_string()))?
            .body;
        self.insert(dest, body, content_type, metadata);
        self.writes.lock().unwrap().push(dest.to_string());
        Ok(())
    }
}
