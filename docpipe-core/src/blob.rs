//! Content bytes behind opaque location refs.
//!
//! Artifact metadata lives in the [`crate::store`]; the bytes themselves are
//! kept here, keyed by the artifact's `content_location`. Implement
//! [`BlobStore`] to back content with a filesystem, object store or database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mockall::automock;
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return a fresh opaque location ref.
    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<String, CoreError>;

    async fn get_bytes(&self, location: &str) -> Result<Vec<u8>, CoreError>;

    async fn delete_bytes(&self, location: &str) -> Result<(), CoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<String, CoreError> {
        let location = Uuid::new_v4().to_string();
        debug!(location = %location, size = bytes.len(), "stored blob");
        self.inner
            .lock()
            .expect("blob store mutex poisoned")
            .insert(location.clone(), bytes);
        Ok(location)
    }

    async fn get_bytes(&self, location: &str) -> Result<Vec<u8>, CoreError> {
        self.inner
            .lock()
            .expect("blob store mutex poisoned")
            .get(location)
            .cloned()
            .ok_or_else(|| CoreError::NotFound {
                id: location.to_string(),
            })
    }

    async fn delete_bytes(&self, location: &str) -> Result<(), CoreError> {
        self.inner
            .lock()
            .expect("blob store mutex poisoned")
            .remove(location)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound {
                id: location.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let blobs = InMemoryBlobStore::new();
        let location = blobs.put_bytes(b"hello".to_vec()).await.expect("put");

        assert_eq!(blobs.get_bytes(&location).await.expect("get"), b"hello");
        blobs.delete_bytes(&location).await.expect("delete");

        let err = blobs.get_bytes(&location).await.expect_err("gone");
        assert!(matches!(err, CoreError::NotFound { .. }), "got {err:?}");
    }
}
