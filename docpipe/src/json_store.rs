//! File-backed store: artifact metadata in one JSON file, blobs on disk.
//!
//! Semantics (ordering, the transition CAS, the error-detail invariant)
//! are delegated to the in-memory store from `docpipe-core`; this wrapper
//! only adds persistence. Every metadata mutation rewrites the snapshot
//! file, so the newest completed call wins the file.
//!
//! Layout under the data directory:
//! - `artifacts.json`: the full artifact collection
//! - `blobs/<uuid>`: one file per content location

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use docpipe_core::artifact::{Artifact, ArtifactFilter, ArtifactStatus, ErrorDetail};
use docpipe_core::blob::BlobStore;
use docpipe_core::error::CoreError;
use docpipe_core::store::{ArtifactPatch, ArtifactStore, InMemoryArtifactStore};

pub struct JsonFileStore {
    mem: InMemoryArtifactStore,
    artifacts_path: PathBuf,
    blobs_dir: PathBuf,
}

impl JsonFileStore {
    /// Open (or initialize) a store under the given data directory.
    pub fn open(data_dir: &Path) -> Result<Arc<Self>> {
        let blobs_dir = data_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .with_context(|| format!("failed to create data dir {}", blobs_dir.display()))?;
        let artifacts_path = data_dir.join("artifacts.json");

        let artifacts: Vec<Artifact> = if artifacts_path.exists() {
            let content = std::fs::read_to_string(&artifacts_path).with_context(|| {
                format!("failed to read {}", artifacts_path.display())
            })?;
            serde_json::from_str(&content).with_context(|| {
                format!("failed to parse {}", artifacts_path.display())
            })?
        } else {
            Vec::new()
        };
        info!(
            data_dir = %data_dir.display(),
            artifacts = artifacts.len(),
            "opened file-backed store"
        );

        Ok(Arc::new(Self {
            mem: InMemoryArtifactStore::from_artifacts(artifacts),
            artifacts_path,
            blobs_dir,
        }))
    }

    fn persist(&self) -> Result<(), CoreError> {
        let snapshot = self.mem.snapshot();
        let content = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| CoreError::internal(format!("failed to encode artifacts: {e}")))?;
        std::fs::write(&self.artifacts_path, content).map_err(|e| {
            CoreError::internal(format!(
                "failed to write {}: {e}",
                self.artifacts_path.display()
            ))
        })?;
        debug!(path = %self.artifacts_path.display(), "persisted artifact snapshot");
        Ok(())
    }

    fn blob_path(&self, location: &str) -> PathBuf {
        self.blobs_dir.join(location)
    }
}

#[async_trait]
impl ArtifactStore for JsonFileStore {
    async fn put(&self, artifact: Artifact) -> Result<Artifact, CoreError> {
        let stored = self.mem.put(artifact).await?;
        self.persist()?;
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Artifact, CoreError> {
        self.mem.get(id).await
    }

    async fn list(
        &self,
        filter: ArtifactFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>, CoreError> {
        self.mem.list(filter, skip, limit).await
    }

    async fn update(&self, id: &str, patch: ArtifactPatch) -> Result<Artifact, CoreError> {
        let updated = self.mem.update(id, patch).await?;
        self.persist()?;
        Ok(updated)
    }

    async fn transition(
        &self,
        id: &str,
        from: &[ArtifactStatus],
        to: ArtifactStatus,
        error_detail: Option<ErrorDetail>,
    ) -> Result<Artifact, CoreError> {
        let transitioned = self.mem.transition(id, from, to, error_detail).await?;
        self.persist()?;
        Ok(transitioned)
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.mem.delete(id).await?;
        self.persist()
    }

    async fn dependents_of(&self, id: &str) -> Result<Vec<Artifact>, CoreError> {
        self.mem.dependents_of(id).await
    }

    async fn count(&self) -> Result<u64, CoreError> {
        self.mem.count().await
    }
}

#[async_trait]
impl BlobStore for JsonFileStore {
    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<String, CoreError> {
        let location = Uuid::new_v4().to_string();
        let path = self.blob_path(&location);
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            CoreError::internal(format!("failed to write blob {}: {e}", path.display()))
        })?;
        debug!(location = %location, size = bytes.len(), "wrote blob file");
        Ok(location)
    }

    async fn get_bytes(&self, location: &str) -> Result<Vec<u8>, CoreError> {
        let path = self.blob_path(location);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CoreError::NotFound {
                id: location.to_string(),
            }),
            Err(e) => Err(CoreError::internal(format!(
                "failed to read blob {}: {e}",
                path.display()
            ))),
        }
    }

    async fn delete_bytes(&self, location: &str) -> Result<(), CoreError> {
        let path = self.blob_path(location);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CoreError::NotFound {
                id: location.to_string(),
            }),
            Err(e) => Err(CoreError::internal(format!(
                "failed to remove blob {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_core::artifact::ArtifactKind;
    use tempfile::tempdir;

    #[tokio::test]
    async fn artifacts_survive_reopen() {
        let dir = tempdir().expect("temp dir");
        let id;
        {
            let store = JsonFileStore::open(dir.path()).expect("open");
            let location = store.put_bytes(b"bytes".to_vec()).await.expect("blob");
            let artifact = store
                .put(Artifact::new(
                    ArtifactKind::RawUpload,
                    "notes.docx",
                    location,
                    5,
                    vec![],
                ))
                .await
                .expect("put");
            id = artifact.id;
        }

        let reopened = JsonFileStore::open(dir.path()).expect("reopen");
        let artifact = reopened.get(&id).await.expect("artifact persisted");
        assert_eq!(artifact.original_name, "notes.docx");
        let bytes = reopened
            .get_bytes(&artifact.content_location)
            .await
            .expect("blob persisted");
        assert_eq!(bytes, b"bytes");
    }

    #[tokio::test]
    async fn transitions_are_persisted() {
        let dir = tempdir().expect("temp dir");
        let store = JsonFileStore::open(dir.path()).expect("open");
        let location = store.put_bytes(b"x".to_vec()).await.expect("blob");
        let artifact = store
            .put(Artifact::new(
                ArtifactKind::RawUpload,
                "a.docx",
                location,
                1,
                vec![],
            ))
            .await
            .expect("put");

        store
            .transition(
                &artifact.id,
                &[ArtifactStatus::Pending],
                ArtifactStatus::Processing,
                None,
            )
            .await
            .expect("claim");

        let reopened = JsonFileStore::open(dir.path()).expect("reopen");
        let persisted = reopened.get(&artifact.id).await.expect("artifact");
        assert_eq!(persisted.status, ArtifactStatus::Processing);
    }
}
