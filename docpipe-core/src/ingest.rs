//! Ingestion and the caller-facing artifact surface.
//!
//! Upload validation mirrors what the service accepts: a named file of an
//! allowed extension within the size limit. Deletion guards lineage: an
//! artifact referenced as origin by others is only removed when the caller
//! explicitly asks for a cascade.

use std::sync::Arc;

use tracing::{info, warn};

use crate::artifact::{Artifact, ArtifactFilter, ArtifactKind};
use crate::blob::BlobStore;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::store::ArtifactStore;

pub struct Ingestor {
    store: Arc<dyn ArtifactStore>,
    blobs: Arc<dyn BlobStore>,
    config: CoreConfig,
}

/// Lowercased extension including the leading dot, if the name has one.
fn extension_of(name: &str) -> Option<String> {
    name.rfind('.')
        .filter(|idx| *idx > 0)
        .map(|idx| name[idx..].to_lowercase())
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        blobs: Arc<dyn BlobStore>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            config,
        }
    }

    /// Validate and store an uploaded file as a pending raw-upload artifact.
    pub async fn upload(
        &self,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Artifact, CoreError> {
        if original_name.trim().is_empty() {
            return Err(CoreError::invalid_input("filename must not be empty"));
        }
        let extension = extension_of(original_name).ok_or_else(|| {
            CoreError::invalid_input(format!("filename `{original_name}` has no extension"))
        })?;
        if !self.config.allowed_extensions.contains(&extension) {
            return Err(CoreError::invalid_input(format!(
                "unsupported file type `{extension}`, allowed: {}",
                self.config.allowed_extensions.join(", ")
            )));
        }
        if bytes.is_empty() {
            return Err(CoreError::invalid_input(format!(
                "uploaded content for `{original_name}` is empty"
            )));
        }
        if bytes.len() as u64 > self.config.max_upload_bytes {
            return Err(CoreError::invalid_input(format!(
                "file `{original_name}` exceeds the size limit of {} bytes",
                self.config.max_upload_bytes
            )));
        }

        let size = bytes.len() as u64;
        let location = self.blobs.put_bytes(bytes).await?;
        let artifact = Artifact::new(ArtifactKind::RawUpload, original_name, location, size, vec![]);
        let stored = self.store.put(artifact).await?;
        info!(
            artifact_id = %stored.id,
            original_name,
            size,
            "upload accepted"
        );
        Ok(stored)
    }

    pub async fn get(&self, id: &str) -> Result<Artifact, CoreError> {
        self.store.get(id).await
    }

    pub async fn list(
        &self,
        filter: ArtifactFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>, CoreError> {
        self.store.list(filter, skip, limit).await
    }

    /// Delete an artifact. When other artifacts reference it as origin the
    /// call is rejected with a conflict unless `cascade` is set, in which
    /// case dependents are removed depth-first, blobs included.
    pub async fn delete(&self, id: &str, cascade: bool) -> Result<(), CoreError> {
        let artifact = self.store.get(id).await?;
        let dependents = self.store.dependents_of(id).await?;
        if !dependents.is_empty() {
            if !cascade {
                let ids: Vec<&str> = dependents.iter().map(|d| d.id.as_str()).collect();
                return Err(CoreError::Conflict {
                    id: id.to_string(),
                    reason: format!("referenced as origin by: {}", ids.join(", ")),
                });
            }
            for dependent in &dependents {
                Box::pin(self.delete(&dependent.id, true)).await?;
            }
        }

        if let Err(e) = self.blobs.delete_bytes(&artifact.content_location).await {
            // Metadata wins over orphaned bytes; deletion proceeds.
            warn!(
                artifact_id = id,
                location = %artifact.content_location,
                error = %e,
                "failed to remove blob during delete"
            );
        }
        self.store.delete(id).await?;
        info!(artifact_id = id, cascade, "artifact deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use crate::store::InMemoryArtifactStore;

    fn ingestor() -> Ingestor {
        Ingestor::new(
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            CoreConfig::default(),
        )
    }

    #[tokio::test]
    async fn upload_accepts_allowed_file() {
        let ingestor = ingestor();
        let artifact = ingestor
            .upload("Weekly Notes.DOCX", b"content".to_vec())
            .await
            .expect("upload succeeds");

        assert_eq!(artifact.kind, ArtifactKind::RawUpload);
        assert_eq!(artifact.original_name, "Weekly Notes.DOCX");
        assert_eq!(artifact.content_length, 7);
        assert!(artifact.origin.is_empty());
    }

    #[tokio::test]
    async fn upload_rejects_bad_inputs() {
        let ingestor = ingestor();

        for (name, bytes) in [
            ("", b"x".to_vec()),
            ("noextension", b"x".to_vec()),
            ("image.png", b"x".to_vec()),
            ("notes.docx", Vec::new()),
        ] {
            let err = ingestor
                .upload(name, bytes)
                .await
                .expect_err("must be rejected");
            assert!(
                matches!(err, CoreError::InvalidInput { .. }),
                "case `{name}` got {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn upload_rejects_oversized_file() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let config = CoreConfig {
            max_upload_bytes: 4,
            ..CoreConfig::default()
        };
        let ingestor = Ingestor::new(store, blobs, config);

        let err = ingestor
            .upload("big.txt", b"12345".to_vec())
            .await
            .expect_err("over limit");
        assert!(matches!(err, CoreError::InvalidInput { .. }), "got {err:?}");
    }

    #[test]
    fn extension_of_handles_edge_cases() {
        assert_eq!(extension_of("a.DocX"), Some(".docx".to_string()));
        assert_eq!(extension_of("archive.tar.gz"), Some(".gz".to_string()));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of(".hidden"), None);
    }
}
