//! Artifact store: durable record of every artifact and its metadata.
//!
//! This module defines the [`ArtifactStore`] trait and an in-memory reference
//! implementation used by tests and embedded callers.
//!
//! ## Interface & Extensibility
//! - Implement [`ArtifactStore`] to back the engine with a real document
//!   store. All operations are atomic at single-artifact granularity; no
//!   multi-document transactions are assumed anywhere in the engine.
//! - [`ArtifactStore::transition`] is the compare-and-set primitive that
//!   backs the at-most-one-processing guarantee. It must be atomic with
//!   respect to concurrent calls on the same id.
//! - `list` ordering is part of the contract: created_at ascending, ties
//!   broken by id, so pagination is deterministic.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so consumers can generate
//!   deterministic mocks for unit/integration tests.
//!
//! ## Invariants enforced on every write
//! - `error_detail` is present iff status is `Failed`.
//! - Origin references must resolve at creation time (no dangling lineage).
//! - Ids are never reused; inserting an existing id is an error.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::{Artifact, ArtifactFilter, ArtifactStatus, ErrorDetail};
use crate::error::CoreError;

/// Partial update applied by [`ArtifactStore::update`]. Unset fields are
/// left untouched; `updated_at` is always bumped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactPatch {
    pub status: Option<ArtifactStatus>,
    pub error_detail: Option<ErrorDetail>,
    pub content_location: Option<String>,
    pub grouping_key: Option<String>,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Insert a new artifact. Origin references must already exist.
    async fn put(&self, artifact: Artifact) -> Result<Artifact, CoreError>;

    async fn get(&self, id: &str) -> Result<Artifact, CoreError>;

    /// Deterministically ordered page of artifacts matching the filter.
    async fn list(
        &self,
        filter: ArtifactFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>, CoreError>;

    async fn update(&self, id: &str, patch: ArtifactPatch) -> Result<Artifact, CoreError>;

    /// Atomic conditional status transition. Fails with `AlreadyInProgress`
    /// when the artifact is currently `Processing` and that state is not an
    /// accepted source, and with `Conflict` for any other mismatch.
    async fn transition(
        &self,
        id: &str,
        from: &[ArtifactStatus],
        to: ArtifactStatus,
        error_detail: Option<ErrorDetail>,
    ) -> Result<Artifact, CoreError>;

    async fn delete(&self, id: &str) -> Result<(), CoreError>;

    /// Artifacts whose origin contains the given id. Implemented as a scan;
    /// there is no secondary index on lineage.
    async fn dependents_of(&self, id: &str) -> Result<Vec<Artifact>, CoreError>;

    async fn count(&self) -> Result<u64, CoreError>;
}

/// In-memory store. Per-call atomicity comes from the single mutex; every
/// mutation happens under one lock acquisition.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    inner: Mutex<HashMap<String, Artifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted artifacts. Used by
    /// file-backed wrappers that delegate semantics to this implementation.
    pub fn from_artifacts(artifacts: Vec<Artifact>) -> Self {
        let inner = artifacts.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// All artifacts in list order. Used by file-backed wrappers to persist.
    pub fn snapshot(&self) -> Vec<Artifact> {
        let map = self.inner.lock().expect("artifact store mutex poisoned");
        let mut all: Vec<Artifact> = map.values().cloned().collect();
        all.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        all
    }
}

/// Status invariant applied on every write path.
fn enforce_error_detail(artifact: &mut Artifact) -> Result<(), CoreError> {
    match artifact.status {
        ArtifactStatus::Failed => {
            if artifact.error_detail.is_none() {
                return Err(CoreError::internal(format!(
                    "artifact `{}` marked failed without error detail",
                    artifact.id
                )));
            }
        }
        _ => artifact.error_detail = None,
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, mut artifact: Artifact) -> Result<Artifact, CoreError> {
        let mut map = self.inner.lock().expect("artifact store mutex poisoned");
        if map.contains_key(&artifact.id) {
            return Err(CoreError::internal(format!(
                "artifact id `{}` already exists, ids are never reused",
                artifact.id
            )));
        }
        for parent in &artifact.origin {
            if !map.contains_key(parent) {
                return Err(CoreError::invalid_input(format!(
                    "origin `{parent}` of artifact `{}` does not exist",
                    artifact.id
                )));
            }
        }
        enforce_error_detail(&mut artifact)?;
        debug!(artifact_id = %artifact.id, kind = %artifact.kind, "stored artifact");
        map.insert(artifact.id.clone(), artifact.clone());
        Ok(artifact)
    }

    async fn get(&self, id: &str) -> Result<Artifact, CoreError> {
        let map = self.inner.lock().expect("artifact store mutex poisoned");
        map.get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound { id: id.to_string() })
    }

    async fn list(
        &self,
        filter: ArtifactFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>, CoreError> {
        let map = self.inner.lock().expect("artifact store mutex poisoned");
        let mut matching: Vec<Artifact> = map
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }

    async fn update(&self, id: &str, patch: ArtifactPatch) -> Result<Artifact, CoreError> {
        let mut map = self.inner.lock().expect("artifact store mutex poisoned");
        let current = map
            .get(id)
            .ok_or_else(|| CoreError::NotFound { id: id.to_string() })?;
        // Apply to a copy so an invariant breach leaves the record untouched.
        let mut updated = current.clone();
        if let Some(status) = patch.status {
            updated.status = status;
        }
        if let Some(detail) = patch.error_detail {
            updated.error_detail = Some(detail);
        }
        if let Some(location) = patch.content_location {
            updated.content_location = location;
        }
        if let Some(key) = patch.grouping_key {
            updated.grouping_key = Some(key);
        }
        updated.updated_at = Utc::now();
        enforce_error_detail(&mut updated)?;
        map.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn transition(
        &self,
        id: &str,
        from: &[ArtifactStatus],
        to: ArtifactStatus,
        error_detail: Option<ErrorDetail>,
    ) -> Result<Artifact, CoreError> {
        let mut map = self.inner.lock().expect("artifact store mutex poisoned");
        let artifact = map
            .get(id)
            .ok_or_else(|| CoreError::NotFound { id: id.to_string() })?;
        let current = artifact.status;
        if !from.contains(&current) {
            if current == ArtifactStatus::Processing {
                return Err(CoreError::AlreadyInProgress { id: id.to_string() });
            }
            return Err(CoreError::Conflict {
                id: id.to_string(),
                reason: format!("status is {current:?}, expected one of {from:?}"),
            });
        }
        // Apply to a copy so an invariant breach leaves the record untouched.
        let mut updated = artifact.clone();
        updated.status = to;
        updated.error_detail = error_detail;
        updated.updated_at = Utc::now();
        enforce_error_detail(&mut updated)?;
        map.insert(id.to_string(), updated.clone());
        debug!(artifact_id = id, from = ?current, to = ?to, "status transition");
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let mut map = self.inner.lock().expect("artifact store mutex poisoned");
        map.remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound { id: id.to_string() })
    }

    async fn dependents_of(&self, id: &str) -> Result<Vec<Artifact>, CoreError> {
        let map = self.inner.lock().expect("artifact store mutex poisoned");
        let mut dependents: Vec<Artifact> = map
            .values()
            .filter(|a| a.origin.iter().any(|o| o == id))
            .cloned()
            .collect();
        dependents.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(dependents)
    }

    async fn count(&self) -> Result<u64, CoreError> {
        let map = self.inner.lock().expect("artifact store mutex poisoned");
        Ok(map.len() as u64)
    }
}
