//! Job state machine: per-artifact conversion lifecycle.
//!
//! [`JobRunner::run_step`] is the only code path that moves an artifact
//! through pending → processing → succeeded/failed. The claim is an atomic
//! conditional transition against the store, so at most one job per artifact
//! is in flight even under concurrent callers; losers get `AlreadyInProgress`.
//!
//! A succeeded artifact may be claimed again as the input of a NEW
//! derivation: chained pipeline steps and pipeline re-runs both feed on
//! completed artifacts. Completion edges never leave succeeded, and failed
//! returns to pending only through the explicit [`JobRunner::retry`].
//!
//! Retry policy: only `Timeout` is retried automatically, with exponential
//! backoff and a bounded attempt count. Converter-reported failures are
//! structural and wait for a caller-initiated retry after the input is fixed.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::artifact::{Artifact, ArtifactKind, ArtifactStatus};
use crate::blob::BlobStore;
use crate::config::CoreConfig;
use crate::convert::{ConvertOp, ConvertOptions, Converter, ConverterGateway};
use crate::error::CoreError;
use crate::store::ArtifactStore;

/// Statuses from which a conversion job may claim its input artifact.
const CLAIMABLE: [ArtifactStatus; 3] = [
    ArtifactStatus::Pending,
    ArtifactStatus::Failed,
    ArtifactStatus::Succeeded,
];

pub struct JobRunner {
    store: Arc<dyn ArtifactStore>,
    blobs: Arc<dyn BlobStore>,
    gateway: ConverterGateway,
    config: CoreConfig,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        blobs: Arc<dyn BlobStore>,
        converter: Arc<dyn Converter>,
        config: CoreConfig,
    ) -> Self {
        let gateway = ConverterGateway::new(converter, config.converter_timeout());
        Self {
            store,
            blobs,
            gateway,
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        Arc::clone(&self.store)
    }

    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&self.blobs)
    }

    /// Run one conversion step on the given artifact and return the derived
    /// output artifact.
    pub async fn run_step(
        &self,
        artifact_id: &str,
        op: ConvertOp,
        options: &ConvertOptions,
    ) -> Result<Artifact, CoreError> {
        let claimed = self
            .store
            .transition(artifact_id, &CLAIMABLE, ArtifactStatus::Processing, None)
            .await?;
        info!(artifact_id, op = %op, "claimed artifact for conversion");

        match self.execute(&claimed, op, options).await {
            Ok(derived) => {
                self.store
                    .transition(
                        artifact_id,
                        &[ArtifactStatus::Processing],
                        ArtifactStatus::Succeeded,
                        None,
                    )
                    .await?;
                info!(
                    artifact_id,
                    derived_id = %derived.id,
                    op = %op,
                    "conversion step succeeded"
                );
                Ok(derived)
            }
            Err(err) => {
                error!(artifact_id, op = %op, error = %err, "conversion step failed");
                let detail = err.failure_detail();
                if let Err(mark_err) = self
                    .store
                    .transition(
                        artifact_id,
                        &[ArtifactStatus::Processing],
                        ArtifactStatus::Failed,
                        Some(detail),
                    )
                    .await
                {
                    error!(
                        artifact_id,
                        error = %mark_err,
                        "failed to record failure on artifact"
                    );
                }
                Err(err)
            }
        }
    }

    /// Explicit caller-initiated retry: failed → pending, error detail
    /// cleared. Any other current status is a conflict.
    pub async fn retry(&self, artifact_id: &str) -> Result<Artifact, CoreError> {
        let artifact = self
            .store
            .transition(
                artifact_id,
                &[ArtifactStatus::Failed],
                ArtifactStatus::Pending,
                None,
            )
            .await?;
        info!(artifact_id, "artifact reset to pending for retry");
        Ok(artifact)
    }

    async fn execute(
        &self,
        input: &Artifact,
        op: ConvertOp,
        options: &ConvertOptions,
    ) -> Result<Artifact, CoreError> {
        let bytes = self.blobs.get_bytes(&input.content_location).await?;
        if bytes.is_empty() {
            return Err(CoreError::invalid_input(format!(
                "artifact `{}` has empty content",
                input.id
            )));
        }

        let output = self.convert_with_retry(&input.id, op, &bytes, options).await?;
        let output_len = output.len() as u64;
        // Blob is only written after the converter succeeded, so a failed
        // call leaves no partial output behind.
        let location = self.blobs.put_bytes(output).await?;

        let mut derived = Artifact::new(
            op.output_kind(),
            derived_name(&input.original_name, op),
            location,
            output_len,
            vec![input.id.clone()],
        )
        .with_status(ArtifactStatus::Succeeded);
        if derived.kind == ArtifactKind::AnalysisResult {
            derived.grouping_key = options.grouping_key.clone();
        }
        self.store.put(derived).await
    }

    async fn convert_with_retry(
        &self,
        artifact_id: &str,
        op: ConvertOp,
        input: &[u8],
        options: &ConvertOptions,
    ) -> Result<Vec<u8>, CoreError> {
        let max_attempts = self.config.max_convert_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.gateway.convert(op, input, options).await {
                Ok(output) => return Ok(output),
                Err(CoreError::Timeout { .. }) if attempt < max_attempts => {
                    let backoff = self.config.retry_backoff() * 2u32.pow(attempt - 1);
                    warn!(
                        artifact_id,
                        op = %op,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "converter call timed out, backing off before retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(CoreError::Timeout { op, .. }) => {
                    return Err(CoreError::Timeout {
                        op,
                        attempts: attempt,
                    })
                }
                Err(other) => return Err(other),
            }
        }
    }
}

/// Derived artifact name: input name with its extension swapped for the op's.
fn derived_name(input_name: &str, op: ConvertOp) -> String {
    let stem = match input_name.rfind('.') {
        Some(idx) if idx > 0 => &input_name[..idx],
        _ => input_name,
    };
    format!("{stem}{}", op.output_extension())
}
