//! High-level pipeline: composes conversion steps into named chains.
//!
//! The orchestrator resolves a pipeline name to an ordered list of converter
//! ops and feeds each step's output artifact into the next step. Steps run
//! strictly in sequence: a step only starts after the previous step's output
//! is persisted and its input is marked succeeded.
//!
//! # Failure behavior
//! If a step fails the run stops there. Artifacts produced by earlier steps
//! stay in the store untouched; they are valid, independently addressable
//! artifacts and are never rolled back. The error names the pipeline, the
//! failing step and the underlying error kind.
//!
//! # Re-runs
//! Running the same pipeline on the same source again derives a brand-new
//! chain of artifacts. Nothing is mutated in place beyond the job state
//! machine's own status transitions on the input artifacts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::convert::{ConvertOp, ConvertOptions};
use crate::error::CoreError;
use crate::job::JobRunner;

/// A named, ordered list of conversion ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub ops: Vec<ConvertOp>,
}

impl PipelineSpec {
    pub fn new(name: impl Into<String>, ops: Vec<ConvertOp>) -> Self {
        Self {
            name: name.into(),
            ops,
        }
    }
}

/// Pipelines every deployment understands.
pub fn builtin_pipelines() -> Vec<PipelineSpec> {
    vec![
        PipelineSpec::new("doc-to-pdf", vec![ConvertOp::DocToPdf]),
        PipelineSpec::new(
            "podcast",
            vec![ConvertOp::TextToScript, ConvertOp::ScriptToAudio],
        ),
        PipelineSpec::new("analysis", vec![ConvertOp::TextToAnalysis]),
    ]
}

/// One completed step of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: ConvertOp,
    pub artifact_id: String,
}

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub source_id: String,
    pub final_artifact_id: String,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown pipeline `{name}`")]
    UnknownPipeline { name: String },

    #[error("pipeline `{pipeline}` failed at step {step} ({op}): {source}")]
    Step {
        pipeline: String,
        step: usize,
        op: ConvertOp,
        #[source]
        source: CoreError,
    },
}

impl PipelineError {
    /// Underlying engine error of a failed step, if any.
    pub fn core(&self) -> Option<&CoreError> {
        match self {
            PipelineError::Step { source, .. } => Some(source),
            PipelineError::UnknownPipeline { .. } => None,
        }
    }
}

pub struct Orchestrator {
    jobs: JobRunner,
    pipelines: HashMap<String, PipelineSpec>,
}

impl Orchestrator {
    /// Orchestrator with the built-in pipelines registered.
    pub fn new(jobs: JobRunner) -> Self {
        let mut orchestrator = Self {
            jobs,
            pipelines: HashMap::new(),
        };
        for spec in builtin_pipelines() {
            orchestrator.register(spec);
        }
        orchestrator
    }

    /// Register or replace a pipeline. Empty pipelines are ignored.
    pub fn register(&mut self, spec: PipelineSpec) {
        if spec.ops.is_empty() {
            error!(pipeline = %spec.name, "refusing to register pipeline with no steps");
            return;
        }
        info!(pipeline = %spec.name, steps = spec.ops.len(), "registered pipeline");
        self.pipelines.insert(spec.name.clone(), spec);
    }

    /// Registered pipelines, sorted by name.
    pub fn pipelines(&self) -> Vec<&PipelineSpec> {
        let mut specs: Vec<&PipelineSpec> = self.pipelines.values().collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    /// Run a named pipeline starting from the given source artifact.
    pub async fn run(
        &self,
        pipeline_name: &str,
        source_artifact_id: &str,
        options: &ConvertOptions,
    ) -> Result<PipelineReport, PipelineError> {
        let spec = self
            .pipelines
            .get(pipeline_name)
            .ok_or_else(|| PipelineError::UnknownPipeline {
                name: pipeline_name.to_string(),
            })?;

        info!(
            pipeline = %spec.name,
            source_id = source_artifact_id,
            steps = spec.ops.len(),
            "starting pipeline run"
        );

        let mut current = source_artifact_id.to_string();
        let mut steps = Vec::with_capacity(spec.ops.len());
        for (index, op) in spec.ops.iter().enumerate() {
            info!(pipeline = %spec.name, step = index, op = %op, artifact_id = %current, "starting pipeline step");
            match self.jobs.run_step(&current, *op, options).await {
                Ok(derived) => {
                    steps.push(StepReport {
                        index,
                        op: *op,
                        artifact_id: derived.id.clone(),
                    });
                    current = derived.id;
                }
                Err(err) => {
                    error!(
                        pipeline = %spec.name,
                        step = index,
                        op = %op,
                        artifact_id = %current,
                        error = %err,
                        "pipeline step failed, stopping run"
                    );
                    return Err(PipelineError::Step {
                        pipeline: spec.name.clone(),
                        step: index,
                        op: *op,
                        source: err,
                    });
                }
            }
        }

        info!(
            pipeline = %spec.name,
            source_id = source_artifact_id,
            final_artifact_id = %current,
            "pipeline run complete"
        );
        Ok(PipelineReport {
            pipeline: spec.name.clone(),
            source_id: source_artifact_id.to_string(),
            final_artifact_id: current,
            steps,
        })
    }
}
