//! # docpipe CLI Interface (Module)
//!
//! This module implements the full CLI interface for docpipe: command
//! parsing, argument validation, main entrypoints, and user-visible
//! invocations.
//!
//! All core business logic (artifact model, job state machine, pipelines and
//! aggregation) lives in the [`docpipe-core`] crate. This module is strictly
//! for CLI glue, ergonomic argument exposure, and wiring real collaborators.
//!
//! ## Features
//! - Entry struct [`Cli`] defines all user-facing options and subcommands.
//! - One subcommand per caller-facing engine operation: upload, run, get,
//!   list, delete, aggregate, retry, pipelines.
//! - Async entrypoint (`run`) for programmatic invocation and integration
//!   testing.
//! - Results print as JSON on stdout; logging goes through tracing.
//!
//! ## Extending
//! When adding subcommands, update [`Commands`] below and keep all
//! non-trivial business logic inside `docpipe-core`.
//!
//! [`docpipe-core`]: ../../docpipe-core/

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use docpipe_core::aggregate::Aggregator;
use docpipe_core::artifact::{ArtifactFilter, ArtifactKind};
use docpipe_core::blob::BlobStore;
use docpipe_core::convert::ConvertOptions;
use docpipe_core::ingest::Ingestor;
use docpipe_core::job::JobRunner;
use docpipe_core::pipeline::Orchestrator;
use docpipe_core::store::ArtifactStore;

use crate::convert_client::HttpConverter;
use crate::json_store::JsonFileStore;
use crate::load_config::load_config;

/// CLI for docpipe: ingest documents, run conversion pipelines and
/// aggregate analysis results into reports.
#[derive(Parser)]
#[clap(
    name = "docpipe",
    version,
    about = "Document pipeline: upload, convert, synthesize and aggregate into reports"
)]
pub struct Cli {
    /// Path to the YAML config file
    #[clap(long, global = true, default_value = "docpipe.yaml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a file as a new raw-upload artifact
    Upload {
        /// Path of the file to ingest
        file: PathBuf,
    },
    /// Run a named pipeline on an artifact
    Run {
        /// Registered pipeline name, e.g. doc-to-pdf or podcast
        pipeline: String,
        /// Source artifact id
        artifact_id: String,
        /// Grouping key stamped on analysis outputs, e.g. 2024-W05
        #[clap(long)]
        grouping_key: Option<String>,
        /// Voice hint forwarded to audio synthesis
        #[clap(long)]
        voice: Option<String>,
        /// Language hint forwarded to the converter
        #[clap(long)]
        language: Option<String>,
    },
    /// Print one artifact as JSON
    Get { id: String },
    /// List artifacts, optionally filtered
    List {
        /// Filter by kind, e.g. analysis-result
        #[clap(long)]
        kind: Option<String>,
        /// Filter by grouping key
        #[clap(long)]
        grouping_key: Option<String>,
        #[clap(long, default_value_t = 0)]
        skip: usize,
        #[clap(long, default_value_t = 100)]
        limit: usize,
    },
    /// Delete an artifact; refuses when referenced unless --cascade
    Delete {
        id: String,
        /// Also delete artifacts derived from this one
        #[clap(long)]
        cascade: bool,
    },
    /// Merge analysis results sharing a grouping key into one report
    Aggregate {
        /// Grouping key, e.g. 2024-W05
        grouping_key: String,
        /// Member artifact ids
        #[clap(required = true)]
        members: Vec<String>,
    },
    /// Reset a failed artifact to pending
    Retry { id: String },
    /// List registered pipelines
    Pipelines,
}

struct App {
    ingestor: Ingestor,
    orchestrator: Orchestrator,
    aggregator: Aggregator,
}

fn build_app(config_path: &PathBuf) -> Result<App> {
    let config = load_config(config_path)?;
    config.core.trace_loaded();

    let store = JsonFileStore::open(&config.data_dir)?;
    let artifact_store: Arc<dyn ArtifactStore> = store.clone();
    let blob_store: Arc<dyn BlobStore> = store;

    let converter = Arc::new(HttpConverter::from_env(config.converter_base_url.clone()));
    let jobs = JobRunner::new(
        artifact_store.clone(),
        blob_store.clone(),
        converter,
        config.core.clone(),
    );
    let mut orchestrator = Orchestrator::new(jobs);
    for spec in config.pipelines {
        orchestrator.register(spec);
    }
    let ingestor = Ingestor::new(artifact_store.clone(), blob_store.clone(), config.core);
    let aggregator = Aggregator::new(artifact_store, blob_store);
    Ok(App {
        ingestor,
        orchestrator,
        aggregator,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let app = build_app(&cli.config)?;

    match cli.command {
        Commands::Upload { file } => {
            let original_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("upload path has no file name")?
                .to_string();
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            tracing::info!(file = %file.display(), size = bytes.len(), "uploading file");
            let artifact = app.ingestor.upload(&original_name, bytes).await?;
            print_json(&artifact)
        }
        Commands::Run {
            pipeline,
            artifact_id,
            grouping_key,
            voice,
            language,
        } => {
            let options = ConvertOptions {
                voice,
                language,
                grouping_key,
            };
            tracing::info!(pipeline = %pipeline, artifact_id = %artifact_id, "running pipeline");
            let report = app
                .orchestrator
                .run(&pipeline, &artifact_id, &options)
                .await?;
            print_json(&report)
        }
        Commands::Get { id } => {
            let artifact = app.ingestor.get(&id).await?;
            print_json(&artifact)
        }
        Commands::List {
            kind,
            grouping_key,
            skip,
            limit,
        } => {
            let kind = kind
                .map(|k| k.parse::<ArtifactKind>())
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?;
            let filter = ArtifactFilter { kind, grouping_key };
            let artifacts = app.ingestor.list(filter, skip, limit).await?;
            print_json(&artifacts)
        }
        Commands::Delete { id, cascade } => {
            app.ingestor.delete(&id, cascade).await?;
            print_json(&json!({ "deleted": id, "cascade": cascade }))
        }
        Commands::Aggregate {
            grouping_key,
            members,
        } => {
            tracing::info!(
                grouping_key = %grouping_key,
                members = members.len(),
                "aggregating analysis results"
            );
            let report = app.aggregator.aggregate(&grouping_key, &members).await?;
            print_json(&report)
        }
        Commands::Retry { id } => {
            let artifact = app.orchestrator.jobs().retry(&id).await?;
            print_json(&artifact)
        }
        Commands::Pipelines => {
            let specs = app.orchestrator.pipelines();
            print_json(&specs)
        }
    }
}
