//! `load_config` module: loads a static YAML config and maps it into the
//! strongly-typed engine configuration.
//!
//! This is the only place where untrusted YAML is parsed. Loosely-typed keys
//! (pipeline op names) are mapped to rich enums here, and any failure
//! surfaces as a context-rich `anyhow::Error` at the CLI boundary.
//!
//! A missing config file is not an error: the defaults are usable for local
//! runs and tests, and secrets (converter endpoint and key) can come from
//! the environment instead.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};

use docpipe_core::config::CoreConfig;
use docpipe_core::convert::ConvertOp;
use docpipe_core::pipeline::PipelineSpec;

/// Fully resolved application config.
#[derive(Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub converter_base_url: Option<String>,
    pub core: CoreConfig,
    pub pipelines: Vec<PipelineSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            converter_base_url: None,
            core: CoreConfig::default(),
            pipelines: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    data_dir: Option<PathBuf>,
    converter: Option<ConverterSection>,
    limits: Option<LimitsSection>,
    retry: Option<RetrySection>,
    #[serde(default)]
    pipelines: Vec<PipelineSection>,
}

#[derive(Debug, Deserialize)]
struct ConverterSection {
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LimitsSection {
    max_upload_bytes: Option<u64>,
    allowed_extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RetrySection {
    converter_timeout_ms: Option<u64>,
    max_convert_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PipelineSection {
    name: String,
    ops: Vec<String>,
}

/// Loads the YAML config file, falling back to defaults when it is absent.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        info!(config_path = ?path_ref, "Config file not found, using defaults");
        return Ok(AppConfig::default());
    }
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let mut core = CoreConfig::default();
    if let Some(limits) = raw.limits {
        if let Some(max) = limits.max_upload_bytes {
            core.max_upload_bytes = max;
        }
        if let Some(exts) = limits.allowed_extensions {
            core.allowed_extensions = exts.into_iter().map(|e| e.to_lowercase()).collect();
        }
    }
    if let Some(retry) = raw.retry {
        if let Some(ms) = retry.converter_timeout_ms {
            core.converter_timeout_ms = ms;
        }
        if let Some(attempts) = retry.max_convert_attempts {
            core.max_convert_attempts = attempts;
        }
        if let Some(ms) = retry.retry_backoff_ms {
            core.retry_backoff_ms = ms;
        }
    }

    let mut pipelines = Vec::with_capacity(raw.pipelines.len());
    for section in raw.pipelines {
        let mut ops = Vec::with_capacity(section.ops.len());
        for op in &section.ops {
            let parsed = op.parse::<ConvertOp>().map_err(|e| {
                error!(pipeline = %section.name, op = %op, "Unknown op in pipeline config");
                anyhow::anyhow!("pipeline `{}`: {e}", section.name)
            })?;
            ops.push(parsed);
        }
        pipelines.push(PipelineSpec::new(section.name, ops));
    }

    Ok(AppConfig {
        data_dir: raw.data_dir.unwrap_or_else(|| PathBuf::from("./data")),
        converter_base_url: raw.converter.and_then(|c| c.base_url),
        core,
        pipelines,
    })
}
