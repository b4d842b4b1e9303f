//! Converter gateway: uniform fallible-call interface to external converters.
//!
//! The raw [`Converter`] trait is the collaborator seam. Implementations may
//! call a local library, a subprocess or a remote AI/TTS API; the engine does
//! not care. The [`ConverterGateway`] wraps a converter with a bounded
//! deadline per call and normalizes outcomes into the engine's error
//! taxonomy, keeping `Timeout` distinct from a converter-reported failure.
//!
//! Converter calls are not assumed idempotent: calling twice with the same
//! input may produce byte-different output (TTS jitter, model sampling), so
//! nothing in the engine caches on output equality.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::artifact::ArtifactKind;
use crate::error::CoreError;

/// Conversion operations supported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConvertOp {
    DocToPdf,
    TextToScript,
    ScriptToAudio,
    TextToAnalysis,
}

impl ConvertOp {
    /// Kind of the artifact a successful call derives.
    pub fn output_kind(&self) -> ArtifactKind {
        match self {
            ConvertOp::DocToPdf => ArtifactKind::ConvertedDocument,
            ConvertOp::TextToScript => ArtifactKind::GeneratedScript,
            ConvertOp::ScriptToAudio => ArtifactKind::SynthesizedAudio,
            ConvertOp::TextToAnalysis => ArtifactKind::AnalysisResult,
        }
    }

    /// Extension for the derived artifact's name.
    pub fn output_extension(&self) -> &'static str {
        match self {
            ConvertOp::DocToPdf => ".pdf",
            ConvertOp::TextToScript => ".script.txt",
            ConvertOp::ScriptToAudio => ".mp3",
            ConvertOp::TextToAnalysis => ".analysis.json",
        }
    }
}

impl std::fmt::Display for ConvertOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConvertOp::DocToPdf => "doc-to-pdf",
            ConvertOp::TextToScript => "text-to-script",
            ConvertOp::ScriptToAudio => "script-to-audio",
            ConvertOp::TextToAnalysis => "text-to-analysis",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ConvertOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doc-to-pdf" => Ok(ConvertOp::DocToPdf),
            "text-to-script" => Ok(ConvertOp::TextToScript),
            "script-to-audio" => Ok(ConvertOp::ScriptToAudio),
            "text-to-analysis" => Ok(ConvertOp::TextToAnalysis),
            other => Err(format!("unknown conversion op `{other}`")),
        }
    }
}

/// Options passed through to the converter. Opaque to the engine, except
/// that `grouping_key` is also stamped onto analysis-result outputs so they
/// become eligible for aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertOptions {
    pub voice: Option<String>,
    pub language: Option<String>,
    pub grouping_key: Option<String>,
}

/// Failure reported by the converter itself, as opposed to a deadline miss.
#[derive(Debug)]
pub enum ConvertFailure {
    /// Malformed or unsupported source content.
    InvalidInput(String),
    /// The converter ran and reported an error.
    Failed(String),
}

/// Trait for the external conversion function. Implemented by real clients
/// and by test mocks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert input bytes for the given op, returning output bytes.
    ///
    /// Implementors must be side-effect-free on failure: no partial output
    /// anywhere the engine could observe it.
    async fn convert(
        &self,
        op: ConvertOp,
        input: &[u8],
        options: &ConvertOptions,
    ) -> Result<Vec<u8>, ConvertFailure>;
}

/// Deadline-bounded, error-normalizing wrapper around a [`Converter`].
#[derive(Clone)]
pub struct ConverterGateway {
    converter: Arc<dyn Converter>,
    timeout: Duration,
}

impl ConverterGateway {
    pub fn new(converter: Arc<dyn Converter>, timeout: Duration) -> Self {
        Self { converter, timeout }
    }

    /// Single bounded call. A deadline miss is `Timeout`; converter-reported
    /// failures map to `InvalidInput` or `ConversionError`.
    pub async fn convert(
        &self,
        op: ConvertOp,
        input: &[u8],
        options: &ConvertOptions,
    ) -> Result<Vec<u8>, CoreError> {
        debug!(op = %op, input_len = input.len(), timeout_ms = self.timeout.as_millis() as u64, "converter call");
        match tokio::time::timeout(self.timeout, self.converter.convert(op, input, options)).await
        {
            Err(_elapsed) => {
                error!(op = %op, timeout_ms = self.timeout.as_millis() as u64, "converter call exceeded deadline");
                Err(CoreError::Timeout {
                    op: op.to_string(),
                    attempts: 1,
                })
            }
            Ok(Err(ConvertFailure::InvalidInput(reason))) => {
                error!(op = %op, reason = %reason, "converter rejected input");
                Err(CoreError::InvalidInput { reason })
            }
            Ok(Err(ConvertFailure::Failed(message))) => {
                error!(op = %op, message = %message, "converter reported failure");
                Err(CoreError::ConversionError { message })
            }
            Ok(Ok(output)) => {
                debug!(op = %op, output_len = output.len(), "converter call succeeded");
                Ok(output)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canned converter that sleeps before answering, for deadline tests.
    struct SlowConverter {
        delay: Duration,
    }

    #[async_trait]
    impl Converter for SlowConverter {
        async fn convert(
            &self,
            _op: ConvertOp,
            input: &[u8],
            _options: &ConvertOptions,
        ) -> Result<Vec<u8>, ConvertFailure> {
            tokio::time::sleep(self.delay).await;
            Ok(input.to_vec())
        }
    }

    #[tokio::test]
    async fn gateway_reports_timeout_distinct_from_failure() {
        let slow = Arc::new(SlowConverter {
            delay: Duration::from_millis(200),
        });
        let gateway = ConverterGateway::new(slow, Duration::from_millis(10));

        let err = gateway
            .convert(ConvertOp::DocToPdf, b"doc", &ConvertOptions::default())
            .await
            .expect_err("deadline must be exceeded");
        assert!(matches!(err, CoreError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn gateway_normalizes_converter_reported_failures() {
        let mut converter = MockConverter::new();
        converter
            .expect_convert()
            .returning(|_, _, _| Err(ConvertFailure::InvalidInput("not a docx".into())));
        let gateway = ConverterGateway::new(Arc::new(converter), Duration::from_secs(1));

        let err = gateway
            .convert(ConvertOp::DocToPdf, b"oops", &ConvertOptions::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, CoreError::InvalidInput { .. }), "got {err:?}");

        let mut converter = MockConverter::new();
        converter
            .expect_convert()
            .returning(|_, _, _| Err(ConvertFailure::Failed("renderer crashed".into())));
        let gateway = ConverterGateway::new(Arc::new(converter), Duration::from_secs(1));

        let err = gateway
            .convert(ConvertOp::DocToPdf, b"doc", &ConvertOptions::default())
            .await
            .expect_err("must fail");
        assert!(
            matches!(err, CoreError::ConversionError { .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn gateway_passes_output_through_on_success() {
        let mut converter = MockConverter::new();
        converter
            .expect_convert()
            .returning(|_, input, _| Ok([input, b" converted".as_slice()].concat()));
        let gateway = ConverterGateway::new(Arc::new(converter), Duration::from_secs(1));

        let out = gateway
            .convert(ConvertOp::DocToPdf, b"doc", &ConvertOptions::default())
            .await
            .expect("success");
        assert_eq!(out, b"doc converted");
    }

    #[test]
    fn op_parse_roundtrip_and_output_kinds() {
        for op in [
            ConvertOp::DocToPdf,
            ConvertOp::TextToScript,
            ConvertOp::ScriptToAudio,
            ConvertOp::TextToAnalysis,
        ] {
            let parsed: ConvertOp = op.to_string().parse().expect("parse back");
            assert_eq!(parsed, op);
        }
        assert_eq!(
            ConvertOp::TextToAnalysis.output_kind(),
            ArtifactKind::AnalysisResult
        );
        assert!("audio-to-text".parse::<ConvertOp>().is_err());
    }
}
