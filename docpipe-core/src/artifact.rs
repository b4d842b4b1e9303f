//! Artifact model: the unit of content tracked by the pipeline.
//!
//! Every upload, converted document, generated script, synthesized audio
//! file, analysis result and aggregated report is an [`Artifact`]. Lineage is
//! recorded as a list of parent ids in `origin`, forming a DAG by
//! construction (ids are assigned once and never reused, so a derivation can
//! only point backwards).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    RawUpload,
    ConvertedDocument,
    GeneratedScript,
    SynthesizedAudio,
    AnalysisResult,
    AggregatedReport,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactKind::RawUpload => "raw-upload",
            ArtifactKind::ConvertedDocument => "converted-document",
            ArtifactKind::GeneratedScript => "generated-script",
            ArtifactKind::SynthesizedAudio => "synthesized-audio",
            ArtifactKind::AnalysisResult => "analysis-result",
            ArtifactKind::AggregatedReport => "aggregated-report",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw-upload" => Ok(ArtifactKind::RawUpload),
            "converted-document" => Ok(ArtifactKind::ConvertedDocument),
            "generated-script" => Ok(ArtifactKind::GeneratedScript),
            "synthesized-audio" => Ok(ArtifactKind::SynthesizedAudio),
            "analysis-result" => Ok(ArtifactKind::AnalysisResult),
            "aggregated-report" => Ok(ArtifactKind::AggregatedReport),
            other => Err(format!("unknown artifact kind `{other}`")),
        }
    }
}

/// Conversion lifecycle state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

/// Classification of a conversion failure, recorded on the failed artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    InvalidInput,
    ConversionError,
    Timeout,
    Internal,
}

/// Failure kind plus a human-readable message. Present iff status is Failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: FailureKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A tracked piece of content at some pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Opaque globally unique id, assigned once at creation.
    pub id: String,
    pub kind: ArtifactKind,
    /// Name the content was uploaded or derived under, for human consumption.
    pub original_name: String,
    /// Opaque reference to the bytes held by the blob store.
    pub content_location: String,
    pub content_length: u64,
    /// Ids of the artifact(s) this one was derived from. Empty for uploads.
    pub origin: Vec<String>,
    pub status: ArtifactStatus,
    /// Cluster label for aggregation, e.g. an ISO week. Only set on
    /// aggregation-eligible artifacts.
    pub grouping_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_detail: Option<ErrorDetail>,
}

impl Artifact {
    /// New pending artifact with a fresh id and current timestamps.
    pub fn new(
        kind: ArtifactKind,
        original_name: impl Into<String>,
        content_location: impl Into<String>,
        content_length: u64,
        origin: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            original_name: original_name.into(),
            content_location: content_location.into(),
            content_length,
            origin,
            status: ArtifactStatus::Pending,
            grouping_key: None,
            created_at: now,
            updated_at: now,
            error_detail: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ArtifactStatus) -> Self {
        self.status = status;
        self.updated_at = Utc::now();
        self
    }

    #[must_use]
    pub fn with_grouping_key(mut self, grouping_key: Option<String>) -> Self {
        self.grouping_key = grouping_key;
        self
    }
}

/// Filter for listing artifacts. Empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactFilter {
    pub kind: Option<ArtifactKind>,
    pub grouping_key: Option<String>,
}

impl ArtifactFilter {
    pub fn matches(&self, artifact: &Artifact) -> bool {
        if let Some(kind) = self.kind {
            if artifact.kind != kind {
                return false;
            }
        }
        if let Some(key) = &self.grouping_key {
            if artifact.grouping_key.as_deref() != Some(key.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_artifact_is_pending_with_fresh_id() {
        let a = Artifact::new(ArtifactKind::RawUpload, "report.docx", "blob-1", 42, vec![]);
        let b = Artifact::new(ArtifactKind::RawUpload, "report.docx", "blob-2", 42, vec![]);

        assert_ne!(a.id, b.id, "ids must never repeat");
        assert_eq!(a.status, ArtifactStatus::Pending);
        assert!(a.origin.is_empty());
        assert!(a.error_detail.is_none());
        assert!(a.updated_at >= a.created_at);
    }

    #[test]
    fn kind_roundtrips_through_display_and_parse() {
        let kinds = [
            ArtifactKind::RawUpload,
            ArtifactKind::ConvertedDocument,
            ArtifactKind::GeneratedScript,
            ArtifactKind::SynthesizedAudio,
            ArtifactKind::AnalysisResult,
            ArtifactKind::AggregatedReport,
        ];
        for kind in kinds {
            let parsed: ArtifactKind = kind.to_string().parse().expect("parse back");
            assert_eq!(parsed, kind);
        }
        assert!("weekly-report".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn filter_matches_kind_and_grouping_key() {
        let artifact = Artifact::new(
            ArtifactKind::AnalysisResult,
            "day.json",
            "blob-3",
            10,
            vec![],
        )
        .with_grouping_key(Some("2024-W05".into()));

        let by_kind = ArtifactFilter {
            kind: Some(ArtifactKind::AnalysisResult),
            grouping_key: None,
        };
        let by_key = ArtifactFilter {
            kind: None,
            grouping_key: Some("2024-W05".into()),
        };
        let wrong_key = ArtifactFilter {
            kind: None,
            grouping_key: Some("2024-W06".into()),
        };

        assert!(by_kind.matches(&artifact));
        assert!(by_key.matches(&artifact));
        assert!(!wrong_key.matches(&artifact));
        assert!(ArtifactFilter::default().matches(&artifact));
    }
}
