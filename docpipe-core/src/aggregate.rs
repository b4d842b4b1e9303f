//! Aggregation engine: merges analysis results into one derived report.
//!
//! Many analysis-result artifacts sharing a grouping key (for example daily
//! analyses of one ISO week) fan into a single aggregated-report artifact.
//! Validation is all-or-nothing: if any member is missing, of the wrong
//! kind, not succeeded, keyed differently or unparseable, the whole call is
//! rejected with `IncompleteInput` naming every offending member, and
//! nothing is written.
//!
//! Aggregating again for the same key produces a new report artifact rather
//! than overwriting the previous one, preserving audit history. Callers pick
//! the current report as the most recently created one per key, which
//! [`Aggregator::current_report`] implements.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::{Artifact, ArtifactFilter, ArtifactKind, ArtifactStatus};
use crate::blob::BlobStore;
use crate::error::CoreError;
use crate::store::ArtifactStore;

/// One dated event in an analysis timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub date: NaiveDate,
    pub description: String,
}

/// Structured payload of every analysis-result artifact, and of the merged
/// report. Free-text prose lives in `summary`; assertions in tests should
/// stick to the structured fields, since converter prose is not
/// deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisExtract {
    pub summary: String,
    #[serde(default)]
    pub key_facts: Vec<String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
}

pub struct Aggregator {
    store: Arc<dyn ArtifactStore>,
    blobs: Arc<dyn BlobStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn ArtifactStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// Merge the given members into a new aggregated-report artifact.
    pub async fn aggregate(
        &self,
        grouping_key: &str,
        member_ids: &[String],
    ) -> Result<Artifact, CoreError> {
        info!(
            grouping_key,
            members = member_ids.len(),
            "starting aggregation"
        );
        let members = self.validate_members(grouping_key, member_ids).await?;

        let merged = merge_extracts(&members);
        let payload = serde_json::to_vec(&merged)
            .map_err(|e| CoreError::internal(format!("failed to encode report: {e}")))?;
        let payload_len = payload.len() as u64;
        let location = self.blobs.put_bytes(payload).await?;

        let origin: Vec<String> = members.iter().map(|(a, _)| a.id.clone()).collect();
        let report = Artifact::new(
            ArtifactKind::AggregatedReport,
            format!("{grouping_key}-report.json"),
            location,
            payload_len,
            origin,
        )
        .with_status(ArtifactStatus::Succeeded)
        .with_grouping_key(Some(grouping_key.to_string()));

        let stored = self.store.put(report).await?;
        info!(
            grouping_key,
            report_id = %stored.id,
            members = member_ids.len(),
            "aggregation complete"
        );
        Ok(stored)
    }

    /// The most recently created report for a grouping key, if any.
    pub async fn current_report(
        &self,
        grouping_key: &str,
    ) -> Result<Option<Artifact>, CoreError> {
        let filter = ArtifactFilter {
            kind: Some(ArtifactKind::AggregatedReport),
            grouping_key: Some(grouping_key.to_string()),
        };
        // List order is created_at ascending, so the newest report is last.
        let reports = self.store.list(filter, 0, usize::MAX).await?;
        Ok(reports.into_iter().last())
    }

    /// Resolve and check every member, collecting all problems before
    /// rejecting. Returns members paired with their parsed extracts, in
    /// chronological (created_at, id) order.
    async fn validate_members(
        &self,
        grouping_key: &str,
        member_ids: &[String],
    ) -> Result<Vec<(Artifact, AnalysisExtract)>, CoreError> {
        let mut problems: Vec<String> = Vec::new();
        if member_ids.is_empty() {
            problems.push("member list is empty".to_string());
        }

        let mut members: Vec<(Artifact, AnalysisExtract)> = Vec::new();
        for id in member_ids {
            let artifact = match self.store.get(id).await {
                Ok(a) => a,
                Err(CoreError::NotFound { .. }) => {
                    problems.push(format!("member `{id}` does not exist"));
                    continue;
                }
                Err(other) => return Err(other),
            };
            if artifact.kind != ArtifactKind::AnalysisResult {
                problems.push(format!(
                    "member `{id}` has kind {}, expected analysis-result",
                    artifact.kind
                ));
                continue;
            }
            if artifact.status != ArtifactStatus::Succeeded {
                problems.push(format!(
                    "member `{id}` has status {:?}, expected succeeded",
                    artifact.status
                ));
                continue;
            }
            if artifact.grouping_key.as_deref() != Some(grouping_key) {
                problems.push(format!(
                    "member `{id}` has grouping key {:?}, expected `{grouping_key}`",
                    artifact.grouping_key
                ));
                continue;
            }
            let bytes = self.blobs.get_bytes(&artifact.content_location).await?;
            match serde_json::from_slice::<AnalysisExtract>(&bytes) {
                Ok(extract) => members.push((artifact, extract)),
                Err(e) => {
                    problems.push(format!("member `{id}` payload is not a valid extract: {e}"))
                }
            }
        }

        if !problems.is_empty() {
            warn!(grouping_key, problems = ?problems, "aggregation rejected");
            return Err(CoreError::IncompleteInput {
                grouping_key: grouping_key.to_string(),
                problems,
            });
        }

        members.sort_by(|(a, _), (b, _)| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(members)
    }
}

/// Deterministic merge of member extracts.
///
/// Summaries concatenate in member creation order. Key facts union with
/// exact-text dedup, first occurrence wins. Timelines merge sorted by event
/// date; the sort is stable, so events on the same date keep member order.
fn merge_extracts(members: &[(Artifact, AnalysisExtract)]) -> AnalysisExtract {
    let mut summary_parts: Vec<&str> = Vec::new();
    let mut key_facts: Vec<String> = Vec::new();
    let mut seen_facts: HashSet<String> = HashSet::new();
    let mut timeline: Vec<TimelineEvent> = Vec::new();

    for (_, extract) in members {
        if !extract.summary.is_empty() {
            summary_parts.push(extract.summary.as_str());
        }
        for fact in &extract.key_facts {
            if seen_facts.insert(fact.clone()) {
                key_facts.push(fact.clone());
            }
        }
        timeline.extend(extract.timeline.iter().cloned());
    }
    timeline.sort_by_key(|event| event.date);

    AnalysisExtract {
        summary: summary_parts.join("\n\n"),
        key_facts,
        timeline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(created_secs: i64, extract: AnalysisExtract) -> (Artifact, AnalysisExtract) {
        let mut artifact = Artifact::new(
            ArtifactKind::AnalysisResult,
            "day.analysis.json",
            "blob",
            1,
            vec![],
        );
        artifact.created_at = chrono::DateTime::from_timestamp(created_secs, 0).unwrap();
        (artifact, extract)
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid date")
    }

    #[test]
    fn merge_unions_facts_and_sorts_timeline_stably() {
        let first = member(
            100,
            AnalysisExtract {
                summary: "Monday".into(),
                key_facts: vec!["release shipped".into(), "outage resolved".into()],
                timeline: vec![
                    TimelineEvent {
                        date: date("2024-01-30"),
                        description: "deploy".into(),
                    },
                    TimelineEvent {
                        date: date("2024-02-01"),
                        description: "first-morning standup".into(),
                    },
                ],
            },
        );
        let second = member(
            200,
            AnalysisExtract {
                summary: "Tuesday".into(),
                key_facts: vec!["outage resolved".into(), "budget approved".into()],
                timeline: vec![TimelineEvent {
                    date: date("2024-02-01"),
                    description: "retro".into(),
                }],
            },
        );

        let merged = merge_extracts(&[first, second]);

        assert_eq!(merged.summary, "Monday\n\nTuesday");
        assert_eq!(
            merged.key_facts,
            vec![
                "release shipped".to_string(),
                "outage resolved".to_string(),
                "budget approved".to_string(),
            ],
            "facts dedup by exact text, first occurrence wins"
        );
        let descriptions: Vec<&str> = merged
            .timeline
            .iter()
            .map(|e| e.description.as_str())
            .collect();
        assert_eq!(
            descriptions,
            vec!["deploy", "first-morning standup", "retro"],
            "same-date events keep member order"
        );
    }

    #[test]
    fn merge_of_empty_members_is_empty() {
        let merged = merge_extracts(&[]);
        assert!(merged.summary.is_empty());
        assert!(merged.key_facts.is_empty());
        assert!(merged.timeline.is_empty());
    }
}
