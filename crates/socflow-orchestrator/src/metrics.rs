//! System metrics computed on demand from the record store.

use crate::record::{WorkflowRecord, WorkflowStatus};
use crate::stage::Verdict;
use serde::{Deserialize, Serialize};
use socflow_abstraction::StageKind;

/// Success and failure counters for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetrics {
    /// Stage.
    pub stage: StageKind,
    /// Workflows holding a provider-produced result for this stage.
    pub succeeded: usize,
    /// Workflows that failed while this stage ran.
    pub failed: usize,
}

/// Aggregate view over every stored workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Records in the store.
    pub total_workflows: usize,
    /// Workflows in a terminal status.
    pub total_processed: usize,
    /// Workflows not yet terminal.
    pub in_progress: usize,
    /// `COMPLETED` workflows.
    pub completed: usize,
    /// `FILTERED_OUT` workflows.
    pub filtered: usize,
    /// `FAILED` workflows.
    pub failed: usize,
    /// Workflows whose current verdict is `true_positive`.
    pub true_positives: usize,
    /// Workflows whose current verdict is `false_positive`.
    pub false_positives: usize,
    /// Workflows whose current verdict is `benign`.
    pub benign: usize,
    /// Workflows whose current verdict is `suspicious`.
    pub suspicious: usize,
    /// Mean seconds from creation to completion over terminal workflows.
    pub average_processing_time_secs: f64,
    /// Per-stage counters in pipeline order.
    pub stages: Vec<StageMetrics>,
}

impl SystemMetrics {
    /// Computes metrics over a set of records.
    #[must_use]
    pub fn from_records(records: &[WorkflowRecord]) -> Self {
        let count = |status: WorkflowStatus| records.iter().filter(|r| r.status == status).count();
        let verdicts = |verdict: Verdict| {
            records.iter().filter(|r| r.verdict() == Some(verdict)).count()
        };

        let durations: Vec<f64> =
            records.iter().filter_map(WorkflowRecord::processing_time_secs).collect();
        let average_processing_time_secs = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        let stages = StageKind::ALL
            .into_iter()
            .map(|stage| StageMetrics {
                stage,
                succeeded: records.iter().filter(|r| r.has_result(stage)).count(),
                failed: records
                    .iter()
                    .filter(|r| {
                        r.status == WorkflowStatus::Failed && r.current_stage == Some(stage)
                    })
                    .count(),
            })
            .collect();

        let total_processed = records.iter().filter(|r| r.status.is_terminal()).count();

        Self {
            total_workflows: records.len(),
            total_processed,
            in_progress: records.len() - total_processed,
            completed: count(WorkflowStatus::Completed),
            filtered: count(WorkflowStatus::FilteredOut),
            failed: count(WorkflowStatus::Failed),
            true_positives: verdicts(Verdict::TruePositive),
            false_positives: verdicts(Verdict::FalsePositive),
            benign: verdicts(Verdict::Benign),
            suspicious: verdicts(Verdict::Suspicious),
            average_processing_time_secs,
            stages,
        }
    }

    /// Counters for one stage.
    #[must_use]
    pub fn stage(&self, kind: StageKind) -> Option<&StageMetrics> {
        self.stages.iter().find(|s| s.stage == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Alert;
    use crate::stage::TriageResult;
    use chrono::Duration;

    fn record(id: &str, status: WorkflowStatus) -> WorkflowRecord {
        let alert = Alert::parse_batch(&format!(
            r#"{{"alert_id": "{id}", "rule_id": "R-1", "severity": "Low"}}"#
        ))
        .unwrap()
        .remove(0);
        let mut record = WorkflowRecord::new(format!("wf-{id}"), alert);
        record.status = status;
        record
    }

    fn triage(verdict: Verdict) -> TriageResult {
        TriageResult {
            verdict,
            confidence: 0.9,
            noise_score: 0.9,
            requires_investigation: false,
            key_indicators: vec![],
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_empty_store() {
        let metrics = SystemMetrics::from_records(&[]);
        assert_eq!(metrics.total_workflows, 0);
        assert!(metrics.average_processing_time_secs.abs() < f64::EPSILON);
        assert_eq!(metrics.stages.len(), 4);
    }

    #[test]
    fn test_counts_and_buckets() {
        let mut filtered = record("a", WorkflowStatus::FilteredOut);
        filtered.triage = Some(triage(Verdict::Benign));
        filtered.completed_at = Some(filtered.created_at + Duration::seconds(2));

        let mut failed = record("b", WorkflowStatus::Failed);
        failed.current_stage = Some(StageKind::Investigation);
        failed.triage = Some(triage(Verdict::Suspicious));
        failed.completed_at = Some(failed.created_at + Duration::seconds(4));

        let running = record("c", WorkflowStatus::TriageRunning);

        let metrics = SystemMetrics::from_records(&[filtered, failed, running]);
        assert_eq!(metrics.total_workflows, 3);
        assert_eq!(metrics.total_processed, 2);
        assert_eq!(metrics.in_progress, 1);
        assert_eq!(metrics.filtered, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.benign, 1);
        assert_eq!(metrics.suspicious, 1);
        assert!((metrics.average_processing_time_secs - 3.0).abs() < 1e-9);

        let triage_stage = metrics.stage(StageKind::Triage).unwrap();
        assert_eq!(triage_stage.succeeded, 2);
        let investigation = metrics.stage(StageKind::Investigation).unwrap();
        assert_eq!(investigation.failed, 1);
        assert_eq!(investigation.succeeded, 0);
    }
}
