//! The workflow transition table and branch policy.
//!
//! Every status change goes through [`next_status`]; the orchestrator never
//! assigns a status directly.

use crate::alert::{Alert, Severity};
use crate::record::WorkflowStatus;
use crate::stage::{DecisionResult, Impact, Priority, TriageResult, Verdict};
use serde::{Deserialize, Serialize};
use socflow_abstraction::StageKind;
use std::fmt;
use thiserror::Error;

/// An event that moves a workflow between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// A stage begins.
    Start(StageKind),
    /// A stage produced a valid result.
    Complete(StageKind),
    /// Triage classified the alert as noise needing no action.
    Filter,
    /// Decision needs no response.
    Finish,
    /// The running stage failed.
    Fail,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(kind) => write!(f, "start {kind}"),
            Self::Complete(kind) => write!(f, "complete {kind}"),
            Self::Filter => f.write_str("filter"),
            Self::Finish => f.write_str("finish"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

/// A transition that is not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("transition '{transition}' is not allowed from {from}")]
pub struct BranchPolicyError {
    /// Status the workflow was in.
    pub from: WorkflowStatus,
    /// Attempted transition.
    pub transition: Transition,
}

/// Looks up the status reached by applying `transition` in `from`.
///
/// # Errors
/// Returns `BranchPolicyError` for any pair not listed in the table.
pub fn next_status(
    from: WorkflowStatus,
    transition: Transition,
) -> Result<WorkflowStatus, BranchPolicyError> {
    use StageKind::{Decision, Investigation, Response, Triage};
    use Transition::{Complete, Fail, Filter, Finish, Start};
    use WorkflowStatus as S;

    let next = match (from, transition) {
        (S::Created, Start(Triage)) => S::TriageRunning,
        (S::TriageRunning, Complete(Triage)) => S::TriageDone,
        (S::TriageDone, Filter) => S::FilteredOut,
        (S::TriageDone, Start(Investigation)) => S::InvestigationRunning,
        (S::TriageDone, Start(Response)) => S::ResponseRunning,
        (S::InvestigationRunning, Complete(Investigation)) => S::InvestigationDone,
        (S::InvestigationDone, Start(Decision)) => S::DecisionRunning,
        (S::DecisionRunning, Complete(Decision)) => S::DecisionDone,
        (S::DecisionDone, Start(Response)) => S::ResponseRunning,
        (S::DecisionDone, Finish) => S::Completed,
        (S::ResponseRunning, Complete(Response)) => S::Completed,
        (status, Fail) if status.is_running() => S::Failed,
        _ => return Err(BranchPolicyError { from, transition }),
    };

    Ok(next)
}

/// Thresholds that decide early exit and response (`[policy]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchPolicy {
    /// Noise score above which triage may close the alert.
    pub noise_threshold: f64,
    /// Confidence at or above which a benign/false-positive verdict may close the alert.
    pub benign_confidence_threshold: f64,
    /// Priorities that always trigger the response stage.
    pub response_priorities: Vec<Priority>,
}

impl Default for BranchPolicy {
    fn default() -> Self {
        Self {
            noise_threshold: 0.8,
            benign_confidence_threshold: 0.9,
            response_priorities: vec![Priority::P1, Priority::P2],
        }
    }
}

impl BranchPolicy {
    /// Whether triage closes the alert without investigation.
    #[must_use]
    pub fn is_noise(&self, triage: &TriageResult) -> bool {
        if triage.requires_investigation {
            return false;
        }
        let noisy = triage.noise_score > self.noise_threshold;
        let confidently_benign = matches!(triage.verdict, Verdict::Benign | Verdict::FalsePositive)
            && triage.confidence >= self.benign_confidence_threshold;
        noisy || confidently_benign
    }

    /// Builds a decision from a triage result for alerts that skip investigation.
    #[must_use]
    pub fn derive_decision(&self, triage: &TriageResult, alert: &Alert) -> DecisionResult {
        let actionable = matches!(triage.verdict, Verdict::TruePositive | Verdict::Suspicious);
        let priority = if actionable {
            match alert.severity {
                Severity::Critical => Priority::P1,
                Severity::High => Priority::P2,
                Severity::Medium => Priority::P3,
                Severity::Low | Severity::Informational => Priority::P4,
            }
        } else {
            Priority::P4
        };
        let escalation_required =
            triage.verdict == Verdict::TruePositive && alert.severity.is_elevated();
        let estimated_impact = match priority {
            Priority::P1 => Impact::Critical,
            Priority::P2 => Impact::High,
            Priority::P3 => Impact::Medium,
            Priority::P4 => Impact::Low,
        };

        let recommended_actions = if actionable {
            vec![
                "Open incident for alert closed at triage".to_string(),
                "Verify triage indicators with asset owner".to_string(),
            ]
        } else {
            vec![
                "Close alert as noise".to_string(),
                "Review detection rule for tuning".to_string(),
            ]
        };

        DecisionResult {
            final_verdict: triage.verdict,
            priority,
            confidence: triage.confidence,
            recommended_actions,
            escalation_required,
            estimated_impact,
            rationale: format!(
                "Closed at triage: verdict {} with confidence {:.2}, noise score {:.2}.",
                triage.verdict, triage.confidence, triage.noise_score
            ),
        }
    }

    /// Whether a decision calls for the response stage.
    #[must_use]
    pub fn needs_response(&self, decision: &DecisionResult) -> bool {
        decision.escalation_required || self.response_priorities.contains(&decision.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AssetRefs, MitreInfo};
    use serde_json::Value;
    use WorkflowStatus as S;

    fn alert(severity: Severity) -> Alert {
        Alert {
            alert_id: "A-1".to_string(),
            rule_id: "R-1".to_string(),
            rule_name: None,
            severity,
            timestamp: String::new(),
            description: String::new(),
            mitre: MitreInfo::default(),
            assets: AssetRefs::default(),
            raw_data: Value::Null,
        }
    }

    fn triage(verdict: Verdict, confidence: f64, noise: f64, investigate: bool) -> TriageResult {
        TriageResult {
            verdict,
            confidence,
            noise_score: noise,
            requires_investigation: investigate,
            key_indicators: vec![],
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_full_path_through_table() {
        let steps = [
            Transition::Start(StageKind::Triage),
            Transition::Complete(StageKind::Triage),
            Transition::Start(StageKind::Investigation),
            Transition::Complete(StageKind::Investigation),
            Transition::Start(StageKind::Decision),
            Transition::Complete(StageKind::Decision),
            Transition::Start(StageKind::Response),
            Transition::Complete(StageKind::Response),
        ];
        let end = steps.into_iter().try_fold(S::Created, next_status).unwrap();
        assert_eq!(end, S::Completed);
    }

    #[test]
    fn test_filter_and_finish_edges() {
        assert_eq!(next_status(S::TriageDone, Transition::Filter), Ok(S::FilteredOut));
        assert_eq!(next_status(S::DecisionDone, Transition::Finish), Ok(S::Completed));
        assert_eq!(
            next_status(S::TriageDone, Transition::Start(StageKind::Response)),
            Ok(S::ResponseRunning)
        );
    }

    #[test]
    fn test_fail_only_from_running_states() {
        for status in WorkflowStatus::ALL {
            let result = next_status(status, Transition::Fail);
            assert_eq!(result.is_ok(), status.is_running(), "{status}");
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let transitions = [
            Transition::Start(StageKind::Triage),
            Transition::Complete(StageKind::Response),
            Transition::Filter,
            Transition::Finish,
            Transition::Fail,
        ];
        for status in [S::Completed, S::FilteredOut, S::Failed] {
            for t in transitions {
                assert!(next_status(status, t).is_err());
            }
        }
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let err = next_status(S::TriageDone, Transition::Start(StageKind::Decision)).unwrap_err();
        assert_eq!(err.from, S::TriageDone);
        assert_eq!(err.to_string(), "transition 'start decision' is not allowed from TRIAGE_DONE");
    }

    #[test]
    fn test_noise_rule() {
        let policy = BranchPolicy::default();
        assert!(policy.is_noise(&triage(Verdict::Suspicious, 0.5, 0.85, false)));
        assert!(policy.is_noise(&triage(Verdict::Benign, 0.95, 0.1, false)));
        assert!(!policy.is_noise(&triage(Verdict::Benign, 0.85, 0.1, false)));
        assert!(!policy.is_noise(&triage(Verdict::Benign, 0.99, 0.99, true)));
        // Threshold is exclusive for noise, inclusive for confidence.
        assert!(!policy.is_noise(&triage(Verdict::Suspicious, 0.5, 0.8, false)));
        assert!(policy.is_noise(&triage(Verdict::FalsePositive, 0.9, 0.0, false)));
    }

    #[test]
    fn test_derived_decision_for_benign_noise_needs_no_response() {
        let policy = BranchPolicy::default();
        let decision = policy.derive_decision(
            &triage(Verdict::Benign, 0.95, 0.9, false),
            &alert(Severity::High),
        );
        assert_eq!(decision.priority, Priority::P4);
        assert!(!decision.escalation_required);
        assert!(!policy.needs_response(&decision));
    }

    #[test]
    fn test_derived_decision_for_true_positive_escalates() {
        let policy = BranchPolicy::default();
        let decision = policy.derive_decision(
            &triage(Verdict::TruePositive, 0.7, 0.9, false),
            &alert(Severity::Critical),
        );
        assert_eq!(decision.priority, Priority::P1);
        assert_eq!(decision.estimated_impact, Impact::Critical);
        assert!(decision.escalation_required);
        assert!(policy.needs_response(&decision));
    }

    #[test]
    fn test_response_priorities_are_configurable() {
        let policy = BranchPolicy { response_priorities: vec![Priority::P1], ..Default::default() };
        let mut decision = policy.derive_decision(
            &triage(Verdict::Suspicious, 0.7, 0.9, false),
            &alert(Severity::High),
        );
        assert_eq!(decision.priority, Priority::P2);
        assert!(!policy.needs_response(&decision));
        decision.escalation_required = true;
        assert!(policy.needs_response(&decision));
    }
}
