//! Workflow records and their lifecycle status.

use crate::alert::Alert;
use crate::stage::{
    DecisionResult, InvestigationResult, Priority, ResponseResult, StageResult, TriageResult,
    Verdict,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use socflow_abstraction::StageKind;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Record exists, triage not yet dispatched.
    Created,
    /// Triage in progress.
    TriageRunning,
    /// Triage finished.
    TriageDone,
    /// Closed as noise after triage.
    FilteredOut,
    /// Investigation in progress.
    InvestigationRunning,
    /// Investigation finished.
    InvestigationDone,
    /// Decision in progress.
    DecisionRunning,
    /// Decision finished.
    DecisionDone,
    /// Response in progress.
    ResponseRunning,
    /// All required stages finished.
    Completed,
    /// A stage failed.
    Failed,
}

impl WorkflowStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 11] = [
        Self::Created,
        Self::TriageRunning,
        Self::TriageDone,
        Self::FilteredOut,
        Self::InvestigationRunning,
        Self::InvestigationDone,
        Self::DecisionRunning,
        Self::DecisionDone,
        Self::ResponseRunning,
        Self::Completed,
        Self::Failed,
    ];

    /// SCREAMING_SNAKE_CASE name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::TriageRunning => "TRIAGE_RUNNING",
            Self::TriageDone => "TRIAGE_DONE",
            Self::FilteredOut => "FILTERED_OUT",
            Self::InvestigationRunning => "INVESTIGATION_RUNNING",
            Self::InvestigationDone => "INVESTIGATION_DONE",
            Self::DecisionRunning => "DECISION_RUNNING",
            Self::DecisionDone => "DECISION_DONE",
            Self::ResponseRunning => "RESPONSE_RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// `COMPLETED`, `FILTERED_OUT` or `FAILED`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::FilteredOut | Self::Failed)
    }

    /// The stage executing in this status, if any.
    #[must_use]
    pub const fn running_stage(self) -> Option<StageKind> {
        match self {
            Self::TriageRunning => Some(StageKind::Triage),
            Self::InvestigationRunning => Some(StageKind::Investigation),
            Self::DecisionRunning => Some(StageKind::Decision),
            Self::ResponseRunning => Some(StageKind::Response),
            _ => None,
        }
    }

    /// Whether a stage is executing.
    #[must_use]
    pub const fn is_running(self) -> bool {
        self.running_stage().is_some()
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| format!("unknown workflow status '{s}'"))
    }
}

/// Full state of one alert's workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// System-generated identifier.
    pub workflow_id: String,
    /// The submitted alert.
    pub alert: Alert,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// Stage running or last run; kept on failure.
    pub current_stage: Option<StageKind>,
    /// Triage result.
    pub triage: Option<TriageResult>,
    /// Investigation result.
    pub investigation: Option<InvestigationResult>,
    /// Decision result, from the provider or derived at triage.
    pub decision: Option<DecisionResult>,
    /// Whether `decision` was derived from triage without a provider call.
    #[serde(default)]
    pub decision_derived: bool,
    /// Response result.
    pub response: Option<ResponseResult>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time the workflow reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error that failed the workflow.
    pub last_error: Option<String>,
    /// Provider fallbacks and similar notices.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl WorkflowRecord {
    /// Creates a record in `CREATED`.
    #[must_use]
    pub fn new(workflow_id: String, alert: Alert) -> Self {
        Self {
            workflow_id,
            alert,
            status: WorkflowStatus::Created,
            current_stage: None,
            triage: None,
            investigation: None,
            decision: None,
            decision_derived: false,
            response: None,
            created_at: Utc::now(),
            completed_at: None,
            last_error: None,
            warnings: Vec::new(),
        }
    }

    /// Stores a stage result in its slot.
    pub fn set_result(&mut self, result: StageResult) {
        match result {
            StageResult::Triage(r) => self.triage = Some(r),
            StageResult::Investigation(r) => self.investigation = Some(r),
            StageResult::Decision(r) => {
                self.decision = Some(r);
                self.decision_derived = false;
            }
            StageResult::Response(r) => self.response = Some(r),
        }
    }

    /// Whether the slot for `kind` holds a provider-produced result.
    #[must_use]
    pub const fn has_result(&self, kind: StageKind) -> bool {
        match kind {
            StageKind::Triage => self.triage.is_some(),
            StageKind::Investigation => self.investigation.is_some(),
            StageKind::Decision => self.decision.is_some() && !self.decision_derived,
            StageKind::Response => self.response.is_some(),
        }
    }

    /// Decision verdict if there is one, else the triage verdict.
    #[must_use]
    pub fn verdict(&self) -> Option<Verdict> {
        self.decision
            .as_ref()
            .map(|d| d.final_verdict)
            .or_else(|| self.triage.as_ref().map(|t| t.verdict))
    }

    /// Decided priority.
    #[must_use]
    pub fn priority(&self) -> Option<Priority> {
        self.decision.as_ref().map(|d| d.priority)
    }

    /// Seconds from creation to completion.
    #[must_use]
    pub fn processing_time_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.created_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Builds the summary view.
    #[must_use]
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            workflow_id: self.workflow_id.clone(),
            alert_id: self.alert.alert_id.clone(),
            status: self.status,
            current_stage: self.current_stage,
            verdict: self.verdict(),
            priority: self.priority(),
            ticket_id: self.response.as_ref().and_then(|r| r.ticket_id.clone()),
            created_at: self.created_at,
            completed_at: self.completed_at,
            processing_time_secs: self.processing_time_secs(),
            error: self.last_error.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Compact view of a workflow for listings and status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Workflow identifier.
    pub workflow_id: String,
    /// Alert identifier.
    pub alert_id: String,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// Stage running or last run.
    pub current_stage: Option<StageKind>,
    /// Current verdict.
    pub verdict: Option<Verdict>,
    /// Decided priority.
    pub priority: Option<Priority>,
    /// Response ticket.
    pub ticket_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds from creation to completion.
    pub processing_time_secs: Option<f64>,
    /// Error that failed the workflow.
    pub error: Option<String>,
    /// Provider fallbacks and similar notices.
    pub warnings: Vec<String>,
}
