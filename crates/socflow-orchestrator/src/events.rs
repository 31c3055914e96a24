//! Workflow events delivered to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use socflow_abstraction::StageKind;

/// Status text of the warning emitted when a stage fell back to the synthetic backend.
pub const PROVIDER_FALLBACK: &str = "provider_fallback";

/// Event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Snapshot or notice.
    Status,
    /// Stage started or completed.
    Progress,
    /// A stage result.
    AgentOutput,
    /// Last event of a workflow.
    Final,
    /// The workflow failed; always followed by `Final`.
    Error,
}

/// One workflow event. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Workflow the event belongs to.
    pub workflow_id: String,
    /// Event kind.
    pub kind: EventKind,
    /// Stage concerned, if any.
    pub stage: Option<StageKind>,
    /// Short status text.
    pub status: String,
    /// Human-readable message.
    pub message: Option<String>,
    /// Structured data.
    pub payload: Option<Value>,
    /// Publication time.
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    fn new(workflow_id: &str, kind: EventKind, stage: Option<StageKind>, status: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            kind,
            stage,
            status: status.to_string(),
            message: None,
            payload: None,
            timestamp: Utc::now(),
        }
    }

    /// A status event.
    #[must_use]
    pub fn status(workflow_id: &str, status: &str) -> Self {
        Self::new(workflow_id, EventKind::Status, None, status)
    }

    /// A stage-start progress event.
    #[must_use]
    pub fn stage_started(workflow_id: &str, stage: StageKind) -> Self {
        Self::new(workflow_id, EventKind::Progress, Some(stage), "started")
            .with_message(format!("{stage} stage started"))
    }

    /// A stage-completion progress event.
    #[must_use]
    pub fn stage_completed(workflow_id: &str, stage: StageKind) -> Self {
        Self::new(workflow_id, EventKind::Progress, Some(stage), "completed")
            .with_message(format!("{stage} stage completed"))
    }

    /// A stage result.
    #[must_use]
    pub fn agent_output(workflow_id: &str, stage: StageKind, status: &str, result: Value) -> Self {
        Self::new(workflow_id, EventKind::AgentOutput, Some(stage), status).with_payload(result)
    }

    /// A failure notice.
    #[must_use]
    pub fn error(workflow_id: &str, stage: Option<StageKind>, message: String) -> Self {
        Self::new(workflow_id, EventKind::Error, stage, "error").with_message(message)
    }

    /// The terminal event.
    #[must_use]
    pub fn final_event(workflow_id: &str, status: &str, payload: Value) -> Self {
        Self::new(workflow_id, EventKind::Final, None, status).with_payload(payload)
    }

    /// Sets the stage.
    #[must_use]
    pub const fn with_stage(mut self, stage: StageKind) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Whether this is the terminal event.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.kind == EventKind::Final
    }

    /// Whether the event belongs to the terminal sequence (`error` or `final`).
    #[must_use]
    pub fn is_terminal_sequence(&self) -> bool {
        matches!(self.kind, EventKind::Final | EventKind::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_kind_snake_case() {
        let event = WorkflowEvent::agent_output("w1", StageKind::Triage, "completed", json!({}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "agent_output");
        assert_eq!(value["stage"], "triage");
    }

    #[test]
    fn test_terminal_sequence_membership() {
        assert!(WorkflowEvent::error("w1", None, "boom".to_string()).is_terminal_sequence());
        assert!(WorkflowEvent::final_event("w1", "FAILED", json!({})).is_final());
        assert!(!WorkflowEvent::status("w1", PROVIDER_FALLBACK).is_terminal_sequence());
    }
}
