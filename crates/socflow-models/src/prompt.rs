//! Minimal prompt rendering for the real backends.
//!
//! Each stage gets a fixed system instruction describing the JSON object the
//! model must return, and a user message listing the stage variables.

use serde_json::Value;
use socflow_abstraction::{StageKind, StageRequest};
use std::fmt::Write;

/// A rendered system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// Instruction describing the analyst role and output contract.
    pub system: String,
    /// The stage variables, one per line.
    pub user: String,
}

/// Renders the prompt for a stage request.
#[must_use]
pub fn render(request: &StageRequest) -> RenderedPrompt {
    let system = format!(
        "{}\n\nRespond with a single JSON object and nothing else. Required fields:\n{}",
        role_for(request.kind),
        output_contract(request.kind)
    );

    let mut user = format!("{} input:\n", capitalize(request.kind.as_str()));
    for (key, value) in &request.variables {
        let _ = writeln!(user, "{key}: {}", display_value(value));
    }

    RenderedPrompt { system, user }
}

fn role_for(kind: StageKind) -> &'static str {
    match kind {
        StageKind::Triage => {
            "You are a Level-1 SOC analyst. Decide whether the alert is noise or needs investigation."
        }
        StageKind::Investigation => {
            "You are a senior SOC investigator. Correlate the alert with threat intelligence and reconstruct the attack chain."
        }
        StageKind::Decision => {
            "You are the SOC incident commander. Give the final verdict, priority and recommended actions."
        }
        StageKind::Response => {
            "You are the SOC response coordinator. Execute the playbook for the decided priority and report what was done."
        }
    }
}

fn output_contract(kind: StageKind) -> &'static str {
    match kind {
        StageKind::Triage => concat!(
            "- verdict: one of true_positive, false_positive, benign, suspicious, unknown\n",
            "- confidence: number between 0 and 1\n",
            "- noise_score: number between 0 and 1\n",
            "- requires_investigation: boolean\n",
            "- key_indicators: array of strings\n",
            "- reasoning: string",
        ),
        StageKind::Investigation => concat!(
            "- findings: array of strings\n",
            "- threat_context: object with threat_actor, campaign and ttps (array of MITRE technique ids)\n",
            "- risk_score: number between 0 and 10\n",
            "- attack_chain: array of attack stages in order\n",
            "- related_alerts: array of alert ids (optional)",
        ),
        StageKind::Decision => concat!(
            "- final_verdict: one of true_positive, false_positive, benign, suspicious, unknown\n",
            "- priority: one of P1, P2, P3, P4\n",
            "- confidence: number between 0 and 1\n",
            "- recommended_actions: array of strings\n",
            "- escalation_required: boolean\n",
            "- estimated_impact: one of LOW, MEDIUM, HIGH, CRITICAL\n",
            "- rationale: string",
        ),
        StageKind::Response => concat!(
            "- actions_taken: array of strings\n",
            "- ticket_id: string or null\n",
            "- notifications_sent: array of strings\n",
            "- automation_applied: array of strings\n",
            "- status: one of COMPLETED, PARTIAL, FAILED\n",
            "- summary: string (optional)",
        ),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "N/A".to_string(),
        other => other.to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| first.to_uppercase().chain(chars).collect())
}
