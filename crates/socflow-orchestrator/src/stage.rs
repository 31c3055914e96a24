//! Typed stage results and schema validation of provider output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use socflow_abstraction::{StageFields, StageKind};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Analyst verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Confirmed malicious.
    TruePositive,
    /// Detection fired on legitimate activity.
    FalsePositive,
    /// Harmless activity.
    Benign,
    /// Not confirmed either way.
    Suspicious,
    /// No verdict could be reached.
    Unknown,
}

impl Verdict {
    /// snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TruePositive => "true_positive",
            Self::FalsePositive => "false_positive",
            Self::Benign => "benign",
            Self::Suspicious => "suspicious",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true_positive" => Ok(Self::TruePositive),
            "false_positive" => Ok(Self::FalsePositive),
            "benign" => Ok(Self::Benign),
            "suspicious" => Ok(Self::Suspicious),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown verdict '{other}'")),
        }
    }
}

/// Incident priority, P1 most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Critical incident.
    P1,
    /// High-priority incident.
    P2,
    /// Routine follow-up.
    P3,
    /// Informational.
    P4,
}

impl Priority {
    /// Upper-case name ("P1".."P4").
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
            Self::P4 => "P4",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            "P3" => Ok(Self::P3),
            "P4" => Ok(Self::P4),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Estimated business impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
    /// Critical.
    Critical,
}

/// Outcome of the response stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    /// All actions executed.
    Completed,
    /// Some actions still pending.
    Partial,
    /// Response could not be executed.
    Failed,
}

/// Level-1 triage assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    /// Verdict.
    pub verdict: Verdict,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Likelihood the alert is noise, in [0, 1].
    pub noise_score: f64,
    /// Whether the triage analyst asks for investigation.
    pub requires_investigation: bool,
    /// Indicators, most relevant first.
    #[serde(default)]
    pub key_indicators: Vec<String>,
    /// Short explanation.
    #[serde(default)]
    pub reasoning: String,
}

/// Threat-intelligence context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatContext {
    /// Suspected actor.
    #[serde(alias = "threat_actor")]
    pub actor: Option<String>,
    /// Suspected campaign.
    pub campaign: Option<String>,
    /// MITRE technique identifiers.
    #[serde(alias = "ttps")]
    pub techniques: Vec<String>,
}

/// Deep investigation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResult {
    /// Findings, most significant first.
    pub findings: Vec<String>,
    /// Threat context.
    #[serde(default)]
    pub threat_context: ThreatContext,
    /// Risk score in [0, 10].
    pub risk_score: f64,
    /// Attack stages in order.
    #[serde(default)]
    pub attack_chain: Vec<String>,
    /// Correlated alert ids.
    #[serde(default)]
    pub related_alerts: Vec<String>,
}

impl InvestigationResult {
    /// Findings joined into a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        self.findings.join("; ")
    }
}

/// Final verdict and prioritisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// Final verdict.
    pub final_verdict: Verdict,
    /// Priority.
    pub priority: Priority,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Actions for the response stage.
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    /// Whether the incident must be escalated.
    pub escalation_required: bool,
    /// Estimated impact.
    pub estimated_impact: Impact,
    /// Explanation.
    #[serde(default)]
    pub rationale: String,
}

/// Response execution report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseResult {
    /// Actions executed.
    #[serde(default)]
    pub actions_taken: Vec<String>,
    /// Ticket opened for the incident.
    #[serde(default)]
    pub ticket_id: Option<String>,
    /// Parties notified.
    #[serde(default)]
    pub notifications_sent: Vec<String>,
    /// Automations applied.
    #[serde(default)]
    pub automation_applied: Vec<String>,
    /// Execution status.
    pub status: ResponseStatus,
    /// Summary for the analyst.
    #[serde(default)]
    pub summary: Option<String>,
}

/// The result of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageResult {
    /// Triage.
    Triage(TriageResult),
    /// Investigation.
    Investigation(InvestigationResult),
    /// Decision.
    Decision(DecisionResult),
    /// Response.
    Response(ResponseResult),
}

impl StageResult {
    /// Which stage produced this result.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        match self {
            Self::Triage(_) => StageKind::Triage,
            Self::Investigation(_) => StageKind::Investigation,
            Self::Decision(_) => StageKind::Decision,
            Self::Response(_) => StageKind::Response,
        }
    }

    /// The result's fields as JSON, without the stage tag.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let value = match self {
            Self::Triage(r) => serde_json::to_value(r),
            Self::Investigation(r) => serde_json::to_value(r),
            Self::Decision(r) => serde_json::to_value(r),
            Self::Response(r) => serde_json::to_value(r),
        };
        value.unwrap_or(Value::Null)
    }
}

/// Provider output that does not satisfy a stage schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} output failed validation: {reason}")]
pub struct SchemaViolation {
    /// Stage being validated.
    pub stage: StageKind,
    /// What was wrong.
    pub reason: String,
}

/// Validates raw provider fields against the schema of `kind`.
///
/// # Errors
/// Returns `SchemaViolation` for missing or mistyped fields and for scores
/// outside their ranges.
pub fn validate(kind: StageKind, fields: StageFields) -> Result<StageResult, SchemaViolation> {
    let violation = |reason: String| SchemaViolation { stage: kind, reason };
    let value = Value::Object(fields);

    let result = match kind {
        StageKind::Triage => {
            let r: TriageResult =
                serde_json::from_value(value).map_err(|e| violation(e.to_string()))?;
            check_unit("confidence", r.confidence).map_err(violation)?;
            check_unit("noise_score", r.noise_score).map_err(violation)?;
            StageResult::Triage(r)
        }
        StageKind::Investigation => {
            let r: InvestigationResult =
                serde_json::from_value(value).map_err(|e| violation(e.to_string()))?;
            check_range("risk_score", r.risk_score, 10.0).map_err(violation)?;
            StageResult::Investigation(r)
        }
        StageKind::Decision => {
            let r: DecisionResult =
                serde_json::from_value(value).map_err(|e| violation(e.to_string()))?;
            check_unit("confidence", r.confidence).map_err(violation)?;
            StageResult::Decision(r)
        }
        StageKind::Response => {
            let r: ResponseResult =
                serde_json::from_value(value).map_err(|e| violation(e.to_string()))?;
            StageResult::Response(r)
        }
    };

    Ok(result)
}

fn check_unit(field: &str, value: f64) -> Result<(), String> {
    check_range(field, value, 1.0)
}

fn check_range(field: &str, value: f64, max: f64) -> Result<(), String> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!("{field} must be within [0, {max}], got {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> StageFields {
        match value {
            Value::Object(map) => map,
            _ => StageFields::new(),
        }
    }

    #[test]
    fn test_validate_triage() {
        let result = validate(
            StageKind::Triage,
            fields(json!({
                "verdict": "suspicious",
                "confidence": 0.82,
                "noise_score": 0.2,
                "requires_investigation": true,
                "key_indicators": ["a", "b"],
                "reasoning": "odd"
            })),
        )
        .unwrap();

        match result {
            StageResult::Triage(t) => {
                assert_eq!(t.verdict, Verdict::Suspicious);
                assert_eq!(t.key_indicators, vec!["a", "b"]);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let err = validate(
            StageKind::Triage,
            fields(json!({
                "verdict": "benign",
                "confidence": 1.4,
                "noise_score": 0.2,
                "requires_investigation": false
            })),
        )
        .unwrap_err();
        assert!(err.reason.contains("confidence"));
        assert_eq!(err.stage, StageKind::Triage);
    }

    #[test]
    fn test_validate_rejects_unknown_verdict() {
        let err = validate(
            StageKind::Decision,
            fields(json!({
                "final_verdict": "probably_bad",
                "priority": "P1",
                "confidence": 0.9,
                "escalation_required": true,
                "estimated_impact": "HIGH"
            })),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_priority() {
        let err = validate(
            StageKind::Decision,
            fields(json!({
                "final_verdict": "false_positive",
                "priority": "P5",
                "confidence": 0.9,
                "escalation_required": false,
                "estimated_impact": "LOW"
            })),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_investigation_accepts_threat_actor_aliases() {
        let result = validate(
            StageKind::Investigation,
            fields(json!({
                "findings": ["Credential reuse pattern identified"],
                "threat_context": {"threat_actor": "APT29", "campaign": "N/A", "ttps": ["T1078"]},
                "risk_score": 8.4,
                "attack_chain": ["Initial Access", "Lateral Movement"]
            })),
        )
        .unwrap();

        let StageResult::Investigation(inv) = result else { panic!("wrong stage") };
        assert_eq!(inv.threat_context.actor.as_deref(), Some("APT29"));
        assert_eq!(inv.threat_context.techniques, vec!["T1078"]);
        assert!(inv.related_alerts.is_empty());
    }

    #[test]
    fn test_investigation_risk_bounds() {
        let err = validate(
            StageKind::Investigation,
            fields(json!({"findings": [], "risk_score": 11.0})),
        )
        .unwrap_err();
        assert!(err.reason.contains("risk_score"));
    }

    #[test]
    fn test_response_ticket_is_optional() {
        let result =
            validate(StageKind::Response, fields(json!({"status": "PARTIAL"}))).unwrap();
        let StageResult::Response(resp) = result else { panic!("wrong stage") };
        assert_eq!(resp.status, ResponseStatus::Partial);
        assert!(resp.ticket_id.is_none());
    }

    #[test]
    fn test_payload_omits_stage_tag() {
        let result =
            validate(StageKind::Response, fields(json!({"status": "COMPLETED"}))).unwrap();
        let payload = result.to_payload();
        assert!(payload.get("stage").is_none());
        assert_eq!(payload["status"], "COMPLETED");
    }
}
