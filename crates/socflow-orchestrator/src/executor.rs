//! Stage execution: builds prompt variables from the accumulated record and
//! hands the request to the provider selector.

use crate::error::{OrchestrationError, Result};
use crate::record::WorkflowRecord;
use crate::selector::{Analysis, ProviderSelector};
use serde_json::{Value, json};
use socflow_abstraction::{StageKind, StageRequest, Variables};
use socflow_models::StageTemperatures;
use tracing::debug;

/// Runs stages for workflow records.
#[derive(Debug)]
pub struct StageExecutor {
    selector: ProviderSelector,
    temperatures: StageTemperatures,
}

impl StageExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(selector: ProviderSelector, temperatures: StageTemperatures) -> Self {
        Self { selector, temperatures }
    }

    /// The selector used for provider calls.
    pub fn selector(&self) -> &ProviderSelector {
        &self.selector
    }

    /// Runs `kind` for `record`.
    ///
    /// # Errors
    /// `InternalInvariant` if a prerequisite result is missing, otherwise
    /// whatever the selector returns.
    pub async fn execute(&self, record: &WorkflowRecord, kind: StageKind) -> Result<Analysis> {
        let variables = variables_for(kind, record)?;
        debug!(
            workflow_id = %record.workflow_id,
            stage = %kind,
            variables = variables.len(),
            "Executing stage"
        );
        let request =
            StageRequest::new(kind, variables).with_temperature(self.temperatures.for_stage(kind));
        self.selector.run(&request).await
    }
}

/// Builds the input variables of `kind` from what the record holds so far.
///
/// Triage sees the alert; Investigation adds Triage; Decision adds
/// Investigation; Response sees the alert and the Decision.
///
/// # Errors
/// Returns `InternalInvariant` if a result the stage depends on is absent.
pub fn variables_for(kind: StageKind, record: &WorkflowRecord) -> Result<Variables> {
    let missing = |what: &str| {
        OrchestrationError::InternalInvariant(format!(
            "{kind} stage of workflow {} requires a {what} result",
            record.workflow_id
        ))
    };

    let mut vars = alert_variables(record);

    match kind {
        StageKind::Triage => {
            vars.insert("raw_data".to_string(), raw_data(record));
        }
        StageKind::Investigation => {
            vars.insert("raw_data".to_string(), raw_data(record));
            add_triage(&mut vars, record).ok_or_else(|| missing("triage"))?;
            vars.insert("threat_intel".to_string(), json!(threat_intel(record)));
        }
        StageKind::Decision => {
            add_triage(&mut vars, record).ok_or_else(|| missing("triage"))?;
            vars.insert("threat_intel".to_string(), json!(threat_intel(record)));
            let investigation =
                record.investigation.as_ref().ok_or_else(|| missing("investigation"))?;
            let context = &investigation.threat_context;
            vars.insert("investigation_summary".to_string(), json!(investigation.summary()));
            vars.insert("findings".to_string(), json!(investigation.findings));
            vars.insert("risk_score".to_string(), json!(investigation.risk_score));
            vars.insert(
                "threat_actor".to_string(),
                json!(context.actor.as_deref().unwrap_or("Unknown")),
            );
            vars.insert(
                "campaign".to_string(),
                json!(context.campaign.as_deref().unwrap_or("N/A")),
            );
            vars.insert("attack_chain".to_string(), json!(investigation.attack_chain.join(" -> ")));
            vars.insert("ttps".to_string(), json!(context.techniques.join(", ")));
        }
        StageKind::Response => {
            let decision = record.decision.as_ref().ok_or_else(|| missing("decision"))?;
            vars.insert("final_verdict".to_string(), json!(decision.final_verdict));
            vars.insert("priority".to_string(), json!(decision.priority));
            vars.insert("confidence".to_string(), json!(decision.confidence));
            vars.insert("recommended_actions".to_string(), json!(decision.recommended_actions));
            vars.insert("escalation_required".to_string(), json!(decision.escalation_required));
            vars.insert("estimated_impact".to_string(), json!(decision.estimated_impact));
            vars.insert("rationale".to_string(), json!(decision.rationale));
            if let Some(investigation) = &record.investigation {
                vars.insert("risk_score".to_string(), json!(investigation.risk_score));
            }
        }
    }

    Ok(vars)
}

fn alert_variables(record: &WorkflowRecord) -> Variables {
    let alert = &record.alert;
    let or_na = |value: &Option<String>| json!(value.as_deref().unwrap_or("N/A"));
    let joined = |items: &[String]| {
        if items.is_empty() { json!("None") } else { json!(items.join(", ")) }
    };

    let mut vars = Variables::new();
    vars.insert("alert_id".to_string(), json!(alert.alert_id));
    vars.insert("rule_id".to_string(), json!(alert.rule_id));
    vars.insert("rule_name".to_string(), or_na(&alert.rule_name));
    vars.insert("severity".to_string(), json!(alert.severity));
    vars.insert("timestamp".to_string(), json!(alert.timestamp));
    vars.insert("description".to_string(), json!(alert.description));
    vars.insert("tactics".to_string(), joined(&alert.mitre.tactics));
    vars.insert("techniques".to_string(), joined(&alert.mitre.techniques));
    vars.insert("host".to_string(), or_na(&alert.assets.host));
    vars.insert("user".to_string(), or_na(&alert.assets.user));
    vars.insert("source_ip".to_string(), or_na(&alert.assets.source_ip));
    vars.insert("destination_ip".to_string(), or_na(&alert.assets.destination_ip));
    vars
}

fn raw_data(record: &WorkflowRecord) -> Value {
    match &record.alert.raw_data {
        Value::Null => json!("No additional data"),
        data => json!(serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())),
    }
}

fn add_triage(vars: &mut Variables, record: &WorkflowRecord) -> Option<()> {
    let triage = record.triage.as_ref()?;
    vars.insert("triage_verdict".to_string(), json!(triage.verdict));
    vars.insert("triage_confidence".to_string(), json!(triage.confidence));
    vars.insert("triage_reasoning".to_string(), json!(triage.reasoning));
    vars.insert("key_indicators".to_string(), json!(triage.key_indicators));
    vars.insert("noise_score".to_string(), json!(triage.noise_score));
    Some(())
}

fn threat_intel(record: &WorkflowRecord) -> String {
    let mitre = &record.alert.mitre;
    if mitre.techniques.is_empty() && mitre.tactics.is_empty() {
        return "No MITRE mapping available".to_string();
    }
    format!(
        "MITRE techniques: {}; tactics: {}",
        mitre.techniques.join(", "),
        mitre.tactics.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Alert;
    use crate::stage::{
        DecisionResult, Impact, InvestigationResult, Priority, ThreatContext, TriageResult, Verdict,
    };

    fn record() -> WorkflowRecord {
        let alert = Alert::parse_batch(
            r#"{
                "alert_id": "ALERT-001",
                "rule_id": "R-100",
                "rule_name": "Suspicious PowerShell",
                "severity": "High",
                "timestamp": "2024-01-15T10:30:00Z",
                "description": "Encoded command line",
                "mitre": {"tactics": ["Execution"], "techniques": ["T1059.001"]},
                "assets": {"host": "WS-042", "user": "jdoe"},
                "raw_data": {"process": "powershell.exe"}
            }"#,
        )
        .unwrap()
        .remove(0);
        WorkflowRecord::new("wf-1".to_string(), alert)
    }

    fn with_triage(mut record: WorkflowRecord) -> WorkflowRecord {
        record.triage = Some(TriageResult {
            verdict: Verdict::Suspicious,
            confidence: 0.8,
            noise_score: 0.2,
            requires_investigation: true,
            key_indicators: vec!["encoded command".to_string()],
            reasoning: "unusual".to_string(),
        });
        record
    }

    fn with_investigation(mut record: WorkflowRecord) -> WorkflowRecord {
        record.investigation = Some(InvestigationResult {
            findings: vec!["a".to_string(), "b".to_string()],
            threat_context: ThreatContext {
                actor: Some("APT29".to_string()),
                campaign: None,
                techniques: vec!["T1059".to_string()],
            },
            risk_score: 8.1,
            attack_chain: vec!["Execution".to_string(), "Persistence".to_string()],
            related_alerts: vec![],
        });
        record
    }

    fn with_decision(mut record: WorkflowRecord) -> WorkflowRecord {
        record.decision = Some(DecisionResult {
            final_verdict: Verdict::TruePositive,
            priority: Priority::P2,
            confidence: 0.88,
            recommended_actions: vec!["Isolate host".to_string()],
            escalation_required: true,
            estimated_impact: Impact::High,
            rationale: "confirmed".to_string(),
        });
        record
    }

    #[test]
    fn test_triage_variables_from_alert() {
        let vars = variables_for(StageKind::Triage, &record()).unwrap();
        assert_eq!(vars["severity"], "High");
        assert_eq!(vars["rule_name"], "Suspicious PowerShell");
        assert_eq!(vars["source_ip"], "N/A");
        assert_eq!(vars["techniques"], "T1059.001");
        assert!(vars["raw_data"].as_str().unwrap().contains("powershell.exe"));
        assert!(!vars.contains_key("triage_verdict"));
    }

    #[test]
    fn test_missing_prerequisite_is_internal_error() {
        let err = variables_for(StageKind::Investigation, &record()).unwrap_err();
        assert!(matches!(err, OrchestrationError::InternalInvariant(_)));
        let err = variables_for(StageKind::Response, &with_triage(record())).unwrap_err();
        assert!(matches!(err, OrchestrationError::InternalInvariant(_)));
    }

    #[test]
    fn test_decision_variables_carry_investigation() {
        let rec = with_investigation(with_triage(record()));
        let vars = variables_for(StageKind::Decision, &rec).unwrap();
        assert_eq!(vars["investigation_summary"], "a; b");
        assert_eq!(vars["attack_chain"], "Execution -> Persistence");
        assert_eq!(vars["campaign"], "N/A");
        assert_eq!(vars["triage_verdict"], "suspicious");
        assert!(!vars.contains_key("raw_data"));
    }

    #[test]
    fn test_response_variables_without_investigation() {
        let vars =
            variables_for(StageKind::Response, &with_decision(with_triage(record()))).unwrap();
        assert_eq!(vars["priority"], "P2");
        assert_eq!(vars["estimated_impact"], "HIGH");
        assert!(!vars.contains_key("risk_score"));
    }

    #[test]
    fn test_built_variables_infer_back_to_their_stage() {
        let full = with_decision(with_investigation(with_triage(record())));
        for kind in StageKind::ALL {
            let vars = variables_for(kind, &full).unwrap();
            assert_eq!(StageKind::infer(&vars), Some(kind), "{kind}");
        }
    }
}
