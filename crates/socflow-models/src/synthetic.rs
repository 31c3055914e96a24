//! Synthetic backend.
//!
//! Produces schema-valid, varied stage results without any credentials. The
//! stage is taken from the request tag; alert severity and upstream results
//! steer the output so that serious alerts run the full pipeline and
//! low-severity ones are filtered as noise.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};
use socflow_abstraction::{
    AnalysisProvider, ProviderError, StageFields, StageKind, StageRequest,
};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

const SUSPICIOUS_INDICATORS: &[&str] = &[
    "Unusual login time detected",
    "Multiple failed authentication attempts",
    "Geographical anomaly in access pattern",
    "Privileged account activity",
];

const BENIGN_INDICATORS: &[&str] = &[
    "Activity matches a scheduled maintenance window",
    "Source host is an approved vulnerability scanner",
    "User behaviour within historical baseline",
    "Known software update traffic",
];

const TRIAGE_REASONING: &[&str] = &[
    "The alert shows suspicious patterns consistent with credential abuse. Further investigation is warranted to rule out compromise.",
    "Multiple indicators suggest potential malicious activity. The combination of failed attempts and unusual timing requires deeper analysis.",
    "Activity patterns deviate significantly from baseline behavior. Investigation needed to determine if this is legitimate or malicious.",
    "The alert contains several high-confidence indicators of compromise that justify immediate investigation.",
];

const NOISE_REASONING: &[&str] = &[
    "Low-severity alert matching well-known benign activity. No investigation needed.",
    "The event is consistent with routine operations and carries no indicators of compromise.",
];

const FINDINGS: &[&str] = &[
    "Lateral movement detected across multiple systems",
    "Credential reuse pattern identified",
    "Suspicious PowerShell execution observed",
    "Network scanning activity from compromised host",
    "Privilege escalation attempts detected",
];

const TECHNIQUES: &[&str] = &["T1078", "T1021", "T1059", "T1003", "T1090", "T1069"];

const THREAT_ACTORS: &[&str] = &["APT29", "APT28", "Unknown", "Insider Threat"];

const CAMPAIGNS: &[&str] = &["Unknown", "Operation CloudHopper", "N/A"];

/// Kill-chain order; sampled stages are emitted in this order.
const ATTACK_STAGES: &[&str] = &[
    "Initial Access",
    "Execution",
    "Persistence",
    "Privilege Escalation",
    "Defense Evasion",
    "Credential Access",
    "Discovery",
    "Lateral Movement",
];

const P1_ACTIONS: &[&str] = &[
    "Immediately isolate affected systems",
    "Disable compromised user accounts",
    "Initiate emergency incident response",
    "Notify CISO and executive team",
    "Engage forensics team",
];

const P2_ACTIONS: &[&str] = &[
    "Contain affected host",
    "Reset user credentials",
    "Enable enhanced monitoring",
    "Review related alerts",
    "Schedule incident response meeting",
];

const P3_ACTIONS: &[&str] = &[
    "Monitor for additional indicators",
    "Review user activity logs",
    "Update detection rules",
    "Document findings",
];

/// Canned response-stage output for one priority.
struct Playbook {
    actions: &'static [&'static str],
    notifications: &'static [&'static str],
    automations: &'static [&'static str],
    status: &'static str,
}

const P1_PLAYBOOK: Playbook = Playbook {
    actions: &[
        "Emergency incident ticket created",
        "Affected systems isolated from network",
        "User accounts disabled",
        "CISO and executive team notified",
        "Forensics team engaged",
    ],
    notifications: &[
        "CISO (SMS + Email)",
        "SOC Team Lead (PagerDuty)",
        "IR Team On-call (PagerDuty)",
        "Executive Team (Email)",
    ],
    automations: &[
        "Network isolation applied",
        "Firewall rules updated",
        "Account lockout enforced",
        "Threat hunt initiated",
    ],
    // Containment is still running when the stage reports back.
    status: "PARTIAL",
};

const P2_PLAYBOOK: Playbook = Playbook {
    actions: &[
        "High-priority incident ticket created",
        "Affected host contained",
        "User credentials reset",
        "SOC team notified",
    ],
    notifications: &["SOC Team Lead (Email + Slack)", "Senior Security Analyst (Email)"],
    automations: &[
        "IP reputation check completed",
        "Enhanced monitoring enabled",
        "Watchlist entry created",
    ],
    status: "COMPLETED",
};

const P3_PLAYBOOK: Playbook = Playbook {
    actions: &["Monitoring ticket created", "Added to analyst queue"],
    notifications: &["SOC Team (Email)"],
    automations: &["Monitoring alert configured"],
    status: "COMPLETED",
};

/// A synthetic backend that fabricates plausible analyst output.
#[derive(Debug)]
pub struct SyntheticProvider {
    id: String,
    rng: Mutex<StdRng>,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticProvider {
    /// Creates a new `SyntheticProvider` seeded from system entropy.
    #[must_use]
    pub fn new() -> Self {
        Self { id: "synthetic".to_string(), rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Creates a reproducible `SyntheticProvider`.
    ///
    /// # Arguments
    /// * `seed` - Seed for the internal random generator
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { id: "synthetic".to_string(), rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    fn triage(rng: &mut StdRng, request: &StageRequest) -> Value {
        let severity = severity_of(request);

        if matches!(severity.as_str(), "low" | "informational") {
            let verdict = if rng.gen_bool(0.7) { "benign" } else { "false_positive" };
            return json!({
                "verdict": verdict,
                "confidence": round2(rng.gen_range(0.90..0.98)),
                "noise_score": round2(rng.gen_range(0.85..0.97)),
                "requires_investigation": false,
                "key_indicators": sample(rng, BENIGN_INDICATORS, 1, 2),
                "reasoning": pick(rng, NOISE_REASONING),
            });
        }

        let (confidence, noise_score) = if matches!(severity.as_str(), "critical" | "high") {
            (rng.gen_range(0.75..0.92), rng.gen_range(0.10..0.30))
        } else {
            (rng.gen_range(0.65..0.92), rng.gen_range(0.15..0.45))
        };
        let verdict = if rng.gen_bool(0.5) { "suspicious" } else { "true_positive" };

        json!({
            "verdict": verdict,
            "confidence": round2(confidence),
            "noise_score": round2(noise_score),
            "requires_investigation": true,
            "key_indicators": sample(rng, SUSPICIOUS_INDICATORS, 2, 3),
            "reasoning": pick(rng, TRIAGE_REASONING),
        })
    }

    fn investigation(rng: &mut StdRng, request: &StageRequest) -> Value {
        let severity = severity_of(request);
        let risk_score = if matches!(severity.as_str(), "critical" | "high") {
            rng.gen_range(7.5..9.5)
        } else {
            rng.gen_range(6.5..9.5)
        };

        let chain_len = rng.gen_range(3..=5);
        let mut chain: Vec<&str> = ATTACK_STAGES.choose_multiple(rng, chain_len).copied().collect();
        chain.sort_by_key(|stage| ATTACK_STAGES.iter().position(|s| s == stage));

        let related: Vec<String> = (0..rng.gen_range(2..=4))
            .map(|_| format!("ALERT-{}", rng.gen_range(10000..=99999)))
            .collect();

        let today = Utc::now().format("%Y-%m-%d").to_string();

        json!({
            "findings": sample(rng, FINDINGS, 3, 4),
            "threat_context": {
                "threat_actor": pick(rng, THREAT_ACTORS),
                "campaign": pick(rng, CAMPAIGNS),
                "ttps": sample(rng, TECHNIQUES, 3, 5),
            },
            "related_alerts": related,
            "attack_chain": chain,
            "risk_score": (risk_score * 10.0_f64).round() / 10.0,
            "evidence": {
                "timeline": [
                    format!("{today} 02:15 - Initial compromise detected"),
                    format!("{today} 02:23 - Lateral movement initiated"),
                    format!("{today} 02:45 - Privilege escalation observed"),
                ],
                "indicators_of_compromise": [
                    "192.168.100.55",
                    "suspicious.exe",
                    "command-control.badsite.com",
                ],
            },
        })
    }

    fn decision(rng: &mut StdRng, request: &StageRequest) -> Value {
        let severity = severity_of(request);
        let risk_score = request.variables.get("risk_score").and_then(number_of).unwrap_or(0.0);

        let confirmed = matches!(severity.as_str(), "critical" | "high") || risk_score >= 7.0;

        let (verdict, priority, impact, escalation, actions) = if confirmed {
            let priority =
                if severity == "critical" || rng.gen_bool(0.3) { "P1" } else { "P2" };
            let impact = if priority == "P1" { "CRITICAL" } else { "HIGH" };
            let actions = if priority == "P1" { P1_ACTIONS } else { P2_ACTIONS };
            ("true_positive", priority, impact, true, actions)
        } else {
            let verdict = if rng.gen_bool(0.5) { "suspicious" } else { "false_positive" };
            let priority = if rng.gen_bool(0.5) { "P3" } else { "P4" };
            let impact = if priority == "P3" { "MEDIUM" } else { "LOW" };
            (verdict, priority, impact, false, P3_ACTIONS)
        };

        let rationale = match verdict {
            "true_positive" => {
                "Comprehensive analysis confirms malicious activity. Multiple corroborating indicators and threat intelligence matches indicate an active security incident requiring immediate response."
            }
            "false_positive" => {
                "After thorough investigation, the activity appears to be legitimate business operations misinterpreted by detection rules. Recommending rule tuning to reduce false positives."
            }
            _ => {
                "Evidence is inconclusive but warrants continued monitoring. Some indicators suggest potential compromise, but alternative explanations exist."
            }
        };

        json!({
            "final_verdict": verdict,
            "priority": priority,
            "confidence": round2(rng.gen_range(0.75..0.95)),
            "rationale": rationale,
            "recommended_actions": sample(rng, actions, 3, 4),
            "escalation_required": escalation,
            "estimated_impact": impact,
        })
    }

    fn response(rng: &mut StdRng, request: &StageRequest) -> Value {
        let priority = request.variable_str("priority").unwrap_or("P3");
        let ticket_id =
            format!("INC-{}-{}", Utc::now().format("%Y%m%d"), rng.gen_range(1000..=9999));

        let playbook = match priority {
            "P1" => &P1_PLAYBOOK,
            "P2" => &P2_PLAYBOOK,
            _ => &P3_PLAYBOOK,
        };

        let summary = if rng.gen_bool(0.5) {
            format!(
                "Security incident {ticket_id} has been processed and response actions were executed according to the {priority} playbook."
            )
        } else {
            format!(
                "Alert processed as {priority} incident with {} automations applied.",
                playbook.automations.len()
            )
        };

        json!({
            "actions_taken": playbook.actions,
            "ticket_id": ticket_id,
            "notifications_sent": playbook.notifications,
            "automation_applied": playbook.automations,
            "status": playbook.status,
            "summary": summary,
        })
    }
}

#[async_trait]
impl AnalysisProvider for SyntheticProvider {
    async fn analyze(&self, request: &StageRequest) -> Result<StageFields, ProviderError> {
        debug!(stage = %request.kind, "SyntheticProvider generating stage result");

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let value = match request.kind {
            StageKind::Triage => Self::triage(&mut rng, request),
            StageKind::Investigation => Self::investigation(&mut rng, request),
            StageKind::Decision => Self::decision(&mut rng, request),
            StageKind::Response => Self::response(&mut rng, request),
        };

        match value {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Map::new()),
        }
    }

    fn provider_id(&self) -> &str {
        &self.id
    }

    fn is_synthetic(&self) -> bool {
        true
    }
}

fn severity_of(request: &StageRequest) -> String {
    request.variable_str("severity").unwrap_or("medium").to_lowercase()
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn pick<'a>(rng: &mut StdRng, pool: &[&'a str]) -> &'a str {
    pool.choose(rng).copied().unwrap_or_default()
}

fn sample(rng: &mut StdRng, pool: &[&str], min: usize, max: usize) -> Vec<String> {
    let k = rng.gen_range(min..=max).min(pool.len());
    pool.choose_multiple(rng, k).map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: StageKind, vars: Value) -> StageRequest {
        let variables = match vars {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        StageRequest::new(kind, variables)
    }

    #[tokio::test]
    async fn test_low_severity_triage_is_noise() {
        let provider = SyntheticProvider::with_seed(7);
        let fields = provider
            .analyze(&request(StageKind::Triage, json!({"severity": "Low", "raw_data": "{}"})))
            .await
            .unwrap();

        assert_eq!(fields["requires_investigation"], json!(false));
        assert!(fields["noise_score"].as_f64().unwrap() > 0.8);
        let verdict = fields["verdict"].as_str().unwrap();
        assert!(verdict == "benign" || verdict == "false_positive");
    }

    #[tokio::test]
    async fn test_high_severity_triage_requires_investigation() {
        let provider = SyntheticProvider::with_seed(7);
        let fields = provider
            .analyze(&request(StageKind::Triage, json!({"severity": "High", "raw_data": "{}"})))
            .await
            .unwrap();

        assert_eq!(fields["requires_investigation"], json!(true));
        assert!(fields["noise_score"].as_f64().unwrap() < 0.5);
    }

    #[tokio::test]
    async fn test_investigation_attack_chain_is_kill_chain_ordered() {
        let provider = SyntheticProvider::with_seed(42);
        for _ in 0..10 {
            let fields = provider
                .analyze(&request(StageKind::Investigation, json!({"severity": "Medium"})))
                .await
                .unwrap();
            let chain: Vec<usize> = fields["attack_chain"]
                .as_array()
                .unwrap()
                .iter()
                .map(|s| ATTACK_STAGES.iter().position(|a| *a == s.as_str().unwrap()).unwrap())
                .collect();
            assert!(chain.windows(2).all(|w| w[0] < w[1]));
            let risk = fields["risk_score"].as_f64().unwrap();
            assert!((0.0..=10.0).contains(&risk));
        }
    }

    #[tokio::test]
    async fn test_high_severity_decision_escalates() {
        let provider = SyntheticProvider::with_seed(3);
        let fields = provider
            .analyze(&request(StageKind::Decision, json!({"severity": "High", "risk_score": 8.1})))
            .await
            .unwrap();

        assert_eq!(fields["final_verdict"], json!("true_positive"));
        assert_eq!(fields["escalation_required"], json!(true));
        let priority = fields["priority"].as_str().unwrap();
        assert!(priority == "P1" || priority == "P2");
    }

    #[tokio::test]
    async fn test_response_ticket_format() {
        let provider = SyntheticProvider::with_seed(1);
        let fields = provider
            .analyze(&request(StageKind::Response, json!({"priority": "P2"})))
            .await
            .unwrap();

        let ticket = fields["ticket_id"].as_str().unwrap();
        assert!(ticket.starts_with("INC-"));
        assert_eq!(ticket.len(), "INC-20240101-1234".len());
        assert_eq!(fields["status"], json!("COMPLETED"));
    }

    #[tokio::test]
    async fn test_seeded_providers_agree() {
        let a = SyntheticProvider::with_seed(99);
        let b = SyntheticProvider::with_seed(99);
        let req = request(StageKind::Decision, json!({"severity": "Medium", "risk_score": 5.0}));
        assert_eq!(a.analyze(&req).await.unwrap(), b.analyze(&req).await.unwrap());
    }

    #[test]
    fn test_synthetic_flag() {
        let provider = SyntheticProvider::new();
        assert!(provider.is_synthetic());
        assert_eq!(provider.provider_id(), "synthetic");
    }
}
