//! Terminal rendering of workflow events.

use colored::Colorize;
use serde_json::json;
use socflow_orchestrator::{EventKind, PROVIDER_FALLBACK, WorkflowEvent};

/// Renders one event as a human-readable line.
pub fn render(alert_id: &str, event: &WorkflowEvent) -> String {
    let stage = event.stage.map(|s| s.to_string()).unwrap_or_default();
    let prefix = format!("[{alert_id}]").dimmed();

    match event.kind {
        EventKind::Status if event.status == PROVIDER_FALLBACK => format!(
            "{prefix} {} {stage}: {}",
            "⚠ fallback".yellow(),
            event.message.as_deref().unwrap_or_default()
        ),
        EventKind::Status => format!("{prefix} {} {}", "●".cyan(), event.status),
        EventKind::Progress => format!("{prefix} {} {stage} {}", "→".dimmed(), event.status),
        EventKind::AgentOutput => {
            format!("{prefix} {} {stage} {}", "✓".green(), summarize_output(event).dimmed())
        }
        EventKind::Error => format!(
            "{prefix} {} {}",
            "✗ error".red().bold(),
            event.message.as_deref().unwrap_or_default()
        ),
        EventKind::Final => {
            let status = match event.status.as_str() {
                "COMPLETED" => event.status.green().bold(),
                "FILTERED_OUT" => event.status.blue().bold(),
                _ => event.status.red().bold(),
            };
            format!("{prefix} {} {status}", "■".bold())
        }
    }
}

/// Renders one event as a JSON line tagged with the alert id.
pub fn render_json(alert_id: &str, event: &WorkflowEvent) -> String {
    json!({ "alert_id": alert_id, "event": event }).to_string()
}

fn summarize_output(event: &WorkflowEvent) -> String {
    let Some(payload) = &event.payload else {
        return event.status.clone();
    };
    let field = |key: &str| payload.get(key).and_then(|v| v.as_str()).map(str::to_string);

    let parts: Vec<String> = [
        field("verdict").or_else(|| field("final_verdict")),
        field("priority"),
        field("ticket_id"),
        payload.get("risk_score").map(|r| format!("risk {r}")),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() { event.status.clone() } else { parts.join(", ") }
}
