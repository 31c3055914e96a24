//! Run command implementation.
//!
//! Submits an alert file as one batch, follows every workflow's events until
//! its final event, then prints a summary and the system metrics.

use super::event_renderer;
use anyhow::Context;
use colored::Colorize;
use socflow_orchestrator::{Alert, WorkflowOrchestrator};
use std::path::Path;

/// Execute the run command.
pub async fn execute(
    config_path: Option<&Path>,
    alerts_path: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let orchestrator = WorkflowOrchestrator::new(&config);

    if let Some(notice) = orchestrator.provider_notice() {
        eprintln!("{} {}", "warning:".yellow().bold(), notice);
    }

    let alerts = Alert::load_batch(alerts_path)
        .with_context(|| format!("Failed to load alerts from {}", alerts_path.display()))?;

    if !json {
        println!("{}", "socflow run".bold().cyan());
        println!("  {} Alerts: {}", "•".dimmed(), alerts.len());
        println!("  {} Provider: {}", "•".dimmed(), config.provider.provider);
        println!();
    }

    let submissions = orchestrator.submit_batch(alerts).await.context("Failed to submit alerts")?;

    let mut renderers = Vec::with_capacity(submissions.len());
    for submission in &submissions {
        let mut subscription = orchestrator.subscribe(&submission.workflow_id).await?;
        let alert_id = submission.alert_id.clone();
        renderers.push(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if json {
                    println!("{}", event_renderer::render_json(&alert_id, &event));
                } else {
                    println!("{}", event_renderer::render(&alert_id, &event));
                }
            }
        }));
    }
    for result in futures::future::join_all(renderers).await {
        result.context("Event renderer task failed")?;
    }

    let metrics = orchestrator.metrics().await;

    if json {
        println!("{}", serde_json::json!({ "metrics": metrics }));
        return Ok(());
    }

    println!();
    println!("{}", "Summary".bold());
    for submission in &submissions {
        let summary = orchestrator.status(&submission.workflow_id, false).await?.summary;
        println!(
            "  {} {} {} {} {}",
            submission.alert_id.cyan(),
            summary.status,
            summary.verdict.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
            summary.priority.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            summary.ticket_id.unwrap_or_else(|| "-".to_string()).dimmed(),
        );
    }
    println!();
    println!("{}", "Metrics".bold());
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    Ok(())
}
