//! Analyze command implementation.
//!
//! Runs a single stage from a bare variables file through the same provider
//! selection the workflow engine uses.

use anyhow::{Context, bail};
use serde_json::{Value, json};
use socflow_abstraction::{StageKind, StageRequest, Variables};
use socflow_models::ProviderFactory;
use socflow_orchestrator::ProviderSelector;
use std::path::Path;

/// Execute the analyze command.
pub async fn execute(
    config_path: Option<&Path>,
    variables_path: &Path,
    stage: Option<&str>,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    let content = std::fs::read_to_string(variables_path)
        .with_context(|| format!("Failed to read {}", variables_path.display()))?;
    let variables: Variables = match serde_json::from_str(&content).context("Invalid JSON")? {
        Value::Object(map) => map,
        _ => bail!("Stage variables must be a JSON object"),
    };

    let request = match stage {
        Some(name) => {
            let Ok(kind) = name.parse::<StageKind>() else {
                bail!(
                    "Unknown stage '{name}' (expected triage, investigation, decision or response)"
                );
            };
            StageRequest::new(kind, variables)
        }
        None => StageRequest::infer(variables)
            .context("Could not infer the stage from the variables; pass --stage")?,
    };
    let temperature = config.provider.temperatures.for_stage(request.kind);
    let request = request.with_temperature(temperature);

    let choice = ProviderFactory::create(&config.provider);
    if let Some(notice) = &choice.substitution {
        eprintln!("warning: {notice}");
    }

    let mut selector = ProviderSelector::new(choice.provider.clone(), config.provider.timeout());
    if config.provider.allow_fallback && !choice.provider.is_synthetic() {
        selector = selector.with_fallback(ProviderFactory::synthetic(&config.provider));
    }

    let analysis = selector.run(&request).await.context("Analysis failed")?;

    let output = json!({
        "stage": request.kind,
        "provider": analysis.provider_id,
        "fallback_reason": analysis.fallback_reason,
        "result": analysis.result.to_payload(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
