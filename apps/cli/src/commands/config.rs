//! Config command implementation.

use colored::Colorize;
use socflow_orchestrator::config::ENV_VARS;
use std::path::Path;

/// Execute the config command.
pub fn execute(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    let overridden: Vec<&str> = ENV_VARS
        .into_iter()
        .filter(|key| std::env::var(key).is_ok_and(|v| !v.trim().is_empty()))
        .collect();
    if !overridden.is_empty() {
        println!("{}", format!("# environment overrides: {}", overridden.join(", ")).dimmed());
    }

    print!("{}", config.to_redacted_toml()?);
    Ok(())
}
