//! CLI command implementations.

pub mod analyze;
pub mod config;
pub mod event_renderer;
pub mod run;

use anyhow::Context;
use socflow_orchestrator::SocflowConfig;
use std::path::Path;

/// Loads configuration from `path` (or defaults) plus the environment.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SocflowConfig> {
    SocflowConfig::load(path).context("Failed to load configuration")
}
