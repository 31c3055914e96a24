//! Engine configuration.
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! ```toml
//! [orchestrator]
//! max_concurrent_stages = 5
//!
//! [provider]
//! provider = "openai"
//! timeout_secs = 60
//!
//! [provider.openai]
//! model = "gpt-4-turbo-preview"
//!
//! [policy]
//! noise_threshold = 0.8
//! response_priorities = ["P1", "P2"]
//! ```

use crate::error::{OrchestrationError, Result};
use crate::store::DEFAULT_LIST_LIMIT;
use crate::transitions::BranchPolicy;
use serde::{Deserialize, Serialize};
use socflow_models::ProviderConfig;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Environment variables read by [`SocflowConfig::apply_env`].
pub const ENV_VARS: [&str; 7] = [
    "LLM_PROVIDER",
    "OPENAI_API_KEY",
    "OPENAI_MODEL",
    "GEMINI_API_KEY",
    "GEMINI_MODEL",
    "MAX_CONCURRENT_ALERTS",
    "ALERT_TIMEOUT_SECONDS",
];

/// Engine limits (`[orchestrator]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Stage executions allowed at once across all workflows.
    pub max_concurrent_stages: usize,
    /// Recent non-terminal events retained per workflow.
    pub event_history: usize,
    /// Broadcast buffer per workflow.
    pub event_buffer: usize,
    /// Deadline for status queries, in milliseconds.
    pub query_timeout_ms: u64,
    /// Default listing limit.
    pub list_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_stages: 5,
            event_history: 64,
            event_buffer: 256,
            query_timeout_ms: 5000,
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl OrchestratorConfig {
    /// Status query deadline.
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocflowConfig {
    /// Engine limits.
    pub orchestrator: OrchestratorConfig,
    /// Provider selection.
    pub provider: ProviderConfig,
    /// Branching thresholds.
    pub policy: BranchPolicy,
}

impl SocflowConfig {
    /// Parses configuration from TOML text. Missing sections take defaults.
    ///
    /// # Errors
    /// Returns `Config` if the text is not valid configuration TOML.
    pub fn from_toml_str(toml_content: &str) -> Result<Self> {
        toml::from_str(toml_content)
            .map_err(|e| OrchestrationError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Errors
    /// Returns `Config` if the file cannot be read or parsed.
    pub fn load_from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestrationError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads the file (or defaults), applies the process environment and validates.
    ///
    /// # Errors
    /// Returns `Config` for unreadable files, malformed overrides or invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_toml(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    /// Returns `Config` when a numeric variable does not parse.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(provider) = get("LLM_PROVIDER") {
            self.provider.provider = provider;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.provider.openai.api_key = Some(key);
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.provider.openai.model = Some(model);
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.provider.gemini.api_key = Some(key);
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.provider.gemini.model = Some(model);
        }
        if let Some(value) = get("MAX_CONCURRENT_ALERTS") {
            self.orchestrator.max_concurrent_stages = parse_env("MAX_CONCURRENT_ALERTS", &value)?;
        }
        if let Some(value) = get("ALERT_TIMEOUT_SECONDS") {
            self.provider.timeout_secs = parse_env("ALERT_TIMEOUT_SECONDS", &value)?;
        }

        debug!(provider = %self.provider.provider, "Applied environment overrides");
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// Returns `Config` naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(OrchestrationError::Config(message.to_string()));

        if self.orchestrator.max_concurrent_stages == 0 {
            return invalid("orchestrator.max_concurrent_stages must be at least 1");
        }
        if self.orchestrator.event_buffer == 0 {
            return invalid("orchestrator.event_buffer must be at least 1");
        }
        if self.provider.timeout_secs == 0 {
            return invalid("provider.timeout_secs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.policy.noise_threshold) {
            return invalid("policy.noise_threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.policy.benign_confidence_threshold) {
            return invalid("policy.benign_confidence_threshold must be within [0, 1]");
        }
        Ok(())
    }

    /// Serializes the configuration with API keys masked.
    ///
    /// # Errors
    /// Returns `Config` if serialization fails.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        for backend in [&mut shown.provider.openai, &mut shown.provider.gemini] {
            if backend.api_key.is_some() {
                backend.api_key = Some("********".to_string());
            }
        }
        toml::to_string_pretty(&shown)
            .map_err(|e| OrchestrationError::Config(format!("Failed to serialize config: {e}")))
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        OrchestrationError::Config(format!("{key} must be a positive integer, got '{value}'"))
    })
}
