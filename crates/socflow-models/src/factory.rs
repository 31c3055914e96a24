//! Provider factory for creating backends from configuration.
//!
//! Missing credentials and unknown provider names never fail construction:
//! the factory substitutes the synthetic backend and reports why, so callers
//! can surface the substitution once.

use crate::{GeminiProvider, OpenAIProvider, SyntheticProvider};
use serde::{Deserialize, Serialize};
use socflow_abstraction::{AnalysisProvider, StageKind};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default OpenAI model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo-preview";

/// Default Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";

/// Provider type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// OpenAI chat completions.
    OpenAI,
    /// Google Gemini.
    Gemini,
    /// Credential-free synthetic backend.
    Synthetic,
}

impl FromStr for ProviderType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" | "google" => Ok(Self::Gemini),
            "synthetic" | "mock" | "mock-data" | "none" | "disabled" => Ok(Self::Synthetic),
            _ => Err(()),
        }
    }
}

/// Settings for one real backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Model ID; the backend default is used when absent.
    pub model: Option<String>,
    /// API key. Empty strings count as absent.
    pub api_key: Option<String>,
    /// Override for the API root (used by tests and proxies).
    pub base_url: Option<String>,
}

impl BackendConfig {
    fn key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

/// Sampling temperature per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTemperatures {
    /// Triage temperature.
    pub triage: f32,
    /// Investigation temperature.
    pub investigation: f32,
    /// Decision temperature.
    pub decision: f32,
    /// Response temperature.
    pub response: f32,
}

impl Default for StageTemperatures {
    fn default() -> Self {
        Self { triage: 0.1, investigation: 0.3, decision: 0.1, response: 0.2 }
    }
}

impl StageTemperatures {
    /// Returns the temperature for a stage.
    #[must_use]
    pub const fn for_stage(&self, kind: StageKind) -> f32 {
        match kind {
            StageKind::Triage => self.triage,
            StageKind::Investigation => self.investigation,
            StageKind::Decision => self.decision,
            StageKind::Response => self.response,
        }
    }
}

/// Provider configuration (`[provider]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name: openai, gemini, or one of the synthetic aliases.
    pub provider: String,
    /// Per-call deadline in seconds.
    pub timeout_secs: u64,
    /// Substitute the synthetic backend after real-backend failures.
    pub allow_fallback: bool,
    /// Seed for the synthetic backend.
    pub seed: Option<u64>,
    /// OpenAI settings.
    pub openai: BackendConfig,
    /// Gemini settings.
    pub gemini: BackendConfig,
    /// Per-stage temperatures.
    pub temperatures: StageTemperatures,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "mock-data".to_string(),
            timeout_secs: 60,
            allow_fallback: true,
            seed: None,
            openai: BackendConfig::default(),
            gemini: BackendConfig::default(),
            temperatures: StageTemperatures::default(),
        }
    }
}

impl ProviderConfig {
    /// Returns the per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The outcome of provider construction.
#[derive(Clone)]
pub struct ProviderChoice {
    /// The backend stages will be sent to.
    pub provider: Arc<dyn AnalysisProvider>,
    /// Why the synthetic backend replaced the requested one, if it did.
    pub substitution: Option<String>,
}

impl std::fmt::Debug for ProviderChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChoice")
            .field("provider", &self.provider.provider_id())
            .field("substitution", &self.substitution)
            .finish()
    }
}

/// Factory for creating provider instances.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Creates the primary provider described by `config`.
    ///
    /// Unknown names and missing credentials resolve to the synthetic
    /// backend; the reason is logged once here and returned in
    /// `ProviderChoice::substitution`.
    #[must_use]
    pub fn create(config: &ProviderConfig) -> ProviderChoice {
        debug!(provider = %config.provider, "Creating analysis provider");

        let Ok(provider_type) = ProviderType::from_str(&config.provider) else {
            let reason =
                format!("unknown provider '{}'; using synthetic backend", config.provider);
            warn!(provider = %config.provider, "Unknown provider, using synthetic backend");
            return ProviderChoice {
                provider: Self::synthetic(config),
                substitution: Some(reason),
            };
        };

        match provider_type {
            ProviderType::Synthetic => {
                ProviderChoice { provider: Self::synthetic(config), substitution: None }
            }
            ProviderType::OpenAI => match config.openai.key() {
                Some(key) => {
                    let model = config
                        .openai
                        .model
                        .clone()
                        .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
                    let mut provider = OpenAIProvider::with_api_key(model, key.to_string());
                    if let Some(url) = &config.openai.base_url {
                        provider = provider.with_base_url(url.clone());
                    }
                    ProviderChoice { provider: Arc::new(provider), substitution: None }
                }
                None => Self::missing_credentials(config, "OPENAI_API_KEY"),
            },
            ProviderType::Gemini => match config.gemini.key() {
                Some(key) => {
                    let model = config
                        .gemini
                        .model
                        .clone()
                        .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
                    let mut provider = GeminiProvider::with_api_key(model, key.to_string());
                    if let Some(url) = &config.gemini.base_url {
                        provider = provider.with_base_url(url.clone());
                    }
                    ProviderChoice { provider: Arc::new(provider), substitution: None }
                }
                None => Self::missing_credentials(config, "GEMINI_API_KEY"),
            },
        }
    }

    /// Creates the synthetic backend, seeded when the config carries a seed.
    #[must_use]
    pub fn synthetic(config: &ProviderConfig) -> Arc<dyn AnalysisProvider> {
        match config.seed {
            Some(seed) => Arc::new(SyntheticProvider::with_seed(seed)),
            None => Arc::new(SyntheticProvider::new()),
        }
    }

    fn missing_credentials(config: &ProviderConfig, variable: &str) -> ProviderChoice {
        warn!(
            provider = %config.provider,
            variable = %variable,
            "API key not configured, using synthetic backend"
        );
        ProviderChoice {
            provider: Self::synthetic(config),
            substitution: Some(format!("{variable} not configured; using synthetic backend")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_aliases() {
        for alias in ["mock", "mock-data", "none", "disabled", "synthetic", "MOCK"] {
            assert_eq!(ProviderType::from_str(alias), Ok(ProviderType::Synthetic), "{alias}");
        }
        assert_eq!(ProviderType::from_str("OpenAI"), Ok(ProviderType::OpenAI));
        assert_eq!(ProviderType::from_str("gemini"), Ok(ProviderType::Gemini));
        assert_eq!(ProviderType::from_str("claude"), Err(()));
    }

    #[test]
    fn test_default_config_is_synthetic() {
        let choice = ProviderFactory::create(&ProviderConfig::default());
        assert!(choice.provider.is_synthetic());
        assert!(choice.substitution.is_none());
    }

    #[test]
    fn test_missing_key_substitutes_synthetic() {
        let config = ProviderConfig { provider: "openai".to_string(), ..Default::default() };
        let choice = ProviderFactory::create(&config);
        assert!(choice.provider.is_synthetic());
        assert!(choice.substitution.unwrap().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config = ProviderConfig {
            provider: "gemini".to_string(),
            gemini: BackendConfig { api_key: Some("  ".to_string()), ..Default::default() },
            ..Default::default()
        };
        let choice = ProviderFactory::create(&config);
        assert!(choice.provider.is_synthetic());
        assert!(choice.substitution.unwrap().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_unknown_provider_substitutes_synthetic() {
        let config = ProviderConfig { provider: "watson".to_string(), ..Default::default() };
        let choice = ProviderFactory::create(&config);
        assert!(choice.provider.is_synthetic());
        assert!(choice.substitution.unwrap().contains("watson"));
    }

    #[test]
    fn test_openai_with_key_uses_default_model() {
        let config = ProviderConfig {
            provider: "openai".to_string(),
            openai: BackendConfig { api_key: Some("sk-test".to_string()), ..Default::default() },
            ..Default::default()
        };
        let choice = ProviderFactory::create(&config);
        assert!(!choice.provider.is_synthetic());
        assert_eq!(choice.provider.provider_id(), "openai:gpt-4-turbo-preview");
    }

    #[test]
    fn test_temperatures_per_stage() {
        let temps = StageTemperatures::default();
        assert!((temps.for_stage(StageKind::Investigation) - 0.3).abs() < f32::EPSILON);
        assert!((temps.for_stage(StageKind::Response) - 0.2).abs() < f32::EPSILON);
    }
}
