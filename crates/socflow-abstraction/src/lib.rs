//! Analysis provider abstraction for socflow.
//!
//! This crate defines the contract every analysis backend implements: given a
//! stage request (a stage tag plus prompt variables), return the structured
//! fields the model produced, or fail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prompt variables handed to a provider.
pub type Variables = Map<String, Value>;

/// Structured fields returned by a provider, before schema validation.
pub type StageFields = Map<String, Value>;

/// Represents an error that can occur when calling an analysis provider.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderError {
    /// The request never produced a response (connection refused, DNS, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The call exceeded its deadline.
    #[error("Provider '{provider}' timed out after {after_ms}ms")]
    Timeout {
        /// The provider that timed out.
        provider: String,
        /// The deadline that elapsed, in milliseconds.
        after_ms: u64,
    },

    /// The backend answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Body or message returned by the backend.
        message: String,
    },

    /// The backend answered but the reply did not contain usable JSON fields.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Credentials required by the backend are absent.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The backend cannot serve this request.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Returns `true` when the failure concerns the shape of the reply rather
    /// than the transport.
    #[must_use]
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::MalformedResponse(_))
    }
}

/// The four analysis stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Level-1 triage and noise filtering.
    Triage,
    /// Deep investigation of the alert.
    Investigation,
    /// Final verdict and prioritisation.
    Decision,
    /// Ticketing, notification and automation.
    Response,
}

impl StageKind {
    /// All stages in pipeline order.
    pub const ALL: [Self; 4] = [Self::Triage, Self::Investigation, Self::Decision, Self::Response];

    /// Lowercase stage name used in events and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Investigation => "investigation",
            Self::Decision => "decision",
            Self::Response => "response",
        }
    }

    /// Classifies a variable set by its shape.
    ///
    /// Alert fields without a triage verdict are a triage request; a triage
    /// verdict with threat intelligence but no investigation summary is an
    /// investigation request; an investigation summary means decision; and
    /// recommended actions with an estimated impact means response.
    #[must_use]
    pub fn infer(variables: &Variables) -> Option<Self> {
        let has = |key: &str| variables.contains_key(key);

        if has("raw_data") && !has("triage_verdict") {
            return Some(Self::Triage);
        }
        if has("triage_verdict") && has("threat_intel") && !has("investigation_summary") {
            return Some(Self::Investigation);
        }
        if has("investigation_summary") {
            return Some(Self::Decision);
        }
        if has("recommended_actions") && has("estimated_impact") {
            return Some(Self::Response);
        }
        None
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "triage" => Ok(Self::Triage),
            "investigation" | "investigate" => Ok(Self::Investigation),
            "decision" | "decide" => Ok(Self::Decision),
            "response" | "respond" => Ok(Self::Response),
            _ => Err(()),
        }
    }
}

/// A request for one stage of analysis.
///
/// The stage tag travels with the variables so backends never have to guess
/// which stage they are serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRequest {
    /// Which stage is being requested.
    pub kind: StageKind,
    /// Prompt variables assembled from the workflow so far.
    pub variables: Variables,
    /// Optional sampling temperature for real backends.
    pub temperature: Option<f32>,
}

impl StageRequest {
    /// Creates a new request for the given stage.
    #[must_use]
    pub fn new(kind: StageKind, variables: Variables) -> Self {
        Self { kind, variables, temperature: None }
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Builds a request from a bare variable set by inferring its stage.
    ///
    /// Returns `None` when the shape matches no stage.
    #[must_use]
    pub fn infer(variables: Variables) -> Option<Self> {
        StageKind::infer(&variables).map(|kind| Self::new(kind, variables))
    }

    /// Reads a string variable.
    #[must_use]
    pub fn variable_str(&self, key: &str) -> Option<&str> {
        self.variables.get(key).and_then(Value::as_str)
    }
}

/// A trait for the backends that produce stage results.
///
/// All providers must be `Send + Sync` to allow concurrent use across workflows.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Runs one stage of analysis.
    ///
    /// # Errors
    /// Returns a `ProviderError` if the backend cannot produce fields.
    async fn analyze(&self, request: &StageRequest) -> Result<StageFields, ProviderError>;

    /// Returns the identifier of the provider (e.g. "openai:gpt-4").
    fn provider_id(&self) -> &str;

    /// Returns `true` for the credential-free synthetic backend.
    fn is_synthetic(&self) -> bool {
        false
    }
}
