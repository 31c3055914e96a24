//! Provider selection with retry and synthetic fallback.
//!
//! A real backend gets two attempts per stage. Timeouts, transport failures
//! and schema violations all count as failed attempts. After the second
//! failure the stage goes to the fallback backend once, if one is configured.

use crate::error::{OrchestrationError, Result};
use crate::stage::{StageResult, validate};
use socflow_abstraction::{AnalysisProvider, ProviderError, StageKind, StageRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

const REAL_BACKEND_ATTEMPTS: usize = 2;

/// A validated stage result and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Validated result.
    pub result: StageResult,
    /// Provider that produced it.
    pub provider_id: String,
    /// Set when the fallback backend produced the result.
    pub fallback_reason: Option<String>,
}

enum AttemptError {
    Transport(String),
    Schema(String),
}

impl AttemptError {
    fn message(&self) -> &str {
        match self {
            Self::Transport(m) | Self::Schema(m) => m,
        }
    }

    fn into_error(self, stage: StageKind) -> OrchestrationError {
        match self {
            Self::Transport(message) => OrchestrationError::ProviderTransport { stage, message },
            Self::Schema(message) => OrchestrationError::ProviderSchema { stage, message },
        }
    }
}

/// Chooses the backend for each stage call.
pub struct ProviderSelector {
    primary: Arc<dyn AnalysisProvider>,
    fallback: Option<Arc<dyn AnalysisProvider>>,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSelector")
            .field("primary", &self.primary.provider_id())
            .field("fallback", &self.fallback.as_ref().map(|p| p.provider_id().to_string()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderSelector {
    /// Creates a selector without fallback.
    #[must_use]
    pub fn new(primary: Arc<dyn AnalysisProvider>, timeout: Duration) -> Self {
        Self { primary, fallback: None, timeout }
    }

    /// Sets the backend used once the primary is exhausted.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn AnalysisProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Identifier of the primary backend.
    pub fn primary_id(&self) -> &str {
        self.primary.provider_id()
    }

    /// Whether a fallback backend is configured.
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Runs one stage and validates the output.
    ///
    /// # Errors
    /// * `ProviderTransport` / `ProviderSchema` when the primary is exhausted
    ///   and there is no fallback, or the fallback cannot be reached
    /// * `InternalInvariant` when the synthetic backend produces invalid output
    pub async fn run(&self, request: &StageRequest) -> Result<Analysis> {
        let stage = request.kind;
        let attempts = if self.primary.is_synthetic() { 1 } else { REAL_BACKEND_ATTEMPTS };

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.attempt(self.primary.as_ref(), request).await {
                Ok(result) => {
                    debug!(
                        stage = %stage,
                        provider = %self.primary.provider_id(),
                        attempt,
                        "Stage analysed"
                    );
                    return Ok(Analysis {
                        result,
                        provider_id: self.primary.provider_id().to_string(),
                        fallback_reason: None,
                    });
                }
                Err(err) => {
                    warn!(
                        stage = %stage,
                        provider = %self.primary.provider_id(),
                        attempt,
                        error = %err.message(),
                        "Provider attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        let Some(err) = last_error else {
            return Err(OrchestrationError::InternalInvariant(format!(
                "{stage} stage made no provider attempt"
            )));
        };

        if self.primary.is_synthetic() {
            return Err(Self::synthetic_failure(stage, err));
        }

        let Some(fallback) = &self.fallback else {
            return Err(err.into_error(stage));
        };

        let reason = format!(
            "{} failed after {attempts} attempts ({}); used {}",
            self.primary.provider_id(),
            err.message(),
            fallback.provider_id()
        );
        warn!(
            stage = %stage,
            fallback = %fallback.provider_id(),
            "Falling back to synthetic backend"
        );

        match self.attempt(fallback.as_ref(), request).await {
            Ok(result) => Ok(Analysis {
                result,
                provider_id: fallback.provider_id().to_string(),
                fallback_reason: Some(reason),
            }),
            Err(err) if fallback.is_synthetic() => Err(Self::synthetic_failure(stage, err)),
            Err(err) => Err(err.into_error(stage)),
        }
    }

    async fn attempt(
        &self,
        provider: &dyn AnalysisProvider,
        request: &StageRequest,
    ) -> std::result::Result<StageResult, AttemptError> {
        let fields = match timeout(self.timeout, provider.analyze(request)).await {
            Ok(Ok(fields)) => fields,
            Ok(Err(err)) => {
                return Err(classify(&err));
            }
            Err(_) => {
                let err = ProviderError::Timeout {
                    provider: provider.provider_id().to_string(),
                    after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                };
                return Err(AttemptError::Transport(err.to_string()));
            }
        };

        validate(request.kind, fields).map_err(|violation| AttemptError::Schema(violation.reason))
    }

    fn synthetic_failure(stage: StageKind, err: AttemptError) -> OrchestrationError {
        match err {
            AttemptError::Schema(message) => OrchestrationError::InternalInvariant(format!(
                "synthetic backend produced invalid {stage} output: {message}"
            )),
            transport @ AttemptError::Transport(_) => transport.into_error(stage),
        }
    }
}

fn classify(err: &ProviderError) -> AttemptError {
    if err.is_schema() {
        AttemptError::Schema(err.to_string())
    } else {
        AttemptError::Transport(err.to_string())
    }
}
