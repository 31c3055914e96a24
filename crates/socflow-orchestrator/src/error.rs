// Error types for workflow orchestration

use crate::record::WorkflowStatus;
use crate::store::StoreError;
use crate::transitions::BranchPolicyError;
use socflow_abstraction::StageKind;
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The backend could not be reached, timed out, or returned an error status
    #[error("Provider transport error in {stage} stage: {message}")]
    ProviderTransport {
        /// Stage being executed
        stage: StageKind,
        /// Underlying provider error
        message: String,
    },

    /// The backend answered with fields that do not satisfy the stage schema
    #[error("Provider schema error in {stage} stage: {message}")]
    ProviderSchema {
        /// Stage being executed
        stage: StageKind,
        /// What failed validation
        message: String,
    },

    /// A condition the engine guarantees did not hold
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    /// A transition outside the transition table was attempted
    #[error("Transition '{transition}' is not allowed from {from}")]
    BranchPolicy {
        /// Status the workflow was in
        from: WorkflowStatus,
        /// Attempted transition
        transition: String,
    },

    /// Unknown workflow
    #[error("Workflow not found: {0}")]
    NotFound(String),

    /// The query could not be answered in time; retrying may succeed
    #[error("Transient failure: {0}")]
    Transient(String),

    /// A batch contained the same alert id twice
    #[error("Duplicate alert id in batch: {0}")]
    DuplicateAlert(String),

    /// The alert could not be accepted
    #[error("Invalid alert: {0}")]
    InvalidAlert(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestrationError {
    /// Returns `true` if the caller may retry the same request.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<BranchPolicyError> for OrchestrationError {
    fn from(err: BranchPolicyError) -> Self {
        Self::BranchPolicy { from: err.from, transition: err.transition.to_string() }
    }
}

impl From<StoreError> for OrchestrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Terminal { .. } => Self::InternalInvariant(err.to_string()),
            StoreError::Policy(policy) => policy.into(),
        }
    }
}
