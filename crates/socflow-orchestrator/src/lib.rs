//! Workflow orchestration for socflow.
//!
//! Alerts enter through [`WorkflowOrchestrator::submit`] and move through
//! Triage, Investigation, Decision and Response according to a single
//! transition table. Observers follow progress through per-workflow event
//! subscriptions.

pub mod alert;
pub mod broadcaster;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod metrics;
pub mod orchestrator;
pub mod record;
pub mod selector;
pub mod stage;
pub mod store;
pub mod transitions;

pub use alert::{Alert, AssetRefs, MitreInfo, Severity, ensure_unique_ids};
pub use broadcaster::{EventBroadcaster, Subscription};
pub use config::{OrchestratorConfig, SocflowConfig};
pub use error::{OrchestrationError, Result};
pub use events::{EventKind, PROVIDER_FALLBACK, WorkflowEvent};
pub use executor::{StageExecutor, variables_for};
pub use metrics::{StageMetrics, SystemMetrics};
pub use orchestrator::{StatusReport, Submission, WorkflowOrchestrator};
pub use record::{WorkflowRecord, WorkflowStatus, WorkflowSummary};
pub use selector::{Analysis, ProviderSelector};
pub use stage::{
    DecisionResult, Impact, InvestigationResult, Priority, ResponseResult, ResponseStatus,
    SchemaViolation, StageResult, ThreatContext, TriageResult, Verdict,
};
pub use store::{DEFAULT_LIST_LIMIT, ListFilter, RecordStore, StoreError};
pub use transitions::{BranchPolicy, BranchPolicyError, Transition, next_status};
