//! The workflow orchestrator.
//!
//! Each submitted alert gets a record and one tokio task that drives it
//! through the transition table. Stages of one workflow run in order; stages
//! of different workflows share a semaphore of `max_concurrent_stages`
//! permits. Every status change goes through [`RecordStore::advance`], and
//! every lifecycle step is published to the workflow's event channel.

use crate::alert::{Alert, ensure_unique_ids};
use crate::broadcaster::{EventBroadcaster, Subscription};
use crate::config::SocflowConfig;
use crate::error::{OrchestrationError, Result};
use crate::events::{PROVIDER_FALLBACK, WorkflowEvent};
use crate::executor::StageExecutor;
use crate::metrics::SystemMetrics;
use crate::record::{WorkflowRecord, WorkflowStatus, WorkflowSummary};
use crate::selector::ProviderSelector;
use crate::store::{ListFilter, RecordStore, StoreError};
use crate::transitions::{BranchPolicy, Transition};
use serde::Serialize;
use serde_json::{Value, json};
use socflow_abstraction::{AnalysisProvider, StageKind};
use socflow_models::ProviderFactory;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Acknowledgement returned for each accepted alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    /// Alert identifier.
    pub alert_id: String,
    /// Workflow created for the alert.
    pub workflow_id: String,
    /// Status at the time of return.
    pub status: WorkflowStatus,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Summary view.
    pub summary: WorkflowSummary,
    /// Full record, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<WorkflowRecord>,
}

/// Why a workflow task stopped before reaching its final event.
enum Abort {
    /// The record was cleared while the task was running.
    Gone,
    /// The workflow must be failed with this error.
    Failed(OrchestrationError),
}

impl From<OrchestrationError> for Abort {
    fn from(err: OrchestrationError) -> Self {
        Self::Failed(err)
    }
}

impl From<StoreError> for Abort {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::Gone,
            other => Self::Failed(other.into()),
        }
    }
}

struct Inner {
    store: RecordStore,
    broadcaster: EventBroadcaster,
    executor: StageExecutor,
    policy: BranchPolicy,
    permits: Semaphore,
    query_timeout: Duration,
    list_limit: usize,
    provider_notice: Option<String>,
}

/// Drives alerts through Triage, Investigation, Decision and Response.
///
/// Cloning is cheap; clones share the same store and channels.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("selector", self.inner.executor.selector())
            .field("broadcaster", &self.inner.broadcaster)
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl WorkflowOrchestrator {
    /// Creates an orchestrator whose provider comes from `config.provider`.
    ///
    /// If the configured provider cannot be used, the synthetic backend is
    /// substituted and the reason is available from [`provider_notice`].
    ///
    /// [`provider_notice`]: Self::provider_notice
    #[must_use]
    pub fn new(config: &SocflowConfig) -> Self {
        let choice = ProviderFactory::create(&config.provider);
        Self::build(config, choice.provider, choice.substitution)
    }

    /// Creates an orchestrator around an explicit primary provider.
    ///
    /// A synthetic fallback is added when `allow_fallback` is set and the
    /// primary is not itself synthetic.
    #[must_use]
    pub fn with_provider(config: &SocflowConfig, primary: Arc<dyn AnalysisProvider>) -> Self {
        Self::build(config, primary, None)
    }

    fn build(
        config: &SocflowConfig,
        primary: Arc<dyn AnalysisProvider>,
        provider_notice: Option<String>,
    ) -> Self {
        let fallback_enabled = config.provider.allow_fallback && !primary.is_synthetic();
        info!(
            provider = %primary.provider_id(),
            fallback = fallback_enabled,
            max_concurrent_stages = config.orchestrator.max_concurrent_stages,
            "Creating workflow orchestrator"
        );

        let mut selector = ProviderSelector::new(primary, config.provider.timeout());
        if fallback_enabled {
            selector = selector.with_fallback(ProviderFactory::synthetic(&config.provider));
        }

        let inner = Inner {
            store: RecordStore::new(),
            broadcaster: EventBroadcaster::new(
                config.orchestrator.event_history,
                config.orchestrator.event_buffer,
            ),
            executor: StageExecutor::new(selector, config.provider.temperatures.clone()),
            policy: config.policy.clone(),
            permits: Semaphore::new(config.orchestrator.max_concurrent_stages.max(1)),
            query_timeout: config.orchestrator.query_timeout(),
            list_limit: config.orchestrator.list_limit,
            provider_notice,
        };

        Self { inner: Arc::new(inner) }
    }

    /// Why the configured provider was replaced by the synthetic backend, if it was.
    pub fn provider_notice(&self) -> Option<&str> {
        self.inner.provider_notice.as_deref()
    }

    /// Accepts one alert and starts its workflow.
    ///
    /// Returns as soon as Triage is dispatched; the status returned is never
    /// `CREATED`. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `InvalidAlert` if the alert fails validation.
    pub async fn submit(&self, alert: Alert) -> Result<Submission> {
        alert.validate()?;

        let workflow_id = Uuid::new_v4().to_string();
        let alert_id = alert.alert_id.clone();
        let inner = &self.inner;

        inner.store.insert(WorkflowRecord::new(workflow_id.clone(), alert)).await;
        inner.broadcaster.register(&workflow_id);
        let record =
            inner.store.advance(&workflow_id, Transition::Start(StageKind::Triage), |_| {}).await?;

        info!(workflow_id = %workflow_id, alert_id = %alert_id, "Workflow submitted");

        let task_inner = Arc::clone(inner);
        let task_id = workflow_id.clone();
        tokio::spawn(async move { task_inner.drive(task_id).await });

        Ok(Submission { alert_id, workflow_id, status: record.status })
    }

    /// Accepts a batch of alerts; each gets an independent workflow.
    ///
    /// The batch is checked as a whole before anything is submitted.
    ///
    /// # Errors
    /// `DuplicateAlert` if an alert id repeats, `InvalidAlert` if any alert
    /// fails validation.
    pub async fn submit_batch(&self, alerts: Vec<Alert>) -> Result<Vec<Submission>> {
        ensure_unique_ids(&alerts)?;
        for alert in &alerts {
            alert.validate()?;
        }

        debug!(count = alerts.len(), "Submitting alert batch");
        let mut submissions = Vec::with_capacity(alerts.len());
        for alert in alerts {
            submissions.push(self.submit(alert).await?);
        }
        Ok(submissions)
    }

    /// Current state of a workflow.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `Transient` if the store did not answer in time.
    pub async fn status(&self, workflow_id: &str, include_details: bool) -> Result<StatusReport> {
        let record = timeout(self.inner.query_timeout, self.inner.store.get(workflow_id))
            .await
            .map_err(|_| {
                OrchestrationError::Transient(format!("status query for {workflow_id} timed out"))
            })?
            .ok_or_else(|| OrchestrationError::NotFound(workflow_id.to_string()))?;

        let summary = record.summary();
        Ok(StatusReport { summary, record: include_details.then_some(record) })
    }

    /// Workflow summaries matching `filter`, newest first.
    ///
    /// A zero limit means the configured default.
    pub async fn list(&self, filter: &ListFilter) -> Vec<WorkflowSummary> {
        let mut filter = filter.clone();
        if filter.limit == 0 {
            filter.limit = self.inner.list_limit;
        }
        self.inner.store.list(&filter).await.iter().map(WorkflowRecord::summary).collect()
    }

    /// Subscribes to a workflow's events.
    ///
    /// The first event is a `status` snapshot carrying the workflow summary.
    ///
    /// # Errors
    /// `NotFound` for unknown or cleared workflows.
    pub async fn subscribe(&self, workflow_id: &str) -> Result<Subscription> {
        let not_found = || OrchestrationError::NotFound(workflow_id.to_string());

        // Attach before reading the record so nothing published in between is missed.
        let subscription = self.inner.broadcaster.subscribe(workflow_id).ok_or_else(not_found)?;
        let record = self.inner.store.get(workflow_id).await.ok_or_else(not_found)?;

        let snapshot = WorkflowEvent::status(workflow_id, record.status.as_str())
            .with_payload(serde_json::to_value(record.summary())?);
        Ok(subscription.with_snapshot(snapshot))
    }

    /// Retained events of a workflow.
    pub fn events(&self, workflow_id: &str) -> Vec<WorkflowEvent> {
        self.inner.broadcaster.history(workflow_id)
    }

    /// Waits until a workflow reaches a terminal status.
    ///
    /// # Errors
    /// `NotFound` if the workflow is unknown or cleared while waiting.
    pub async fn wait(&self, workflow_id: &str) -> Result<WorkflowSummary> {
        let mut subscription = self.subscribe(workflow_id).await?;
        while subscription.recv().await.is_some() {}
        Ok(self.status(workflow_id, false).await?.summary)
    }

    /// Aggregate metrics over every stored workflow.
    pub async fn metrics(&self) -> SystemMetrics {
        SystemMetrics::from_records(&self.inner.store.snapshot().await)
    }

    /// Deletes every record and event channel.
    ///
    /// Workflows still running stop at their next step without writing.
    pub async fn clear_all(&self) -> usize {
        let removed = self.inner.store.clear().await;
        let channels = self.inner.broadcaster.clear_all();
        info!(records = removed, channels, "Cleared all workflows");
        removed
    }
}

impl Inner {
    async fn drive(&self, workflow_id: String) {
        match self.run_pipeline(&workflow_id).await {
            Ok(()) => {}
            Err(Abort::Gone) => {
                debug!(workflow_id = %workflow_id, "Workflow cleared while running, stopping");
            }
            Err(Abort::Failed(err)) => self.fail(&workflow_id, &err).await,
        }
    }

    async fn run_pipeline(&self, id: &str) -> std::result::Result<(), Abort> {
        let triaged = self.run_stage(id, StageKind::Triage).await?;
        let triage = triaged.triage.as_ref().ok_or_else(|| {
            OrchestrationError::InternalInvariant(format!("workflow {id} has no triage result"))
        })?;

        if self.policy.is_noise(triage) {
            let decision = self.policy.derive_decision(triage, &triaged.alert);
            let respond = self.policy.needs_response(&decision);
            let payload = serde_json::to_value(&decision).unwrap_or(Value::Null);
            let transition =
                if respond { Transition::Start(StageKind::Response) } else { Transition::Filter };

            self.store
                .advance(id, transition, |record| {
                    record.decision = Some(decision);
                    record.decision_derived = true;
                })
                .await?;
            debug!(workflow_id = %id, respond, "Alert classified as noise at triage");
            self.broadcaster
                .publish(WorkflowEvent::agent_output(id, StageKind::Decision, "derived", payload));

            if respond {
                self.run_stage(id, StageKind::Response).await?;
            }
        } else {
            self.start(id, StageKind::Investigation).await?;
            self.run_stage(id, StageKind::Investigation).await?;

            self.start(id, StageKind::Decision).await?;
            let decided = self.run_stage(id, StageKind::Decision).await?;
            let decision = decided.decision.as_ref().ok_or_else(|| {
                OrchestrationError::InternalInvariant(format!(
                    "workflow {id} has no decision result"
                ))
            })?;

            if self.policy.needs_response(decision) {
                self.start(id, StageKind::Response).await?;
                self.run_stage(id, StageKind::Response).await?;
            } else {
                self.store.advance(id, Transition::Finish, |_| {}).await?;
            }
        }

        self.finish(id).await
    }

    async fn start(&self, id: &str, kind: StageKind) -> std::result::Result<(), Abort> {
        self.store.advance(id, Transition::Start(kind), |_| {}).await?;
        Ok(())
    }

    /// Runs a stage whose `Start` transition has already been applied.
    async fn run_stage(
        &self,
        id: &str,
        kind: StageKind,
    ) -> std::result::Result<WorkflowRecord, Abort> {
        self.broadcaster.publish(WorkflowEvent::stage_started(id, kind));

        let analysis = {
            let _permit = self.permits.acquire().await.map_err(|_| {
                OrchestrationError::InternalInvariant("stage permits closed".to_string())
            })?;
            let record = self.store.get(id).await.ok_or(Abort::Gone)?;
            self.executor.execute(&record, kind).await?
        };

        if let Some(reason) = &analysis.fallback_reason {
            warn!(
                workflow_id = %id,
                stage = %kind,
                reason = %reason,
                "Stage used fallback backend"
            );
            self.broadcaster.publish(
                WorkflowEvent::status(id, PROVIDER_FALLBACK)
                    .with_stage(kind)
                    .with_message(reason.clone()),
            );
        }

        let payload = analysis.result.to_payload();
        let warning = analysis.fallback_reason.map(|reason| format!("{kind}: {reason}"));
        let record = self
            .store
            .advance(id, Transition::Complete(kind), |record| {
                record.set_result(analysis.result);
                record.warnings.extend(warning);
            })
            .await?;

        debug!(
            workflow_id = %id,
            stage = %kind,
            provider = %analysis.provider_id,
            "Stage completed"
        );
        self.broadcaster.publish(WorkflowEvent::agent_output(id, kind, "completed", payload));
        self.broadcaster.publish(WorkflowEvent::stage_completed(id, kind));
        Ok(record)
    }

    async fn finish(&self, id: &str) -> std::result::Result<(), Abort> {
        let record = self.store.get(id).await.ok_or(Abort::Gone)?;
        info!(
            workflow_id = %id,
            status = %record.status,
            verdict = ?record.verdict(),
            priority = ?record.priority(),
            "Workflow finished"
        );
        self.broadcaster.publish(WorkflowEvent::final_event(
            id,
            record.status.as_str(),
            final_payload(&record),
        ));
        Ok(())
    }

    async fn fail(&self, id: &str, err: &OrchestrationError) {
        let message = err.to_string();
        error!(workflow_id = %id, error = %message, "Workflow failed");

        let record = match self
            .store
            .advance(id, Transition::Fail, |record| record.last_error = Some(message.clone()))
            .await
        {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return,
            Err(store_err) => {
                error!(workflow_id = %id, error = %store_err, "Could not mark workflow failed");
                match self.store.get(id).await {
                    Some(record) => record,
                    None => return,
                }
            }
        };

        self.broadcaster.publish(WorkflowEvent::error(id, record.current_stage, message));
        self.broadcaster.publish(WorkflowEvent::final_event(
            id,
            record.status.as_str(),
            final_payload(&record),
        ));
    }
}

fn final_payload(record: &WorkflowRecord) -> Value {
    json!({
        "verdict": record.verdict(),
        "priority": record.priority(),
        "ticket_id": record.response.as_ref().and_then(|r| r.ticket_id.clone()),
        "processing_time": record.processing_time_secs(),
        "error": record.last_error,
    })
}
