//! In-process workflow record store.
//!
//! Records are only mutated through [`RecordStore::advance`], which applies a
//! transition from the table atomically together with the caller's field
//! updates. Terminal records are immutable; `clear` is the only deletion path.

use crate::record::{WorkflowRecord, WorkflowStatus};
use crate::stage::{Priority, Verdict};
use crate::transitions::{BranchPolicyError, Transition, next_status};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Default number of records returned by `list`.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Record store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No record with this id.
    #[error("workflow not found: {0}")]
    NotFound(String),

    /// The record is terminal and can no longer change.
    #[error("workflow {id} is terminal ({status})")]
    Terminal {
        /// Workflow id.
        id: String,
        /// Terminal status.
        status: WorkflowStatus,
    },

    /// The transition is not in the table.
    #[error(transparent)]
    Policy(#[from] BranchPolicyError),
}

/// Listing filter; every set field must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    /// Match this status.
    pub status: Option<WorkflowStatus>,
    /// Match this decided priority.
    pub priority: Option<Priority>,
    /// Match this verdict.
    pub verdict: Option<Verdict>,
    /// Maximum number of results.
    pub limit: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self { status: None, priority: None, verdict: None, limit: DEFAULT_LIST_LIMIT }
    }
}

impl ListFilter {
    fn matches(&self, record: &WorkflowRecord) -> bool {
        self.status.is_none_or(|s| record.status == s)
            && self.priority.is_none_or(|p| record.priority() == Some(p))
            && self.verdict.is_none_or(|v| record.verdict() == Some(v))
    }
}

/// Concurrent keyed store of workflow records.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: RwLock<HashMap<String, WorkflowRecord>>,
}

impl RecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new record.
    pub async fn insert(&self, record: WorkflowRecord) {
        debug!(workflow_id = %record.workflow_id, "Inserting workflow record");
        self.records.write().await.insert(record.workflow_id.clone(), record);
    }

    /// Returns a clone of the record.
    pub async fn get(&self, id: &str) -> Option<WorkflowRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Applies `transition` and `update` to a record in one step.
    ///
    /// `update` runs before the new status is written. On a terminal target
    /// the completion time is stamped.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `Terminal` for finished records, `Policy`
    /// for transitions outside the table. The record is untouched on error.
    pub async fn advance<F>(
        &self,
        id: &str,
        transition: Transition,
        update: F,
    ) -> Result<WorkflowRecord, StoreError>
    where
        F: FnOnce(&mut WorkflowRecord),
    {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if record.status.is_terminal() {
            return Err(StoreError::Terminal { id: id.to_string(), status: record.status });
        }
        let next = next_status(record.status, transition)?;

        update(record);
        if let Transition::Start(kind) = transition {
            record.current_stage = Some(kind);
        }
        record.status = next;
        if next.is_terminal() {
            record.completed_at = Some(Utc::now());
            if next != WorkflowStatus::Failed {
                record.current_stage = None;
            }
        }

        debug!(workflow_id = %id, transition = %transition, status = %next, "Workflow advanced");
        Ok(record.clone())
    }

    /// Lists records matching `filter`, newest first.
    pub async fn list(&self, filter: &ListFilter) -> Vec<WorkflowRecord> {
        let records = self.records.read().await;
        let mut matching: Vec<WorkflowRecord> =
            records.values().filter(|r| filter.matches(r)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(filter.limit);
        matching
    }

    /// Clones every record.
    pub async fn snapshot(&self) -> Vec<WorkflowRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Removes every record; returns how many were removed.
    pub async fn clear(&self) -> usize {
        let mut records = self.records.write().await;
        let removed = records.len();
        records.clear();
        removed
    }

    /// Number of records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
