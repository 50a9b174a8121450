//! In-process stores. Used by tests and by `flowlink run`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{HistoryRecorder, WorkflowStore, ensure_terminal};
use crate::EngineError;
use crate::models::{
    Completion, HistoryRecord, HistoryStatus, LastStatus, PendingRecord, WorkflowDefinition,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, EngineError> {
    mutex
        .lock()
        .map_err(|_| EngineError::Storage("in-memory store lock poisoned".into()))
}

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    workflows: Mutex<HashMap<Uuid, WorkflowDefinition>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a workflow.
    pub fn insert(&self, workflow: WorkflowDefinition) -> Result<(), EngineError> {
        lock(&self.workflows)?.insert(workflow.id, workflow);
        Ok(())
    }

    pub fn set_active(&self, id: Uuid, active: bool) -> Result<(), EngineError> {
        let mut workflows = lock(&self.workflows)?;
        let workflow = workflows.get_mut(&id).ok_or(EngineError::WorkflowNotFound(id))?;
        workflow.active = active;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, EngineError> {
        Ok(lock(&self.workflows)?.get(&id).cloned())
    }

    async fn record_run(
        &self,
        id: Uuid,
        status: LastStatus,
        finished_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut workflows = lock(&self.workflows)?;
        let workflow = workflows.get_mut(&id).ok_or(EngineError::WorkflowNotFound(id))?;

        workflow.last_run = Some(finished_at);
        workflow.last_status = status;
        workflow.error_count = match status {
            LastStatus::Success => 0,
            _ => workflow.error_count.saturating_add(1),
        };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryHistory {
    /// Insertion order.
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Result<Vec<HistoryRecord>, EngineError> {
        Ok(lock(&self.records)?.clone())
    }
}

#[async_trait]
impl HistoryRecorder for MemoryHistory {
    async fn begin(&self, pending: PendingRecord) -> Result<Uuid, EngineError> {
        let id = Uuid::new_v4();
        lock(&self.records)?.push(HistoryRecord {
            id,
            workflow_id: pending.workflow_id,
            organization_id: pending.organization_id,
            status: HistoryStatus::Pending,
            trigger: pending.trigger,
            source_data: None,
            target_data: None,
            transformations: Vec::new(),
            error: None,
            duration_ms: None,
            timestamp: pending.started_at,
            completed_at: None,
        });
        Ok(id)
    }

    async fn complete(&self, id: Uuid, completion: Completion) -> Result<(), EngineError> {
        ensure_terminal(&completion)?;

        let mut records = lock(&self.records)?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(EngineError::HistoryNotFound(id))?;

        if record.status != HistoryStatus::Pending {
            return Err(EngineError::HistoryAlreadyFinalized(id));
        }

        record.status = completion.status;
        record.source_data = completion.source_data;
        record.target_data = completion.target_data;
        record.transformations = completion.transformations;
        record.error = completion.error;
        record.duration_ms = Some(completion.duration_ms);
        record.completed_at = Some(completion.completed_at);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<HistoryRecord>, EngineError> {
        Ok(lock(&self.records)?.iter().find(|r| r.id == id).cloned())
    }

    async fn list(
        &self,
        workflow_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryRecord>, EngineError> {
        let records = lock(&self.records)?;
        let mut matching: Vec<HistoryRecord> = records
            .iter()
            .rev()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep newest-inserted first.
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}
