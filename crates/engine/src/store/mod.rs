//! Storage contracts used by the execution engine.
//!
//! The engine only reads workflow definitions and writes back run counters;
//! it owns history records until their terminal write. Backing stores are
//! collaborators: [`memory`] for tests and single-shot runs, [`postgres`] for
//! the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::EngineError;
use crate::models::{
    Completion, HistoryRecord, HistoryStatus, LastStatus, PendingRecord, WorkflowDefinition,
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryHistory, MemoryWorkflowStore};
pub use postgres::{PgHistory, PgWorkflowStore};

/// Read access to workflow definitions plus the run-counter write-back.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, EngineError>;

    /// Set `last_run` / `last_status` and reset (`Success`) or increment
    /// (`Error`) `error_count`. Implementations must make the increment
    /// atomic with respect to concurrent runs.
    async fn record_run(
        &self,
        id: Uuid,
        status: LastStatus,
        finished_at: DateTime<Utc>,
    ) -> Result<(), EngineError>;
}

/// Persists one immutable audit entry per execution attempt.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    /// Open a `pending` record and return its id.
    async fn begin(&self, pending: PendingRecord) -> Result<Uuid, EngineError>;

    /// The single terminal write.
    ///
    /// # Errors
    /// [`EngineError::HistoryAlreadyFinalized`] if the record is not pending,
    /// [`EngineError::HistoryNotFound`] if it does not exist.
    async fn complete(&self, id: Uuid, completion: Completion) -> Result<(), EngineError>;

    async fn get(&self, id: Uuid) -> Result<Option<HistoryRecord>, EngineError>;

    /// A page of records for one workflow, most recent first.
    async fn list(
        &self,
        workflow_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryRecord>, EngineError>;
}

fn ensure_terminal(completion: &Completion) -> Result<(), EngineError> {
    if completion.status == HistoryStatus::Pending {
        return Err(EngineError::Storage(
            "a history completion must be `success` or `error`".into(),
        ));
    }
    Ok(())
}
