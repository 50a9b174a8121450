//! Postgres-backed stores built on the `db` repository functions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::DbPool;
use db::models::{HistoryCompletion, HistoryRow, NewHistoryRow, WorkflowRow};
use db::repository::{history as history_repo, workflows as wf_repo};
use db::DbError;
use uuid::Uuid;

use super::{HistoryRecorder, WorkflowStore, ensure_terminal};
use crate::EngineError;
use crate::models::{
    Completion, ErrorInfo, HistoryRecord, HistoryStatus, LastStatus, PendingRecord, Pipeline, Stage,
    TriggerSnapshot, TriggerType, WorkflowDefinition,
};

// ---------------------------------------------------------------------------
// Row conversions
// ---------------------------------------------------------------------------

fn workflow_from_row(row: WorkflowRow) -> Result<WorkflowDefinition, EngineError> {
    let pipeline: Pipeline = serde_json::from_value(row.definition)
        .map_err(|e| EngineError::InvalidDefinition(format!("workflow {}: {e}", row.id)))?;
    let last_status = row.last_status.parse::<LastStatus>().map_err(EngineError::Storage)?;

    Ok(WorkflowDefinition {
        id: row.id,
        organization_id: row.organization_id,
        name: row.name,
        active: row.active,
        pipeline,
        last_run: row.last_run,
        last_status,
        error_count: u64::try_from(row.error_count).unwrap_or_default(),
    })
}

fn history_from_row(row: HistoryRow) -> Result<HistoryRecord, EngineError> {
    let status = row.status.parse::<HistoryStatus>().map_err(EngineError::Storage)?;
    let trigger_type = row.trigger_type.parse::<TriggerType>().map_err(EngineError::Storage)?;
    let transformations = serde_json::from_value(row.transformations)
        .map_err(|e| {
            EngineError::Storage(format!("history {}: bad transformations: {e}", row.id))
        })?;

    let error = match (row.error_code, row.error_message) {
        (Some(code), message) => Some(ErrorInfo {
            code,
            message: message.unwrap_or_default(),
            stage: row.error_stage.as_deref().and_then(|s| s.parse::<Stage>().ok()),
        }),
        (None, _) => None,
    };

    Ok(HistoryRecord {
        id: row.id,
        workflow_id: row.workflow_id,
        organization_id: row.organization_id,
        status,
        trigger: TriggerSnapshot {
            trigger_type,
            data: row.trigger_data,
        },
        source_data: row.source_data,
        target_data: row.target_data,
        transformations,
        error,
        duration_ms: row.duration_ms.and_then(|d| u64::try_from(d).ok()),
        timestamp: row.created_at,
        completed_at: row.completed_at,
    })
}

// ---------------------------------------------------------------------------
// PgWorkflowStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgWorkflowStore {
    pool: DbPool,
}

impl PgWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Validate and insert a workflow; returns the stored definition.
    pub async fn create(
        &self,
        organization_id: Uuid,
        name: &str,
        active: bool,
        pipeline: &Pipeline,
    ) -> Result<WorkflowDefinition, EngineError> {
        pipeline.validate()?;
        let definition = serde_json::to_value(pipeline)
            .map_err(|e| EngineError::InvalidDefinition(e.to_string()))?;
        let row =
            wf_repo::create_workflow(&self.pool, organization_id, name, active, definition).await?;
        workflow_from_row(row)
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, EngineError> {
        wf_repo::find_workflow(&self.pool, id)
            .await?
            .map(workflow_from_row)
            .transpose()
    }

    async fn record_run(
        &self,
        id: Uuid,
        status: LastStatus,
        finished_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        match wf_repo::record_run(&self.pool, id, &status.to_string(), finished_at).await {
            Err(DbError::NotFound) => Err(EngineError::WorkflowNotFound(id)),
            other => Ok(other?),
        }
    }
}

// ---------------------------------------------------------------------------
// PgHistory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgHistory {
    pool: DbPool,
}

impl PgHistory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRecorder for PgHistory {
    async fn begin(&self, pending: PendingRecord) -> Result<Uuid, EngineError> {
        let id = Uuid::new_v4();
        let row = NewHistoryRow {
            id,
            workflow_id: pending.workflow_id,
            organization_id: pending.organization_id,
            trigger_type: pending.trigger.trigger_type.to_string(),
            trigger_data: pending.trigger.data,
            created_at: pending.started_at,
        };
        history_repo::create_history(&self.pool, &row).await?;
        Ok(id)
    }

    async fn complete(&self, id: Uuid, completion: Completion) -> Result<(), EngineError> {
        ensure_terminal(&completion)?;

        let transformations = serde_json::to_value(&completion.transformations)
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        let (error_code, error_message, error_stage) = match completion.error {
            Some(info) => (
                Some(info.code),
                Some(info.message),
                info.stage.map(|s| s.to_string()),
            ),
            None => (None, None, None),
        };

        let row = HistoryCompletion {
            status: completion.status.to_string(),
            source_data: completion.source_data,
            target_data: completion.target_data,
            transformations,
            error_code,
            error_message,
            error_stage,
            duration_ms: i64::try_from(completion.duration_ms).unwrap_or(i64::MAX),
            completed_at: completion.completed_at,
        };

        match history_repo::complete_history(&self.pool, id, &row).await {
            Err(DbError::Conflict) => Err(EngineError::HistoryAlreadyFinalized(id)),
            Err(DbError::NotFound) => Err(EngineError::HistoryNotFound(id)),
            other => Ok(other?),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<HistoryRecord>, EngineError> {
        history_repo::find_history(&self.pool, id)
            .await?
            .map(history_from_row)
            .transpose()
    }

    async fn list(
        &self,
        workflow_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryRecord>, EngineError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        history_repo::list_history(&self.pool, workflow_id, limit, offset)
            .await?
            .into_iter()
            .map(history_from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn history_row() -> HistoryRow {
        HistoryRow {
            id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            status: "error".into(),
            trigger_type: "webhook".into(),
            trigger_data: json!({ "a": 1 }),
            source_data: Some(json!({ "a": 1 })),
            target_data: None,
            transformations: json!([
                { "field": "a", "kind": "map", "before": 1, "after": null }
            ]),
            error_code: Some("ConditionsNotMet".into()),
            error_message: Some("conditions not met".into()),
            error_stage: Some("evaluating".into()),
            duration_ms: Some(12),
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn history_row_converts_to_record() {
        let record = history_from_row(history_row()).expect("valid row");
        assert_eq!(record.status, HistoryStatus::Error);
        assert_eq!(record.trigger.trigger_type, TriggerType::Webhook);
        let error = record.error.expect("error info");
        assert_eq!(error.code, "ConditionsNotMet");
        assert_eq!(error.stage, Some(Stage::Evaluating));
        assert_eq!(record.transformations[0].before, Some(json!(1)));
        assert_eq!(record.transformations[0].after, None);
        assert_eq!(record.duration_ms, Some(12));
    }

    #[test]
    fn unknown_history_status_is_a_storage_error() {
        let mut row = history_row();
        row.status = "running".into();
        assert!(matches!(history_from_row(row), Err(EngineError::Storage(_))));
    }

    #[test]
    fn workflow_row_converts_to_definition() {
        let row = WorkflowRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "sync".into(),
            active: false,
            definition: json!({
                "source": { "integration": "crm" },
                "target": { "integration": "log" },
                "conditions": [{ "field": "x", "operator": "exists" }]
            }),
            last_run: None,
            last_status: "error".into(),
            error_count: 3,
            created_at: Utc::now(),
        };
        let wf = workflow_from_row(row).expect("valid row");
        assert!(!wf.active);
        assert_eq!(wf.last_status, LastStatus::Error);
        assert_eq!(wf.error_count, 3);
        assert_eq!(wf.pipeline.conditions.len(), 1);
        assert!(wf.pipeline.transformations.is_empty());
    }

    #[test]
    fn malformed_definition_is_reported() {
        let row = WorkflowRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "broken".into(),
            active: true,
            definition: json!({ "source": "crm" }),
            last_run: None,
            last_status: "none".into(),
            error_count: 0,
            created_at: Utc::now(),
        };
        assert!(matches!(workflow_from_row(row), Err(EngineError::InvalidDefinition(_))));
    }
}
