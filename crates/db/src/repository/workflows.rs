//! Workflow persistence: the reads the engine needs plus the single write-back
//! of run counters.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowRow};

const WORKFLOW_COLUMNS: &str =
    "id, organization_id, name, active, definition, last_run, last_status, error_count, created_at";

/// Insert a new workflow into the database.
///
/// `definition` must be a valid JSON pipeline produced by serialising the
/// domain `Pipeline` type from the `engine` crate.
pub async fn create_workflow(
    pool: &PgPool,
    organization_id: Uuid,
    name: &str,
    active: bool,
    definition: serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let sql = format!(
        r#"
        INSERT INTO workflows (id, organization_id, name, active, definition, last_status, error_count, created_at)
        VALUES ($1, $2, $3, $4, $5, 'none', 0, $6)
        RETURNING {WORKFLOW_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(id)
        .bind(organization_id)
        .bind(name)
        .bind(active)
        .bind(definition)
        .bind(now)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Fetch a single workflow by its primary key.
///
/// Returns `Ok(None)` when no such workflow exists.
pub async fn find_workflow(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowRow>, DbError> {
    let sql = format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1");
    let row = sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Record the outcome of one run.
///
/// A single UPDATE so concurrent runs never lose an increment: `success`
/// resets `error_count`, anything else adds one to it.
pub async fn record_run(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    finished_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET last_run    = $1,
            last_status = $2,
            error_count = CASE WHEN $2 = 'success' THEN 0 ELSE error_count + 1 END
        WHERE id = $3
        "#,
    )
    .bind(finished_at)
    .bind(status)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
