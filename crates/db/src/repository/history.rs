//! Execution history repository functions.
//!
//! A history row is inserted once as `pending` and receives exactly one
//! terminal update; the update is guarded by `status = 'pending'`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{HistoryCompletion, HistoryRow, NewHistoryRow},
};

const HISTORY_COLUMNS: &str = "id, workflow_id, organization_id, status, trigger_type, trigger_data, \
     source_data, target_data, transformations, error_code, error_message, error_stage, \
     duration_ms, created_at, completed_at";

/// Insert a new history row in `pending` status.
pub async fn create_history(pool: &PgPool, new: &NewHistoryRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_history
            (id, workflow_id, organization_id, status, trigger_type, trigger_data, transformations, created_at)
        VALUES ($1, $2, $3, 'pending', $4, $5, '[]'::jsonb, $6)
        "#,
    )
    .bind(new.id)
    .bind(new.workflow_id)
    .bind(new.organization_id)
    .bind(&new.trigger_type)
    .bind(&new.trigger_data)
    .bind(new.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Apply the terminal update to a pending history row.
///
/// Returns `DbError::NotFound` if the row does not exist and
/// `DbError::Conflict` if it has already been completed.
pub async fn complete_history(
    pool: &PgPool,
    id: Uuid,
    completion: &HistoryCompletion,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_history
        SET status          = $1,
            source_data     = $2,
            target_data     = $3,
            transformations = $4,
            error_code      = $5,
            error_message   = $6,
            error_stage     = $7,
            duration_ms     = $8,
            completed_at    = $9
        WHERE id = $10 AND status = 'pending'
        "#,
    )
    .bind(&completion.status)
    .bind(&completion.source_data)
    .bind(&completion.target_data)
    .bind(&completion.transformations)
    .bind(&completion.error_code)
    .bind(&completion.error_message)
    .bind(&completion.error_stage)
    .bind(completion.duration_ms)
    .bind(completion.completed_at)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return match find_history(pool, id).await? {
            Some(_) => Err(DbError::Conflict),
            None => Err(DbError::NotFound),
        };
    }

    Ok(())
}

/// Fetch a single history row by its primary key.
pub async fn find_history(pool: &PgPool, id: Uuid) -> Result<Option<HistoryRow>, DbError> {
    let sql = format!("SELECT {HISTORY_COLUMNS} FROM workflow_history WHERE id = $1");
    let row = sqlx::query_as::<_, HistoryRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Return a page of history rows for a workflow, most recent first.
pub async fn list_history(
    pool: &PgPool,
    workflow_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<HistoryRow>, DbError> {
    let sql = format!(
        "SELECT {HISTORY_COLUMNS} FROM workflow_history \
         WHERE workflow_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query_as::<_, HistoryRow>(&sql)
        .bind(workflow_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
