use axum::{
    extract::{Path, Query, State},
    Json,
};
use engine::{HistoryRecord, HistoryRecorder};
use uuid::Uuid;

use super::{ApiError, AppState};

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 500;

#[derive(Debug, Default, serde::Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Execution history for one workflow, most recent first.
pub async fn history(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE);
    if limit == 0 || limit > MAX_PAGE {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_PAGE}"
        )));
    }

    let records = state
        .engine
        .history()
        .list(id, limit, query.offset.unwrap_or(0))
        .await?;
    Ok(Json(records))
}
