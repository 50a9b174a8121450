use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use engine::TriggerEvent;
use serde_json::Value;
use uuid::Uuid;

use super::{execution_response, ApiError, AppState};

#[derive(serde::Deserialize)]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub payload: Value,
    pub user_id: Option<String>,
}

/// Manual trigger: run the workflow now and return the outcome.
pub async fn execute(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ExecuteWorkflowDto>,
) -> Result<Response, ApiError> {
    let trigger = TriggerEvent::manual(body.payload, body.user_id);
    let result = state.engine.execute(id, trigger).await?;
    Ok(execution_response(result))
}
