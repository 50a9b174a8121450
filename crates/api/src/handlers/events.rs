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
pub struct EventDto {
    pub event: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Internal event trigger.
pub async fn handle_event(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<EventDto>,
) -> Result<Response, ApiError> {
    let result = state
        .engine
        .execute(id, TriggerEvent::event(body.payload, body.event))
        .await?;
    Ok(execution_response(result))
}
