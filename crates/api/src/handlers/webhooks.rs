use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use engine::TriggerEvent;
use serde_json::Value;
use uuid::Uuid;

use super::{execution_response, ApiError, AppState};

/// Inbound webhook. The whole JSON body is the trigger payload; headers
/// with non-UTF-8 values are dropped.
pub async fn handle_webhook(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect();

    let result = state
        .engine
        .execute(id, TriggerEvent::webhook(payload, headers))
        .await?;
    Ok(execution_response(result))
}
