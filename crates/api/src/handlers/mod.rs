//! Route handlers and the shared error type.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine::{EngineError, ExecutionEngine, ExecutionResult};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub mod events;
pub mod executions;
pub mod webhooks;
pub mod workflows;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
}

impl AppState {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self { engine }
    }
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(EngineError::WorkflowNotFound(_) | EngineError::HistoryNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Engine(EngineError::WorkflowInactive(_)) => StatusCode::CONFLICT,
            Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BadRequest",
            Self::Engine(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        let body = json!({ "error": { "code": self.code(), "message": self.to_string() } });
        (status, Json(body)).into_response()
    }
}

/// 200 for a successful run, 422 when the run failed. Both carry the result.
pub(crate) fn execution_response(result: ExecutionResult) -> Response {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(result)).into_response()
}
