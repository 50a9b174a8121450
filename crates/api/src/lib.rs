//! `api` crate — HTTP trigger ingress and history queries.
//!
//! Exposes:
//!   POST   /api/v1/workflows/:id/execute
//!   GET    /api/v1/workflows/:id/history
//!   POST   /api/v1/webhooks/:id
//!   POST   /api/v1/events/:id

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod handlers;

pub use handlers::{ApiError, AppState};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/workflows/:id/execute", post(handlers::executions::execute))
        .route("/api/v1/workflows/:id/history", get(handlers::workflows::history))
        .route("/api/v1/webhooks/:id", post(handlers::webhooks::handle_webhook))
        .route("/api/v1/events/:id", post(handlers::events::handle_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(bind: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
