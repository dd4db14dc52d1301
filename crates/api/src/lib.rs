//! `api` crate: HTTP surface of the engine.
//!
//! Exposes:
//!   POST   /api/v1/workflows/{id}/execute
//!   POST   /api/v1/jobs/{id}/resume
//!   GET    /api/v1/executions/{id}
//!   POST   /api/v1/executions/{id}/abort

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use engine::ExecutionController;

pub use error::ApiError;

#[derive(Debug, Clone)]
pub struct AppState {
    pub controller: Arc<ExecutionController>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/workflows/:id/execute", post(handlers::executions::execute))
        .route("/api/v1/jobs/:id/resume", post(handlers::jobs::resume))
        .route("/api/v1/executions/:id", get(handlers::executions::get))
        .route("/api/v1/executions/:id/abort", post(handlers::executions::abort))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `bind` until the process is stopped.
pub async fn serve(bind: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
