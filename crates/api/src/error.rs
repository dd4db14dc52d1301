//! HTTP mapping of engine errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        let ApiError::Engine(e) = self;
        match e {
            EngineError::InvalidResume { .. } | EngineError::InvalidAbort { .. } => StatusCode::CONFLICT,
            EngineError::WorkflowNotFound(_)
            | EngineError::ExecutionNotFound(_)
            | EngineError::JobNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidNodeId(_)
            | EngineError::DuplicateNodeId(_)
            | EngineError::UnknownNodeReference { .. }
            | EngineError::CycleDetected
            | EngineError::UnknownStartNode(_)
            | EngineError::UnreachableNode(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
