use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use nodes::JobResult;

use super::{executions::view, ExecutionView};
use crate::{ApiError, AppState};

/// Deliver the outcome of a suspended job. A job that is no longer pending,
/// or whose execution is not suspended, answers `409 Conflict`.
pub async fn resume(
    Path(job_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(outcome): Json<JobResult>,
) -> Result<Json<ExecutionView>, ApiError> {
    let execution = state.controller.resume(job_id, outcome).await?;
    Ok(Json(view(&state, execution.id).await?))
}
