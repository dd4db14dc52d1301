use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use engine::ExecutionStatus;

use super::ExecutionView;
use crate::{ApiError, AppState};

/// Start an execution of a published workflow; the body is the trigger
/// payload. `202 Accepted` when the execution suspended, `200 OK` otherwise.
pub async fn execute(
    Path(workflow_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(context): Json<Value>,
) -> Result<(StatusCode, Json<ExecutionView>), ApiError> {
    let execution = state.controller.start_by_id(workflow_id, context).await?;
    let code = if execution.status == ExecutionStatus::Suspended {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    let view = view(&state, execution.id).await?;
    Ok((code, Json(view)))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionView>, ApiError> {
    Ok(Json(view(&state, id).await?))
}

pub async fn abort(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionView>, ApiError> {
    state.controller.abort(id).await?;
    Ok(Json(view(&state, id).await?))
}

pub(crate) async fn view(state: &AppState, id: Uuid) -> Result<ExecutionView, ApiError> {
    let (execution, jobs) = state.controller.inspect(id).await?;
    Ok(ExecutionView { execution, jobs })
}
