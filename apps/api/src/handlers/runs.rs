use axum::Json;
use axum::extract::{Path, State};
use orbit_application::ExternalTaskInstance;
use orbit_domain::RunId;

use crate::dto::{RequestStopRequest, RunResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_run_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunResponse>> {
    let run = state.run_lifecycle.get_run(RunId::parse(&run_id)?).await?;
    Ok(Json(RunResponse::from(run)))
}

pub async fn request_stop_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(payload): Json<RequestStopRequest>,
) -> ApiResult<Json<RunResponse>> {
    let run = state
        .run_lifecycle
        .request_stop(
            RunId::parse(&run_id)?,
            payload.requested_by.as_str(),
            payload.reason,
        )
        .await?;

    Ok(Json(RunResponse::from(run)))
}

pub async fn complete_stop_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunResponse>> {
    let run = state
        .run_lifecycle
        .complete_stop(RunId::parse(&run_id)?)
        .await?;
    Ok(Json(RunResponse::from(run)))
}

pub async fn list_task_instances_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<Vec<ExternalTaskInstance>>> {
    let tasks = state
        .run_lifecycle
        .list_task_instances(RunId::parse(&run_id)?)
        .await?;
    Ok(Json(tasks))
}
