use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use orbit_application::{CodeDefinition, DefinitionSyncSummary};

use crate::dto::{
    PauseWorkflowRequest, RegisterWorkflowRequest, RunResponse, SyncDefinitionsRequest,
    TriggerRunRequest, WorkflowResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_workflows_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<WorkflowResponse>>> {
    let workflows = state
        .workflow_registry
        .list_workflows()
        .await?
        .into_iter()
        .map(WorkflowResponse::from)
        .collect();

    Ok(Json(workflows))
}

pub async fn register_workflow_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterWorkflowRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowResponse>)> {
    let workflow = state
        .workflow_registry
        .register_workflow(payload.try_into()?)
        .await?;

    Ok((StatusCode::CREATED, Json(WorkflowResponse::from(workflow))))
}

pub async fn get_workflow_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> ApiResult<Json<WorkflowResponse>> {
    let workflow = state.workflow_registry.get_workflow(&dataset).await?;
    Ok(Json(WorkflowResponse::from(workflow)))
}

pub async fn pause_workflow_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    payload: Option<Json<PauseWorkflowRequest>>,
) -> ApiResult<Json<WorkflowResponse>> {
    let reason = payload.and_then(|Json(payload)| payload.reason);
    let workflow = state
        .workflow_registry
        .pause_workflow(&dataset, reason)
        .await?;

    Ok(Json(WorkflowResponse::from(workflow)))
}

pub async fn unpause_workflow_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> ApiResult<Json<WorkflowResponse>> {
    let workflow = state.workflow_registry.unpause_workflow(&dataset).await?;
    Ok(Json(WorkflowResponse::from(workflow)))
}

pub async fn disable_workflow_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> ApiResult<Json<WorkflowResponse>> {
    let workflow = state.workflow_registry.disable_workflow(&dataset).await?;
    Ok(Json(WorkflowResponse::from(workflow)))
}

pub async fn sync_definitions_handler(
    State(state): State<AppState>,
    payload: Option<Json<SyncDefinitionsRequest>>,
) -> ApiResult<Json<DefinitionSyncSummary>> {
    if let Some(Json(SyncDefinitionsRequest {
        definitions: Some(definitions),
        errors,
    })) = payload
    {
        state
            .definition_source
            .publish(
                definitions.into_iter().map(CodeDefinition::from).collect(),
                errors,
            )
            .await;
    }

    let summary = state.workflow_registry.sync_definitions().await?;
    Ok(Json(summary))
}

pub async fn trigger_run_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    Json(payload): Json<TriggerRunRequest>,
) -> ApiResult<(StatusCode, Json<RunResponse>)> {
    let run = state
        .run_lifecycle
        .trigger_run(&dataset, payload.try_into()?)
        .await?;

    Ok((StatusCode::CREATED, Json(RunResponse::from(run))))
}

pub async fn list_workflow_runs_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> ApiResult<Json<Vec<RunResponse>>> {
    let runs = state
        .run_lifecycle
        .list_runs(&dataset, 100)
        .await?
        .into_iter()
        .map(RunResponse::from)
        .collect();

    Ok(Json(runs))
}
