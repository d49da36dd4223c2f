use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use orbit_application::BackfillRefreshSummary;

use crate::dto::{BackfillResponse, CreateBackfillRequest, ListBackfillsQuery};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_backfill_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateBackfillRequest>,
) -> ApiResult<(StatusCode, Json<BackfillResponse>)> {
    let backfill = state.backfill_service.create_backfill(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(BackfillResponse::from(backfill))))
}

pub async fn list_backfills_handler(
    State(state): State<AppState>,
    Query(query): Query<ListBackfillsQuery>,
) -> ApiResult<Json<Vec<BackfillResponse>>> {
    let backfills = state
        .backfill_service
        .list_active_backfills(query.dataset.as_deref())
        .await?
        .into_iter()
        .map(BackfillResponse::from)
        .collect();

    Ok(Json(backfills))
}

pub async fn get_backfill_handler(
    State(state): State<AppState>,
    Path(backfill_id): Path<String>,
) -> ApiResult<Json<BackfillResponse>> {
    let backfill = state.backfill_service.get_status(&backfill_id).await?;
    Ok(Json(BackfillResponse::from(backfill)))
}

pub async fn pause_backfill_handler(
    State(state): State<AppState>,
    Path(backfill_id): Path<String>,
) -> ApiResult<Json<BackfillResponse>> {
    let backfill = state.backfill_service.pause_backfill(&backfill_id).await?;
    Ok(Json(BackfillResponse::from(backfill)))
}

pub async fn unpause_backfill_handler(
    State(state): State<AppState>,
    Path(backfill_id): Path<String>,
) -> ApiResult<Json<BackfillResponse>> {
    let backfill = state.backfill_service.unpause_backfill(&backfill_id).await?;
    Ok(Json(BackfillResponse::from(backfill)))
}

pub async fn cancel_backfill_handler(
    State(state): State<AppState>,
    Path(backfill_id): Path<String>,
) -> ApiResult<Json<BackfillResponse>> {
    let backfill = state.backfill_service.cancel_backfill(&backfill_id).await?;
    Ok(Json(BackfillResponse::from(backfill)))
}

pub async fn refresh_backfills_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<BackfillRefreshSummary>> {
    Ok(Json(state.backfill_service.refresh_active_backfills().await?))
}
