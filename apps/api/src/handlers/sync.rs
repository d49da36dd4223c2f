use axum::Json;
use axum::extract::{Path, State};
use chrono::Duration;
use orbit_application::{AggregateSyncResult, ClusterSyncResult, StaleSyncResult};
use orbit_domain::ClusterId;

use crate::dto::StaleSyncRequest;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn sync_all_clusters_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<AggregateSyncResult>> {
    Ok(Json(state.run_sync.sync_all_clusters().await))
}

pub async fn sync_cluster_handler(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> ApiResult<Json<ClusterSyncResult>> {
    let result = state
        .run_sync
        .sync_cluster(&ClusterId::new(cluster_id)?)
        .await?;
    Ok(Json(result))
}

pub async fn sync_stale_runs_handler(
    State(state): State<AppState>,
    payload: Option<Json<StaleSyncRequest>>,
) -> ApiResult<Json<StaleSyncResult>> {
    let threshold = payload
        .and_then(|Json(payload)| payload.threshold_minutes)
        .map_or(state.stale_threshold, Duration::minutes);
    let result = state.run_sync.sync_stale_runs(threshold).await?;
    Ok(Json(result))
}
