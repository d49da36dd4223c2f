use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use orbit_domain::ClusterId;

use crate::dto::{ClusterResponse, RegisterClusterRequest};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_clusters_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ClusterResponse>>> {
    let clusters = state
        .cluster_registry
        .list_clusters()
        .into_iter()
        .map(ClusterResponse::from)
        .collect();

    Ok(Json(clusters))
}

pub async fn register_cluster_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterClusterRequest>,
) -> ApiResult<(StatusCode, Json<ClusterResponse>)> {
    let cluster = state
        .cluster_registry
        .register_cluster(payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(ClusterResponse::from(cluster))))
}

pub async fn deactivate_cluster_handler(
    State(state): State<AppState>,
    Path(cluster_id): Path<String>,
) -> ApiResult<Json<ClusterResponse>> {
    let cluster = state
        .cluster_registry
        .deactivate_cluster(&ClusterId::new(cluster_id)?)
        .await?;

    Ok(Json(ClusterResponse::from(cluster)))
}
