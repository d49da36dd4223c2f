use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(app_state: AppState) -> Router {
    let sync_routes = Router::new()
        .route("/api/sync", post(handlers::sync::sync_all_clusters_handler))
        .route(
            "/api/sync/clusters/{cluster_id}",
            post(handlers::sync::sync_cluster_handler),
        )
        .route("/api/sync/stale", post(handlers::sync::sync_stale_runs_handler));

    let cluster_routes = Router::new()
        .route(
            "/api/clusters",
            get(handlers::clusters::list_clusters_handler)
                .post(handlers::clusters::register_cluster_handler),
        )
        .route(
            "/api/clusters/{cluster_id}/deactivate",
            post(handlers::clusters::deactivate_cluster_handler),
        );

    let workflow_routes = Router::new()
        .route(
            "/api/workflows",
            get(handlers::workflows::list_workflows_handler)
                .post(handlers::workflows::register_workflow_handler),
        )
        .route(
            "/api/workflows/definitions/sync",
            post(handlers::workflows::sync_definitions_handler),
        )
        .route(
            "/api/workflows/{dataset}",
            get(handlers::workflows::get_workflow_handler),
        )
        .route(
            "/api/workflows/{dataset}/pause",
            post(handlers::workflows::pause_workflow_handler),
        )
        .route(
            "/api/workflows/{dataset}/unpause",
            post(handlers::workflows::unpause_workflow_handler),
        )
        .route(
            "/api/workflows/{dataset}/disable",
            post(handlers::workflows::disable_workflow_handler),
        )
        .route(
            "/api/workflows/{dataset}/runs",
            get(handlers::workflows::list_workflow_runs_handler)
                .post(handlers::workflows::trigger_run_handler),
        );

    let run_routes = Router::new()
        .route("/api/runs/{run_id}", get(handlers::runs::get_run_handler))
        .route(
            "/api/runs/{run_id}/stop",
            post(handlers::runs::request_stop_handler),
        )
        .route(
            "/api/runs/{run_id}/stop/complete",
            post(handlers::runs::complete_stop_handler),
        )
        .route(
            "/api/runs/{run_id}/tasks",
            get(handlers::runs::list_task_instances_handler),
        );

    let backfill_routes = Router::new()
        .route(
            "/api/backfills",
            get(handlers::backfills::list_backfills_handler)
                .post(handlers::backfills::create_backfill_handler),
        )
        .route(
            "/api/backfills/refresh",
            post(handlers::backfills::refresh_backfills_handler),
        )
        .route(
            "/api/backfills/{backfill_id}",
            get(handlers::backfills::get_backfill_handler),
        )
        .route(
            "/api/backfills/{backfill_id}/pause",
            post(handlers::backfills::pause_backfill_handler),
        )
        .route(
            "/api/backfills/{backfill_id}/unpause",
            post(handlers::backfills::unpause_backfill_handler),
        )
        .route(
            "/api/backfills/{backfill_id}/cancel",
            post(handlers::backfills::cancel_backfill_handler),
        );

    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(sync_routes)
        .merge(cluster_routes)
        .merge(workflow_routes)
        .merge(run_routes)
        .merge(backfill_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
