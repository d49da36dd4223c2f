mod backfills;
mod clusters;
mod runs;
mod workflows;

use serde::Serialize;

pub use backfills::{BackfillResponse, CreateBackfillRequest, ListBackfillsQuery};
pub use clusters::{ClusterResponse, RegisterClusterRequest};
pub use runs::{RequestStopRequest, RunResponse, TriggerRunRequest};
pub use workflows::{
    PauseWorkflowRequest, RegisterWorkflowRequest, SyncDefinitionsRequest, WorkflowResponse,
};

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
    pub active_clusters: usize,
}

/// Optional body of a stale-run repair request.
#[derive(Debug, Default, serde::Deserialize)]
pub struct StaleSyncRequest {
    pub threshold_minutes: Option<i64>,
}
