use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbit_core::AppResult;
use orbit_domain::{
    Backfill, BackfillId, Cluster, ClusterId, DatasetName, ExternalRunKey, Run, RunId, Workflow,
};

/// Repository port for workflow definitions.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Inserts one workflow. Fails with `Conflict` when the dataset exists.
    async fn insert_workflow(&self, workflow: Workflow) -> AppResult<()>;

    /// Replaces one existing workflow.
    async fn update_workflow(&self, workflow: Workflow) -> AppResult<()>;

    /// Returns one workflow by dataset name.
    async fn find_workflow(&self, dataset: &DatasetName) -> AppResult<Option<Workflow>>;

    /// Returns one workflow by orchestrator identifier.
    async fn find_workflow_by_external_id(&self, external_id: &str)
    -> AppResult<Option<Workflow>>;

    /// Lists every workflow ordered by dataset name.
    async fn list_workflows(&self) -> AppResult<Vec<Workflow>>;
}

/// Repository port for runs.
///
/// Writes are compare-and-swap on the run version: `insert_run` stores
/// version 1, `update_run` succeeds only when the stored version equals
/// `run.version()` and returns the run stamped with the next version.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Inserts one run. Fails with `Conflict` when the id or external key exists.
    async fn insert_run(&self, run: Run) -> AppResult<Run>;

    /// Updates one run. Fails with `Conflict` on a version mismatch.
    async fn update_run(&self, run: Run) -> AppResult<Run>;

    /// Returns one run by id.
    async fn find_run(&self, run_id: RunId) -> AppResult<Option<Run>>;

    /// Returns one run by cluster and external run identifier.
    async fn find_run_by_external_key(&self, key: &ExternalRunKey) -> AppResult<Option<Run>>;

    /// Lists runs of one workflow, newest first.
    async fn list_runs_for_workflow(
        &self,
        workflow: &DatasetName,
        limit: usize,
    ) -> AppResult<Vec<Run>>;

    /// Lists non-terminal runs on `clusters` that carry an external run id and
    /// were never synced or last synced before `synced_before`.
    async fn list_stale_runs(
        &self,
        synced_before: DateTime<Utc>,
        clusters: &[ClusterId],
        limit: usize,
    ) -> AppResult<Vec<Run>>;

    /// Counts runs owned by one cluster.
    async fn count_runs_for_cluster(&self, cluster_id: &ClusterId) -> AppResult<u64>;
}

/// Repository port for orchestrator clusters.
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// Inserts or replaces one cluster, keeping its registry position.
    async fn save_cluster(&self, cluster: Cluster) -> AppResult<()>;

    /// Lists clusters in registry order.
    async fn list_clusters(&self) -> AppResult<Vec<Cluster>>;

    /// Returns one cluster by id.
    async fn find_cluster(&self, cluster_id: &ClusterId) -> AppResult<Option<Cluster>>;
}

/// Repository port for backfills.
#[async_trait]
pub trait BackfillRepository: Send + Sync {
    /// Inserts one backfill. Fails with `Conflict` when the id exists.
    async fn insert_backfill(&self, backfill: Backfill) -> AppResult<()>;

    /// Replaces one existing backfill. Fails with `Conflict` on a version
    /// mismatch.
    async fn update_backfill(&self, backfill: Backfill) -> AppResult<Backfill>;

    /// Returns one backfill by id.
    async fn find_backfill(&self, backfill_id: &BackfillId) -> AppResult<Option<Backfill>>;

    /// Lists QUEUED or RUNNING backfills, optionally for one workflow.
    async fn list_active_backfills(
        &self,
        workflow: Option<&DatasetName>,
    ) -> AppResult<Vec<Backfill>>;
}
