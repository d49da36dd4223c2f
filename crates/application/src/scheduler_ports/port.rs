use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbit_core::AppResult;
use orbit_domain::{BackfillId, Cluster, ClusterId, ExternalRunId};

use super::records::{
    BackfillRequest, ExternalBackfill, ExternalRunRecord, ExternalTaskInstance, ScheduleRequest,
    TriggerRunRequest, TriggeredRun,
};

/// Contract for talking to one orchestrator cluster.
///
/// Transport failures surface as `AppError::ClusterUnreachable`; missing
/// remote objects as `AppError::NotFound`.
#[async_trait]
pub trait ExternalSchedulerPort: Send + Sync {
    /// Returns the cluster this client talks to.
    fn cluster_id(&self) -> &ClusterId;

    /// Starts one run.
    async fn trigger_run(&self, request: TriggerRunRequest) -> AppResult<TriggeredRun>;

    /// Reads one run.
    async fn get_run(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<ExternalRunRecord>;

    /// Asks the orchestrator to stop one run.
    async fn stop_run(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<()>;

    /// Pauses or unpauses the workflow schedule.
    async fn set_paused(&self, workflow_external_id: &str, paused: bool) -> AppResult<()>;

    /// Registers or replaces the workflow schedule.
    async fn create_schedule(&self, request: ScheduleRequest) -> AppResult<()>;

    /// Removes the workflow schedule.
    async fn delete_schedule(&self, workflow_external_id: &str) -> AppResult<()>;

    /// Lists runs updated since `since`, newest first, at most `limit`.
    async fn list_recent_runs(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>>;

    /// Lists runs of one workflow, newest first, at most `limit`.
    async fn list_runs(
        &self,
        workflow_external_id: &str,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>>;

    /// Lists task instances of one run.
    async fn get_task_instances(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<Vec<ExternalTaskInstance>>;

    /// Creates one backfill.
    async fn create_backfill(&self, request: BackfillRequest) -> AppResult<ExternalBackfill>;

    /// Reads one backfill.
    async fn get_backfill_status(&self, backfill_id: &BackfillId) -> AppResult<ExternalBackfill>;

    /// Pauses one backfill.
    async fn pause_backfill(&self, backfill_id: &BackfillId) -> AppResult<()>;

    /// Unpauses one backfill.
    async fn unpause_backfill(&self, backfill_id: &BackfillId) -> AppResult<()>;

    /// Cancels one backfill.
    async fn cancel_backfill(&self, backfill_id: &BackfillId) -> AppResult<()>;

    /// Returns whether the orchestrator answers health probes.
    async fn is_available(&self) -> bool;
}

/// Builds scheduler clients for registered clusters.
pub trait SchedulerClientProvider: Send + Sync {
    /// Returns the client for one cluster.
    fn client_for(&self, cluster: &Cluster) -> AppResult<Arc<dyn ExternalSchedulerPort>>;
}
