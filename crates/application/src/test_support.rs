//! Hand-written fakes shared by service tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use orbit_core::{AppError, AppResult, ManualClock};
use orbit_domain::{
    Backfill, BackfillId, Cluster, ClusterId, DatasetName, ExternalBackfillStatus, ExternalRunId,
    ExternalRunKey, ExternalRunObservation, Run, RunId, Workflow,
};

use crate::repository_ports::{
    BackfillRepository, ClusterRepository, RunRepository, WorkflowRepository,
};
use crate::scheduler_ports::{
    BackfillRequest, CodeDefinition, DefinitionListing, ExternalBackfill, ExternalRunRecord,
    ExternalSchedulerPort, ExternalTaskInstance, ScheduleRequest, SchedulerClientProvider,
    TriggerRunRequest, TriggeredRun, WorkflowDefinitionSource,
};

pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

pub(crate) fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(fixed_now()))
}

pub(crate) fn cluster(cluster_id: &str, team: &str) -> Cluster {
    Cluster::new(
        cluster_id,
        team,
        format!("memory://{cluster_id}"),
        true,
    )
    .unwrap_or_else(|_| unreachable!())
}

pub(crate) fn cluster_id(value: &str) -> ClusterId {
    ClusterId::new(value).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn dataset(value: &str) -> DatasetName {
    DatasetName::new(value).unwrap_or_else(|_| unreachable!())
}

#[derive(Default)]
pub(crate) struct FakeClusterRepository {
    clusters: Mutex<Vec<Cluster>>,
}

impl FakeClusterRepository {
    pub(crate) fn with_clusters(clusters: Vec<Cluster>) -> Self {
        Self {
            clusters: Mutex::new(clusters),
        }
    }
}

#[async_trait]
impl ClusterRepository for FakeClusterRepository {
    async fn save_cluster(&self, cluster: Cluster) -> AppResult<()> {
        let mut clusters = self.clusters.lock().await;
        match clusters
            .iter_mut()
            .find(|stored| stored.id() == cluster.id())
        {
            Some(stored) => *stored = cluster,
            None => clusters.push(cluster),
        }
        Ok(())
    }

    async fn list_clusters(&self) -> AppResult<Vec<Cluster>> {
        Ok(self.clusters.lock().await.clone())
    }

    async fn find_cluster(&self, cluster_id: &ClusterId) -> AppResult<Option<Cluster>> {
        Ok(self
            .clusters
            .lock()
            .await
            .iter()
            .find(|cluster| cluster.id() == cluster_id)
            .cloned())
    }
}

#[derive(Default)]
pub(crate) struct FakeWorkflowRepository {
    workflows: Mutex<HashMap<DatasetName, Workflow>>,
}

#[async_trait]
impl WorkflowRepository for FakeWorkflowRepository {
    async fn insert_workflow(&self, workflow: Workflow) -> AppResult<()> {
        let mut workflows = self.workflows.lock().await;
        if workflows.contains_key(workflow.dataset()) {
            return Err(AppError::Conflict(format!(
                "workflow '{}' already exists",
                workflow.dataset()
            )));
        }
        workflows.insert(workflow.dataset().clone(), workflow);
        Ok(())
    }

    async fn update_workflow(&self, workflow: Workflow) -> AppResult<()> {
        let mut workflows = self.workflows.lock().await;
        if !workflows.contains_key(workflow.dataset()) {
            return Err(AppError::NotFound(format!(
                "workflow '{}' not found",
                workflow.dataset()
            )));
        }
        workflows.insert(workflow.dataset().clone(), workflow);
        Ok(())
    }

    async fn find_workflow(&self, dataset: &DatasetName) -> AppResult<Option<Workflow>> {
        Ok(self.workflows.lock().await.get(dataset).cloned())
    }

    async fn find_workflow_by_external_id(
        &self,
        external_id: &str,
    ) -> AppResult<Option<Workflow>> {
        Ok(self
            .workflows
            .lock()
            .await
            .values()
            .find(|workflow| workflow.external_id() == external_id)
            .cloned())
    }

    async fn list_workflows(&self) -> AppResult<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> =
            self.workflows.lock().await.values().cloned().collect();
        workflows.sort_by(|left, right| left.dataset().cmp(right.dataset()));
        Ok(workflows)
    }
}

#[derive(Default)]
pub(crate) struct FakeRunRepository {
    runs: Mutex<HashMap<RunId, Run>>,
}

impl FakeRunRepository {
    pub(crate) async fn all_runs(&self) -> Vec<Run> {
        self.runs.lock().await.values().cloned().collect()
    }

    /// Overwrites a stored run without version checks.
    pub(crate) async fn force_put(&self, run: Run) {
        self.runs.lock().await.insert(run.id(), run);
    }
}

#[async_trait]
impl RunRepository for FakeRunRepository {
    async fn insert_run(&self, run: Run) -> AppResult<Run> {
        let mut runs = self.runs.lock().await;
        let key = run.external_key();
        if runs.contains_key(&run.id())
            || key.is_some() && runs.values().any(|stored| stored.external_key() == key)
        {
            return Err(AppError::Conflict(format!("run '{}' already exists", run.id())));
        }

        let stored = run.with_version(1);
        runs.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn update_run(&self, run: Run) -> AppResult<Run> {
        let mut runs = self.runs.lock().await;
        let Some(current) = runs.get(&run.id()) else {
            return Err(AppError::RunNotFound(run.id().to_string()));
        };
        if current.version() != run.version() {
            return Err(AppError::Conflict(format!(
                "run '{}' was modified concurrently",
                run.id()
            )));
        }

        let next_version = run.version() + 1;
        let stored = run.with_version(next_version);
        runs.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn find_run(&self, run_id: RunId) -> AppResult<Option<Run>> {
        Ok(self.runs.lock().await.get(&run_id).cloned())
    }

    async fn find_run_by_external_key(&self, key: &ExternalRunKey) -> AppResult<Option<Run>> {
        Ok(self
            .runs
            .lock()
            .await
            .values()
            .find(|run| run.external_key().as_ref() == Some(key))
            .cloned())
    }

    async fn list_runs_for_workflow(
        &self,
        workflow: &DatasetName,
        limit: usize,
    ) -> AppResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .lock()
            .await
            .values()
            .filter(|run| run.workflow() == workflow)
            .cloned()
            .collect();
        runs.sort_by_key(|run| std::cmp::Reverse(run.created_at()));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn list_stale_runs(
        &self,
        synced_before: DateTime<Utc>,
        clusters: &[ClusterId],
        limit: usize,
    ) -> AppResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .lock()
            .await
            .values()
            .filter(|run| run.is_stale(synced_before))
            .filter(|run| run.external_run_id().is_some() && clusters.contains(run.cluster_id()))
            .cloned()
            .collect();
        runs.sort_by_key(Run::last_synced_at);
        runs.truncate(limit);
        Ok(runs)
    }

    async fn count_runs_for_cluster(&self, cluster_id: &ClusterId) -> AppResult<u64> {
        Ok(self
            .runs
            .lock()
            .await
            .values()
            .filter(|run| run.cluster_id() == cluster_id)
            .count()
            .try_into()
            .unwrap_or(u64::MAX))
    }
}

#[derive(Default)]
pub(crate) struct FakeBackfillRepository {
    backfills: Mutex<HashMap<BackfillId, Backfill>>,
}

#[async_trait]
impl BackfillRepository for FakeBackfillRepository {
    async fn insert_backfill(&self, backfill: Backfill) -> AppResult<()> {
        let mut backfills = self.backfills.lock().await;
        if backfills.contains_key(backfill.id()) {
            return Err(AppError::Conflict(format!(
                "backfill '{}' already exists",
                backfill.id()
            )));
        }
        backfills.insert(backfill.id().clone(), backfill);
        Ok(())
    }

    async fn update_backfill(&self, backfill: Backfill) -> AppResult<Backfill> {
        let mut backfills = self.backfills.lock().await;
        let Some(current) = backfills.get(backfill.id()) else {
            return Err(AppError::BackfillNotFound(backfill.id().to_string()));
        };
        if current.version() != backfill.version() {
            return Err(AppError::Conflict(format!(
                "backfill '{}' was modified concurrently",
                backfill.id()
            )));
        }

        let next_version = backfill.version() + 1;
        let stored = backfill.with_version(next_version);
        backfills.insert(stored.id().clone(), stored.clone());
        Ok(stored)
    }

    async fn find_backfill(&self, backfill_id: &BackfillId) -> AppResult<Option<Backfill>> {
        Ok(self.backfills.lock().await.get(backfill_id).cloned())
    }

    async fn list_active_backfills(
        &self,
        workflow: Option<&DatasetName>,
    ) -> AppResult<Vec<Backfill>> {
        Ok(self
            .backfills
            .lock()
            .await
            .values()
            .filter(|backfill| !backfill.state().is_terminal())
            .filter(|backfill| workflow.is_none_or(|workflow| backfill.workflow() == workflow))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeSchedulerState {
    unreachable: bool,
    delay: Option<StdDuration>,
    runs: Vec<ExternalRunRecord>,
    backfills: HashMap<BackfillId, ExternalBackfill>,
    stopped: Vec<ExternalRunId>,
    paused: HashMap<String, bool>,
    schedules: HashMap<String, ScheduleRequest>,
    next_id: u32,
}

pub(crate) struct FakeScheduler {
    cluster_id: ClusterId,
    state: Mutex<FakeSchedulerState>,
}

impl FakeScheduler {
    pub(crate) fn new(cluster_id: &str) -> Self {
        Self {
            cluster_id: self::cluster_id(cluster_id),
            state: Mutex::new(FakeSchedulerState::default()),
        }
    }

    pub(crate) async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    pub(crate) async fn set_delay(&self, delay: StdDuration) {
        self.state.lock().await.delay = Some(delay);
    }

    pub(crate) async fn put_run(
        &self,
        workflow_external_id: &str,
        external_run_id: &str,
        raw_state: &str,
    ) {
        self.put_run_for(workflow_external_id, external_run_id, raw_state, None)
            .await;
    }

    /// Lists a run as if it had been triggered for `origin_run_id`.
    pub(crate) async fn put_run_for(
        &self,
        workflow_external_id: &str,
        external_run_id: &str,
        raw_state: &str,
        origin_run_id: Option<RunId>,
    ) {
        let record = ExternalRunRecord {
            workflow_external_id: workflow_external_id.to_owned(),
            observation: ExternalRunObservation {
                external_run_id: ExternalRunId::new(external_run_id)
                    .unwrap_or_else(|_| unreachable!()),
                raw_state: raw_state.to_owned(),
                external_url: Some(format!("memory://{}/{external_run_id}", self.cluster_id)),
                started_at: None,
                ended_at: None,
            },
            origin_run_id,
        };

        let mut state = self.state.lock().await;
        match state.runs.iter_mut().find(|stored| {
            stored.observation.external_run_id == record.observation.external_run_id
        }) {
            Some(stored) => *stored = record,
            None => state.runs.push(record),
        }
    }

    pub(crate) async fn set_backfill_state(
        &self,
        backfill_id: &BackfillId,
        raw_state: &str,
        completed_at: Option<DateTime<Utc>>,
    ) {
        if let Some(backfill) = self.state.lock().await.backfills.get_mut(backfill_id) {
            backfill.status.raw_state = raw_state.to_owned();
            backfill.status.completed_at = completed_at;
        }
    }

    pub(crate) async fn stopped_runs(&self) -> Vec<ExternalRunId> {
        self.state.lock().await.stopped.clone()
    }

    pub(crate) async fn paused_flag(&self, workflow_external_id: &str) -> Option<bool> {
        self.state
            .lock()
            .await
            .paused
            .get(workflow_external_id)
            .copied()
    }

    pub(crate) async fn has_schedule(&self, workflow_external_id: &str) -> bool {
        self.state
            .lock()
            .await
            .schedules
            .contains_key(workflow_external_id)
    }

    async fn reachable(&self) -> AppResult<()> {
        let delay = {
            let state = self.state.lock().await;
            if state.unreachable {
                return Err(AppError::ClusterUnreachable {
                    cluster_id: self.cluster_id.to_string(),
                    reason: "connection refused".to_owned(),
                });
            }
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalSchedulerPort for FakeScheduler {
    fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    async fn trigger_run(&self, request: TriggerRunRequest) -> AppResult<TriggeredRun> {
        self.reachable().await?;
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let external_run_id = ExternalRunId::new(format!("manual__{}", state.next_id))?;
        state.runs.push(ExternalRunRecord {
            workflow_external_id: request.workflow_external_id,
            observation: ExternalRunObservation {
                external_run_id: external_run_id.clone(),
                raw_state: "queued".to_owned(),
                external_url: None,
                started_at: None,
                ended_at: None,
            },
            origin_run_id: Some(request.run_id),
        });

        Ok(TriggeredRun {
            external_run_id,
            raw_state: "queued".to_owned(),
            external_url: None,
        })
    }

    async fn get_run(
        &self,
        _workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<ExternalRunRecord> {
        self.reachable().await?;
        self.state
            .lock()
            .await
            .runs
            .iter()
            .find(|record| &record.observation.external_run_id == external_run_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("external run '{external_run_id}'")))
    }

    async fn stop_run(
        &self,
        _workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<()> {
        self.reachable().await?;
        self.state
            .lock()
            .await
            .stopped
            .push(external_run_id.clone());
        Ok(())
    }

    async fn set_paused(&self, workflow_external_id: &str, paused: bool) -> AppResult<()> {
        self.reachable().await?;
        self.state
            .lock()
            .await
            .paused
            .insert(workflow_external_id.to_owned(), paused);
        Ok(())
    }

    async fn create_schedule(&self, request: ScheduleRequest) -> AppResult<()> {
        self.reachable().await?;
        self.state
            .lock()
            .await
            .schedules
            .insert(request.workflow_external_id.clone(), request);
        Ok(())
    }

    async fn delete_schedule(&self, workflow_external_id: &str) -> AppResult<()> {
        self.reachable().await?;
        self.state
            .lock()
            .await
            .schedules
            .remove(workflow_external_id);
        Ok(())
    }

    async fn list_recent_runs(
        &self,
        _since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>> {
        self.reachable().await?;
        Ok(self
            .state
            .lock()
            .await
            .runs
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_runs(
        &self,
        workflow_external_id: &str,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>> {
        self.reachable().await?;
        Ok(self
            .state
            .lock()
            .await
            .runs
            .iter()
            .filter(|record| record.workflow_external_id == workflow_external_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_task_instances(
        &self,
        _workflow_external_id: &str,
        _external_run_id: &ExternalRunId,
    ) -> AppResult<Vec<ExternalTaskInstance>> {
        self.reachable().await?;
        Ok(vec![ExternalTaskInstance {
            task_id: "extract".to_owned(),
            state: Some("success".to_owned()),
            try_number: 1,
            started_at: None,
            ended_at: None,
            duration_seconds: Some(1.5),
        }])
    }

    async fn create_backfill(&self, _request: BackfillRequest) -> AppResult<ExternalBackfill> {
        self.reachable().await?;
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let backfill = ExternalBackfill {
            backfill_id: BackfillId::new(format!("bf-{}", state.next_id))?,
            status: ExternalBackfillStatus {
                raw_state: "running".to_owned(),
                is_paused: Some(false),
                completed_at: None,
            },
        };
        state
            .backfills
            .insert(backfill.backfill_id.clone(), backfill.clone());
        Ok(backfill)
    }

    async fn get_backfill_status(&self, backfill_id: &BackfillId) -> AppResult<ExternalBackfill> {
        self.reachable().await?;
        self.state
            .lock()
            .await
            .backfills
            .get(backfill_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("external backfill '{backfill_id}'")))
    }

    async fn pause_backfill(&self, backfill_id: &BackfillId) -> AppResult<()> {
        self.set_backfill_paused(backfill_id, true).await
    }

    async fn unpause_backfill(&self, backfill_id: &BackfillId) -> AppResult<()> {
        self.set_backfill_paused(backfill_id, false).await
    }

    async fn cancel_backfill(&self, backfill_id: &BackfillId) -> AppResult<()> {
        self.reachable().await?;
        if let Some(backfill) = self.state.lock().await.backfills.get_mut(backfill_id) {
            backfill.status.completed_at = Some(fixed_now());
        }
        Ok(())
    }

    async fn is_available(&self) -> bool {
        !self.state.lock().await.unreachable
    }
}

impl FakeScheduler {
    async fn set_backfill_paused(&self, backfill_id: &BackfillId, paused: bool) -> AppResult<()> {
        self.reachable().await?;
        if let Some(backfill) = self.state.lock().await.backfills.get_mut(backfill_id) {
            backfill.status.is_paused = Some(paused);
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeSchedulerProvider {
    clients: HashMap<ClusterId, Arc<FakeScheduler>>,
}

impl FakeSchedulerProvider {
    pub(crate) fn with(mut self, scheduler: Arc<FakeScheduler>) -> Self {
        self.clients
            .insert(scheduler.cluster_id.clone(), scheduler);
        self
    }
}

impl SchedulerClientProvider for FakeSchedulerProvider {
    fn client_for(&self, cluster: &Cluster) -> AppResult<Arc<dyn ExternalSchedulerPort>> {
        self.clients
            .get(cluster.id())
            .cloned()
            .map(|client| client as Arc<dyn ExternalSchedulerPort>)
            .ok_or_else(|| AppError::Internal(format!("no client for cluster '{}'", cluster.id())))
    }
}

#[derive(Default)]
pub(crate) struct FakeDefinitionSource {
    listing: Mutex<DefinitionListing>,
}

impl FakeDefinitionSource {
    pub(crate) async fn set(&self, definitions: Vec<CodeDefinition>, errors: Vec<String>) {
        *self.listing.lock().await = DefinitionListing {
            definitions,
            errors,
        };
    }
}

#[async_trait]
impl WorkflowDefinitionSource for FakeDefinitionSource {
    async fn list_definitions(&self) -> AppResult<DefinitionListing> {
        Ok(self.listing.lock().await.clone())
    }
}
