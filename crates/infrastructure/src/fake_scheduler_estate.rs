//! Deterministic in-process orchestrator estate.
//!
//! Serves every `memory://` cluster from one shared state. Run progress only
//! happens through [`FakeSchedulerEstate::advance`], timestamps come from the
//! injected clock, and run outcomes are drawn from a seeded RNG, so a given
//! seed and call sequence always replays the same history.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use orbit_application::{
    ExternalRunRecord, ExternalSchedulerPort, ScheduleRequest, SchedulerClientProvider,
};
use orbit_core::{AppError, AppResult, Clock};
use orbit_domain::{
    BackfillId, Cluster, ClusterId, ExternalRunId, ExternalRunKey, ExternalRunObservation,
    RunId, RunStatus, map_external_state_lossy,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::debug;

mod port;

/// Behaviour knobs of the simulated estate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FakeSchedulerSettings {
    seed: u64,
    failure_rate: f64,
    latency: Option<Duration>,
}

impl FakeSchedulerSettings {
    /// Creates validated settings. `failure_rate` is the probability that a
    /// running run finishes as `failed`.
    pub fn new(seed: u64, failure_rate: f64, latency: Option<Duration>) -> AppResult<Self> {
        if !(0.0..=1.0).contains(&failure_rate) {
            return Err(AppError::Validation(format!(
                "simulated failure rate must be between 0 and 1, got {failure_rate}"
            )));
        }

        Ok(Self {
            seed,
            failure_rate,
            latency,
        })
    }
}

impl Default for FakeSchedulerSettings {
    fn default() -> Self {
        Self {
            seed: 7,
            failure_rate: 0.0,
            latency: None,
        }
    }
}

/// Changes made by one [`FakeSchedulerEstate::advance`] step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceSummary {
    /// Runs that moved to their next state.
    pub runs_progressed: usize,
    /// Backfills that completed.
    pub backfills_completed: usize,
}

#[derive(Debug, Clone)]
struct SimulatedRun {
    workflow_external_id: String,
    origin_run_id: Option<RunId>,
    raw_state: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl SimulatedRun {
    fn record(&self, key: &ExternalRunKey) -> ExternalRunRecord {
        ExternalRunRecord {
            workflow_external_id: self.workflow_external_id.clone(),
            observation: ExternalRunObservation {
                external_run_id: key.external_run_id.clone(),
                raw_state: self.raw_state.clone(),
                external_url: Some(run_url(key)),
                started_at: self.started_at,
                ended_at: self.ended_at,
            },
            origin_run_id: self.origin_run_id,
        }
    }
}

#[derive(Debug, Clone)]
struct SimulatedBackfill {
    cluster_id: ClusterId,
    raw_state: String,
    is_paused: bool,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct ClusterEstate {
    unreachable: bool,
    paused_workflows: HashSet<String>,
    schedules: HashMap<String, ScheduleRequest>,
}

struct EstateState {
    rng: StdRng,
    clusters: HashMap<ClusterId, ClusterEstate>,
    runs: BTreeMap<ExternalRunKey, SimulatedRun>,
    backfills: BTreeMap<BackfillId, SimulatedBackfill>,
    next_sequence: u64,
}

impl EstateState {
    fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn cluster(&mut self, cluster_id: &ClusterId) -> &mut ClusterEstate {
        self.clusters.entry(cluster_id.clone()).or_default()
    }

    fn is_reachable(&self, cluster_id: &ClusterId) -> bool {
        self.clusters
            .get(cluster_id)
            .is_none_or(|cluster| !cluster.unreachable)
    }
}

struct EstateInner {
    clock: Arc<dyn Clock>,
    settings: FakeSchedulerSettings,
    state: Mutex<EstateState>,
}

/// Shared simulated orchestrator estate. Cloning shares the same state.
#[derive(Clone)]
pub struct FakeSchedulerEstate {
    inner: Arc<EstateInner>,
}

impl FakeSchedulerEstate {
    /// Creates an empty estate.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, settings: FakeSchedulerSettings) -> Self {
        Self {
            inner: Arc::new(EstateInner {
                clock,
                settings,
                state: Mutex::new(EstateState {
                    rng: StdRng::seed_from_u64(settings.seed),
                    clusters: HashMap::new(),
                    runs: BTreeMap::new(),
                    backfills: BTreeMap::new(),
                    next_sequence: 0,
                }),
            }),
        }
    }

    /// Returns the port serving one cluster.
    #[must_use]
    pub fn client(&self, cluster_id: ClusterId) -> FakeClusterScheduler {
        FakeClusterScheduler {
            cluster_id,
            estate: self.inner.clone(),
        }
    }

    /// Takes a cluster down or brings it back.
    pub async fn set_reachable(&self, cluster_id: &ClusterId, reachable: bool) {
        self.inner.state.lock().await.cluster(cluster_id).unreachable = !reachable;
    }

    /// Inserts or overwrites a run as if the orchestrator started it itself.
    pub async fn seed_run(
        &self,
        cluster_id: &ClusterId,
        workflow_external_id: &str,
        external_run_id: &str,
        raw_state: &str,
    ) -> AppResult<()> {
        let key = ExternalRunKey::new(cluster_id.clone(), ExternalRunId::new(external_run_id)?);
        let now = self.inner.clock.now();
        let status = map_external_state_lossy(raw_state);

        self.inner.state.lock().await.runs.insert(
            key,
            SimulatedRun {
                workflow_external_id: workflow_external_id.to_owned(),
                origin_run_id: None,
                raw_state: raw_state.to_owned(),
                started_at: (status != RunStatus::Pending).then_some(now),
                ended_at: status.is_terminal().then_some(now),
                updated_at: now,
            },
        );

        Ok(())
    }

    /// Overwrites the raw state of an existing run.
    pub async fn set_run_state(
        &self,
        cluster_id: &ClusterId,
        external_run_id: &ExternalRunId,
        raw_state: &str,
    ) -> AppResult<()> {
        let key = ExternalRunKey::new(cluster_id.clone(), external_run_id.clone());
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock().await;
        let run = state.runs.get_mut(&key).ok_or_else(|| {
            AppError::NotFound(format!(
                "simulated run '{external_run_id}' not found on cluster '{cluster_id}'"
            ))
        })?;

        run.raw_state = raw_state.to_owned();
        run.updated_at = now;
        if map_external_state_lossy(raw_state).is_terminal() {
            run.ended_at = Some(now);
        }

        Ok(())
    }

    /// Returns whether the workflow schedule is paused on a cluster.
    pub async fn is_paused(&self, cluster_id: &ClusterId, workflow_external_id: &str) -> bool {
        self.inner
            .state
            .lock()
            .await
            .clusters
            .get(cluster_id)
            .is_some_and(|cluster| cluster.paused_workflows.contains(workflow_external_id))
    }

    /// Returns the registered schedule of a workflow on a cluster.
    pub async fn schedule(
        &self,
        cluster_id: &ClusterId,
        workflow_external_id: &str,
    ) -> Option<ScheduleRequest> {
        self.inner
            .state
            .lock()
            .await
            .clusters
            .get(cluster_id)
            .and_then(|cluster| cluster.schedules.get(workflow_external_id).cloned())
    }

    /// Moves every open run of a reachable cluster one step forward and
    /// completes unpaused backfills.
    ///
    /// Queued runs start; running runs finish as `failed` with the configured
    /// probability, otherwise as `success`.
    pub async fn advance(&self) -> AdvanceSummary {
        let now = self.inner.clock.now();
        let failure_rate = self.inner.settings.failure_rate;
        let mut summary = AdvanceSummary::default();
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        for (key, run) in &mut state.runs {
            if !state
                .clusters
                .get(&key.cluster_id)
                .is_none_or(|cluster| !cluster.unreachable)
            {
                continue;
            }

            let next = match map_external_state_lossy(&run.raw_state) {
                RunStatus::Pending => {
                    run.started_at = Some(now);
                    "running"
                }
                RunStatus::Running => {
                    run.ended_at = Some(now);
                    if state.rng.r#gen::<f64>() < failure_rate {
                        "failed"
                    } else {
                        "success"
                    }
                }
                _ => continue,
            };

            run.raw_state = next.to_owned();
            run.updated_at = now;
            summary.runs_progressed += 1;
        }

        for backfill in state.backfills.values_mut() {
            let reachable = state
                .clusters
                .get(&backfill.cluster_id)
                .is_none_or(|cluster| !cluster.unreachable);
            if !reachable || backfill.is_paused || backfill.raw_state != "running" {
                continue;
            }

            backfill.raw_state = "success".to_owned();
            backfill.completed_at = Some(now);
            summary.backfills_completed += 1;
        }

        debug!(
            runs_progressed = summary.runs_progressed,
            backfills_completed = summary.backfills_completed,
            "simulated estate advanced"
        );

        summary
    }
}

impl SchedulerClientProvider for FakeSchedulerEstate {
    fn client_for(&self, cluster: &Cluster) -> AppResult<Arc<dyn ExternalSchedulerPort>> {
        if !cluster.endpoint().starts_with("memory://") {
            return Err(AppError::Validation(format!(
                "cluster '{}' is not served by the simulated estate",
                cluster.id()
            )));
        }

        Ok(Arc::new(self.client(cluster.id().clone())))
    }
}

/// Port for one cluster of a [`FakeSchedulerEstate`].
pub struct FakeClusterScheduler {
    cluster_id: ClusterId,
    estate: Arc<EstateInner>,
}

impl FakeClusterScheduler {
    /// Applies simulated latency, then locks the estate if the cluster is up.
    async fn enter(&self) -> AppResult<tokio::sync::MutexGuard<'_, EstateState>> {
        if let Some(latency) = self.estate.settings.latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.estate.state.lock().await;
        if !state.is_reachable(&self.cluster_id) {
            return Err(AppError::ClusterUnreachable {
                cluster_id: self.cluster_id.to_string(),
                reason: "simulated outage".to_owned(),
            });
        }

        Ok(state)
    }

    fn key(&self, external_run_id: &ExternalRunId) -> ExternalRunKey {
        ExternalRunKey::new(self.cluster_id.clone(), external_run_id.clone())
    }
}

fn run_url(key: &ExternalRunKey) -> String {
    format!("memory://{}/runs/{}", key.cluster_id, key.external_run_id)
}
