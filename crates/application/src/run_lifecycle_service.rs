use std::sync::Arc;

use chrono::{DateTime, Utc};
use orbit_core::{AppError, AppResult, Clock};
use orbit_domain::{DatasetName, NewRun, Run, RunCounters, RunId, RunType};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cluster_registry::ClusterRegistry;
use crate::repository_ports::{RunRepository, WorkflowRepository};
use crate::scheduler_ports::{
    ExternalSchedulerPort, ExternalTaskInstance, SchedulerClientProvider, TriggerRunRequest,
};

mod transitions;
mod trigger;

/// Attempts made for one compare-and-swap run write before giving up.
pub(crate) const MAX_RUN_WRITE_ATTEMPTS: usize = 3;

/// Trigger payload for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRunInput {
    /// Principal that triggered the run.
    pub triggered_by: String,
    /// Run configuration payload.
    pub parameters: Value,
    /// Optional logical date.
    pub logical_date: Option<DateTime<Utc>>,
    /// Run type, MANUAL for operator triggers.
    pub run_type: RunType,
}

/// Run lifecycle service for triggers and operator transitions.
#[derive(Clone)]
pub struct RunLifecycleService {
    runs: Arc<dyn RunRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    clusters: ClusterRegistry,
    schedulers: Arc<dyn SchedulerClientProvider>,
    clock: Arc<dyn Clock>,
}

impl RunLifecycleService {
    /// Creates a run lifecycle service.
    #[must_use]
    pub fn new(
        runs: Arc<dyn RunRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        clusters: ClusterRegistry,
        schedulers: Arc<dyn SchedulerClientProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runs,
            workflows,
            clusters,
            schedulers,
            clock,
        }
    }

    async fn load_run(&self, run_id: RunId) -> AppResult<Run> {
        self.runs
            .find_run(run_id)
            .await?
            .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))
    }

    fn scheduler_for_run(&self, run: &Run) -> AppResult<Arc<dyn ExternalSchedulerPort>> {
        let cluster = self.clusters.find_cluster(run.cluster_id())?;
        self.schedulers.client_for(&cluster)
    }
}

/// Applies one change to a run and writes it with compare-and-swap.
///
/// On a version conflict the run is re-read and `apply` runs again against
/// the current state, so a transition that became illegal in the meantime
/// fails with `InvalidTransition` instead of overwriting the winner.
pub(crate) async fn apply_with_retry<T, F>(
    runs: &dyn RunRepository,
    mut run: Run,
    mut apply: F,
) -> AppResult<(Run, T)>
where
    F: FnMut(&mut Run) -> AppResult<T> + Send,
    T: Send,
{
    let run_id = run.id();
    let mut attempt = 1;

    loop {
        let output = apply(&mut run)?;
        match runs.update_run(run).await {
            Ok(stored) => return Ok((stored, output)),
            Err(AppError::Conflict(message)) if attempt < MAX_RUN_WRITE_ATTEMPTS => {
                debug!(run_id = %run_id, attempt, conflict = %message, "retrying run write");
                attempt += 1;
                run = runs
                    .find_run(run_id)
                    .await?
                    .ok_or_else(|| AppError::RunNotFound(run_id.to_string()))?;
            }
            Err(error) => return Err(error),
        }
    }
}
