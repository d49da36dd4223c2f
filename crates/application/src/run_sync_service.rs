use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use orbit_core::{AppError, AppResult, Clock};
use orbit_domain::{
    Cluster, ClusterId, DatasetName, ExternalRunKey, ExternalRunObservation, Run,
    map_external_state,
};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cluster_registry::ClusterRegistry;
use crate::repository_ports::{RunRepository, WorkflowRepository};
use crate::run_lifecycle_service::apply_with_retry;
use crate::scheduler_ports::{ExternalRunRecord, SchedulerClientProvider};

mod aggregate;
mod cluster;
mod stale;

/// Synchronization pass settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    lookback: Duration,
    batch_size: usize,
    cluster_timeout: StdDuration,
    stale_batch_size: usize,
}

impl SyncSettings {
    /// Creates validated settings.
    pub fn new(
        lookback: Duration,
        batch_size: usize,
        cluster_timeout: StdDuration,
        stale_batch_size: usize,
    ) -> AppResult<Self> {
        if lookback <= Duration::zero() {
            return Err(AppError::Validation(
                "sync lookback window must be positive".to_owned(),
            ));
        }

        if batch_size == 0 || stale_batch_size == 0 {
            return Err(AppError::Validation(
                "sync batch sizes must be greater than zero".to_owned(),
            ));
        }

        if cluster_timeout.is_zero() {
            return Err(AppError::Validation(
                "sync cluster timeout must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            lookback,
            batch_size,
            cluster_timeout,
            stale_batch_size,
        })
    }

    /// Returns the default lookback window.
    #[must_use]
    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Returns the default per-cluster batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the per-cluster timeout.
    #[must_use]
    pub fn cluster_timeout(&self) -> StdDuration {
        self.cluster_timeout
    }

    /// Returns the maximum number of stale runs repaired per pass.
    #[must_use]
    pub fn stale_batch_size(&self) -> usize {
        self.stale_batch_size
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            lookback: Duration::minutes(60),
            batch_size: 100,
            cluster_timeout: StdDuration::from_secs(30),
            stale_batch_size: 500,
        }
    }
}

/// Outcome of synchronizing one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterSyncResult {
    /// Cluster identifier.
    pub cluster_id: String,
    /// Local runs whose state changed.
    pub updated: usize,
    /// Local runs created on first sight.
    pub created: usize,
    /// External runs ignored because no workflow or external run is known.
    pub skipped: usize,
    /// Runs whose synchronization failed.
    pub failed_runs: usize,
    /// Cluster-level failure, when the cluster could not be synchronized.
    pub error: Option<String>,
}

impl ClusterSyncResult {
    fn new(cluster_id: &ClusterId) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            ..Self::default()
        }
    }

    fn failed(cluster_id: &ClusterId, error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(cluster_id)
        }
    }

    /// Returns whether the whole cluster failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Merged outcome of one pass over every active cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateSyncResult {
    /// Clusters attempted.
    pub total_clusters: usize,
    /// Runs updated across clusters.
    pub total_updated: usize,
    /// Runs created across clusters.
    pub total_created: usize,
    /// Clusters that failed.
    pub failed_clusters: usize,
    /// Per-cluster results in registry order.
    pub clusters: Vec<ClusterSyncResult>,
}

impl AggregateSyncResult {
    fn from_results(clusters: Vec<ClusterSyncResult>) -> Self {
        Self {
            total_clusters: clusters.len(),
            total_updated: clusters.iter().map(|result| result.updated).sum(),
            total_created: clusters.iter().map(|result| result.created).sum(),
            failed_clusters: clusters.iter().filter(|result| result.is_failure()).count(),
            clusters,
        }
    }
}

/// Outcome of one stale-run repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StaleSyncResult {
    /// Stale runs selected.
    pub stale_runs: usize,
    /// Clusters owning stale runs.
    pub total_clusters: usize,
    /// Runs whose state changed.
    pub total_updated: usize,
    /// Clusters that failed.
    pub failed_clusters: usize,
    /// Per-cluster results in cluster id order.
    pub clusters: Vec<ClusterSyncResult>,
}

enum RecordOutcome {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

/// Reconciles local runs with orchestrator state across clusters.
#[derive(Clone)]
pub struct RunSyncService {
    runs: Arc<dyn RunRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    clusters: ClusterRegistry,
    schedulers: Arc<dyn SchedulerClientProvider>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl RunSyncService {
    /// Creates a synchronization service.
    #[must_use]
    pub fn new(
        runs: Arc<dyn RunRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        clusters: ClusterRegistry,
        schedulers: Arc<dyn SchedulerClientProvider>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            runs,
            workflows,
            clusters,
            schedulers,
            clock,
            settings,
        }
    }

    /// Returns the configured settings.
    #[must_use]
    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Merges one observation into a stored run with compare-and-swap.
    async fn apply_observation(
        &self,
        run: Run,
        observation: &ExternalRunObservation,
        now: DateTime<Utc>,
    ) -> AppResult<RecordOutcome> {
        let run_id = run.id();
        let (_, outcome) = apply_with_retry(self.runs.as_ref(), run, |run| {
            run.sync_from_external(observation, now)
        })
        .await?;

        if outcome.unmapped_state {
            warn!(
                run_id = %run_id,
                raw_state = observation.raw_state.as_str(),
                "unmappable external state, run degraded to UNKNOWN"
            );
        }

        Ok(if outcome.changed {
            RecordOutcome::Updated
        } else {
            RecordOutcome::Unchanged
        })
    }
}

/// Orders results like `clusters` and fills in clusters whose task died.
fn in_cluster_order(
    clusters: &[Cluster],
    mut results: Vec<ClusterSyncResult>,
) -> Vec<ClusterSyncResult> {
    clusters
        .iter()
        .map(|cluster| {
            match results
                .iter()
                .position(|result| result.cluster_id == cluster.id().as_str())
            {
                Some(index) => results.swap_remove(index),
                None => ClusterSyncResult::failed(cluster.id(), "sync task aborted"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests;
