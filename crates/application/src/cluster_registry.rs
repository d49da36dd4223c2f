use std::sync::{Arc, PoisonError, RwLock};

use orbit_core::{AppError, AppResult};
use orbit_domain::{Cluster, ClusterId, team_from_identifier};
use tokio::sync::Mutex;
use tracing::info;

use crate::repository_ports::{ClusterRepository, RunRepository};

/// Immutable view of the registered clusters, in registry order.
///
/// Routing reads a snapshot and never blocks writers; administration builds
/// a new snapshot and swaps it in.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    clusters: Arc<[Cluster]>,
}

impl ClusterSnapshot {
    /// Creates a snapshot from clusters in registry order.
    #[must_use]
    pub fn new(clusters: Vec<Cluster>) -> Self {
        Self {
            clusters: clusters.into(),
        }
    }

    /// Returns every cluster, active or not.
    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Returns active clusters in registry order.
    #[must_use]
    pub fn list_active_clusters(&self) -> Vec<Cluster> {
        self.clusters
            .iter()
            .filter(|cluster| cluster.is_active())
            .cloned()
            .collect()
    }

    /// Returns one cluster by id, active or not.
    #[must_use]
    pub fn find(&self, cluster_id: &ClusterId) -> Option<&Cluster> {
        self.clusters
            .iter()
            .find(|cluster| cluster.id() == cluster_id)
    }

    /// Resolves the cluster for a team.
    ///
    /// An active cluster explicitly assigned to the team wins; otherwise the
    /// first active cluster in registry order is used.
    pub fn resolve_cluster_for_team(&self, team: &str) -> AppResult<Cluster> {
        let team = team.trim();
        self.clusters
            .iter()
            .find(|cluster| cluster.is_active() && cluster.team() == team)
            .or_else(|| self.first_active())
            .cloned()
            .ok_or_else(|| AppError::NoClusterAvailable {
                team: team.to_owned(),
            })
    }

    /// Resolves the cluster for a dataset name or orchestrator workflow id.
    pub fn resolve_cluster_for_workflow(&self, identifier: &str) -> AppResult<Cluster> {
        match team_from_identifier(identifier) {
            Some(team) => self.resolve_cluster_for_team(team),
            None => self
                .first_active()
                .cloned()
                .ok_or_else(|| AppError::NoClusterAvailable {
                    team: identifier.trim().to_owned(),
                }),
        }
    }

    fn first_active(&self) -> Option<&Cluster> {
        self.clusters.iter().find(|cluster| cluster.is_active())
    }
}

/// Input payload for cluster registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterClusterInput {
    /// Cluster identifier.
    pub cluster_id: String,
    /// Team routed to the cluster.
    pub team: String,
    /// Orchestrator endpoint.
    pub endpoint: String,
}

/// Cluster registry with snapshot-based routing and administration.
///
/// The current snapshot sits behind a pointer swap: readers clone an `Arc`
/// under a lock that is never held across an await, and refreshes are
/// serialized so an older listing cannot replace a newer one.
#[derive(Clone)]
pub struct ClusterRegistry {
    repository: Arc<dyn ClusterRepository>,
    run_repository: Arc<dyn RunRepository>,
    current: Arc<RwLock<Arc<ClusterSnapshot>>>,
    refresh_gate: Arc<Mutex<()>>,
}

impl ClusterRegistry {
    /// Creates a registry and loads the initial snapshot.
    pub async fn load(
        repository: Arc<dyn ClusterRepository>,
        run_repository: Arc<dyn RunRepository>,
    ) -> AppResult<Self> {
        let clusters = repository.list_clusters().await?;
        Ok(Self {
            repository,
            run_repository,
            current: Arc::new(RwLock::new(Arc::new(ClusterSnapshot::new(clusters)))),
            refresh_gate: Arc::new(Mutex::new(())),
        })
    }

    /// Returns the current snapshot. Later refreshes never change it.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ClusterSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reloads the snapshot from the repository and swaps it in.
    pub async fn refresh(&self) -> AppResult<Arc<ClusterSnapshot>> {
        let _gate = self.refresh_gate.lock().await;
        let snapshot = Arc::new(ClusterSnapshot::new(self.repository.list_clusters().await?));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        Ok(snapshot)
    }

    /// Resolves the cluster for a team.
    pub fn resolve_cluster_for_team(&self, team: &str) -> AppResult<Cluster> {
        self.snapshot().resolve_cluster_for_team(team)
    }

    /// Resolves the cluster for a dataset name or orchestrator workflow id.
    pub fn resolve_cluster_for_workflow(&self, identifier: &str) -> AppResult<Cluster> {
        self.snapshot().resolve_cluster_for_workflow(identifier)
    }

    /// Lists active clusters in registry order.
    #[must_use]
    pub fn list_active_clusters(&self) -> Vec<Cluster> {
        self.snapshot().list_active_clusters()
    }

    /// Lists all clusters in registry order.
    #[must_use]
    pub fn list_clusters(&self) -> Vec<Cluster> {
        self.snapshot().clusters().to_vec()
    }

    /// Returns one cluster by id, active or not.
    pub fn find_cluster(&self, cluster_id: &ClusterId) -> AppResult<Cluster> {
        self.snapshot()
            .find(cluster_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("cluster '{cluster_id}' not found")))
    }

    /// Registers one new active cluster.
    pub async fn register_cluster(&self, input: RegisterClusterInput) -> AppResult<Cluster> {
        let cluster = Cluster::new(input.cluster_id, input.team, input.endpoint, true)?;
        if self.repository.find_cluster(cluster.id()).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "cluster '{}' is already registered",
                cluster.id()
            )));
        }

        self.repository.save_cluster(cluster.clone()).await?;
        self.refresh().await?;

        info!(
            cluster_id = %cluster.id(),
            team = cluster.team(),
            "cluster registered"
        );
        Ok(cluster)
    }

    /// Removes one cluster from routing and synchronization.
    pub async fn deactivate_cluster(&self, cluster_id: &ClusterId) -> AppResult<Cluster> {
        let mut cluster = self.load_cluster(cluster_id).await?;
        cluster.deactivate();
        self.repository.save_cluster(cluster.clone()).await?;
        self.refresh().await?;

        info!(cluster_id = %cluster_id, "cluster deactivated");
        Ok(cluster)
    }

    /// Puts one cluster back into routing and synchronization.
    pub async fn activate_cluster(&self, cluster_id: &ClusterId) -> AppResult<Cluster> {
        let mut cluster = self.load_cluster(cluster_id).await?;
        cluster.activate();
        self.repository.save_cluster(cluster.clone()).await?;
        self.refresh().await?;

        info!(cluster_id = %cluster_id, "cluster activated");
        Ok(cluster)
    }

    /// Assigns one cluster to another team.
    ///
    /// Refused while any run still references the cluster.
    pub async fn reassign_cluster_team(
        &self,
        cluster_id: &ClusterId,
        team: &str,
    ) -> AppResult<Cluster> {
        let mut cluster = self.load_cluster(cluster_id).await?;
        if cluster.team() == team.trim() {
            return Ok(cluster);
        }

        let referencing_runs = self.run_repository.count_runs_for_cluster(cluster_id).await?;
        if referencing_runs > 0 {
            return Err(AppError::Conflict(format!(
                "cluster '{cluster_id}' is still referenced by {referencing_runs} run(s)"
            )));
        }

        cluster.reassign_team(team.trim())?;
        self.repository.save_cluster(cluster.clone()).await?;
        self.refresh().await?;

        info!(cluster_id = %cluster_id, team = cluster.team(), "cluster reassigned");
        Ok(cluster)
    }

    async fn load_cluster(&self, cluster_id: &ClusterId) -> AppResult<Cluster> {
        self.repository
            .find_cluster(cluster_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cluster '{cluster_id}' not found")))
    }
}
