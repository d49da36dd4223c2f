use async_trait::async_trait;
use orbit_application::ClusterRepository;
use orbit_core::AppResult;
use orbit_domain::{Cluster, ClusterId};
use tokio::sync::RwLock;

/// In-memory cluster repository keeping registration order.
#[derive(Debug, Default)]
pub struct InMemoryClusterRepository {
    clusters: RwLock<Vec<Cluster>>,
}

impl InMemoryClusterRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository seeded with clusters in the given order.
    #[must_use]
    pub fn with_clusters(clusters: Vec<Cluster>) -> Self {
        Self {
            clusters: RwLock::new(clusters),
        }
    }
}

#[async_trait]
impl ClusterRepository for InMemoryClusterRepository {
    async fn save_cluster(&self, cluster: Cluster) -> AppResult<()> {
        let mut clusters = self.clusters.write().await;
        match clusters.iter_mut().find(|stored| stored.id() == cluster.id()) {
            Some(stored) => *stored = cluster,
            None => clusters.push(cluster),
        }

        Ok(())
    }

    async fn list_clusters(&self) -> AppResult<Vec<Cluster>> {
        Ok(self.clusters.read().await.clone())
    }

    async fn find_cluster(&self, cluster_id: &ClusterId) -> AppResult<Option<Cluster>> {
        Ok(self
            .clusters
            .read()
            .await
            .iter()
            .find(|cluster| cluster.id() == cluster_id)
            .cloned())
    }
}
