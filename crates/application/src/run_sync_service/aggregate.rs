use super::*;

impl RunSyncService {
    /// Synchronizes every active cluster with the default settings.
    pub async fn sync_all_clusters(&self) -> AggregateSyncResult {
        self.sync_all_clusters_with(self.settings.lookback(), self.settings.batch_size())
            .await
    }

    /// Synchronizes every active cluster concurrently.
    ///
    /// Each cluster runs as its own task under its own timeout. A failing
    /// cluster is counted in `failed_clusters` and never affects the others.
    pub async fn sync_all_clusters_with(
        &self,
        lookback: Duration,
        batch_size: usize,
    ) -> AggregateSyncResult {
        let clusters = self.clusters.list_active_clusters();
        let mut join_set = JoinSet::new();

        for cluster in clusters.iter().cloned() {
            let service = self.clone();
            join_set.spawn(async move {
                service
                    .sync_cluster_bounded(cluster, lookback, batch_size)
                    .await
            });
        }

        let mut results = Vec::with_capacity(clusters.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    warn!(error = %join_error, "cluster sync task aborted");
                }
            }
        }

        let results = in_cluster_order(&clusters, results);
        let aggregate = AggregateSyncResult::from_results(results);

        info!(
            total_clusters = aggregate.total_clusters,
            total_updated = aggregate.total_updated,
            total_created = aggregate.total_created,
            failed_clusters = aggregate.failed_clusters,
            "sync pass finished"
        );

        aggregate
    }
}
