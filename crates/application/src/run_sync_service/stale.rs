use super::*;

impl RunSyncService {
    /// Re-synchronizes non-terminal runs not synced within `threshold`.
    ///
    /// Only runs bound to an orchestrator run on an active cluster are
    /// selected, so runs that can never be repaired do not crowd the batch.
    /// Stale runs are grouped by owning cluster and only those clusters are
    /// queried, one concurrent task per cluster.
    pub async fn sync_stale_runs(&self, threshold: Duration) -> AppResult<StaleSyncResult> {
        if threshold <= Duration::zero() {
            return Err(AppError::Validation(
                "stale threshold must be positive".to_owned(),
            ));
        }

        let snapshot = self.clusters.snapshot();
        let active: Vec<ClusterId> = snapshot
            .list_active_clusters()
            .iter()
            .map(|cluster| cluster.id().clone())
            .collect();
        if active.is_empty() {
            return Ok(StaleSyncResult::default());
        }

        let cutoff = self.clock.now() - threshold;
        let stale = self
            .runs
            .list_stale_runs(cutoff, &active, self.settings.stale_batch_size())
            .await?;
        let stale_runs = stale.len();

        let mut by_cluster: BTreeMap<ClusterId, Vec<Run>> = BTreeMap::new();
        for run in stale {
            by_cluster
                .entry(run.cluster_id().clone())
                .or_default()
                .push(run);
        }

        let mut join_set = JoinSet::new();
        let mut targets = Vec::with_capacity(by_cluster.len());
        for (cluster_id, runs) in by_cluster {
            let Some(cluster) = snapshot.find(&cluster_id).cloned() else {
                continue;
            };
            targets.push(cluster.clone());
            let service = self.clone();
            join_set.spawn(async move { service.sync_runs_bounded(cluster, runs).await });
        }

        let mut results = Vec::with_capacity(targets.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    warn!(error = %join_error, "stale sync task aborted");
                }
            }
        }
        let results = in_cluster_order(&targets, results);

        let result = StaleSyncResult {
            stale_runs,
            total_clusters: results.len(),
            total_updated: results.iter().map(|result| result.updated).sum(),
            failed_clusters: results.iter().filter(|result| result.is_failure()).count(),
            clusters: results,
        };

        info!(
            stale_runs = result.stale_runs,
            total_clusters = result.total_clusters,
            total_updated = result.total_updated,
            failed_clusters = result.failed_clusters,
            "stale run sync finished"
        );

        Ok(result)
    }

    async fn sync_runs_bounded(&self, cluster: Cluster, runs: Vec<Run>) -> ClusterSyncResult {
        let timeout = self.settings.cluster_timeout();
        match tokio::time::timeout(timeout, self.sync_runs_on_cluster(&cluster, runs)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(cluster_id = %cluster.id(), "stale run sync timed out");
                ClusterSyncResult::failed(
                    cluster.id(),
                    format!("timed out after {} ms", timeout.as_millis()),
                )
            }
        }
    }

    async fn sync_runs_on_cluster(&self, cluster: &Cluster, runs: Vec<Run>) -> ClusterSyncResult {
        let mut result = ClusterSyncResult::new(cluster.id());
        let scheduler = match self.schedulers.client_for(cluster) {
            Ok(scheduler) => scheduler,
            Err(error) => return ClusterSyncResult::failed(cluster.id(), error),
        };

        for run in runs {
            let Some(external_run_id) = run.external_run_id().cloned() else {
                result.skipped += 1;
                continue;
            };
            let run_id = run.id();

            let record = match scheduler
                .get_run(run.workflow_external_id(), &external_run_id)
                .await
            {
                Ok(record) => record,
                Err(error @ AppError::ClusterUnreachable { .. }) => {
                    warn!(cluster_id = %cluster.id(), error = %error, "stale run sync failed");
                    result.error = Some(error.to_string());
                    break;
                }
                Err(error) => {
                    result.failed_runs += 1;
                    warn!(run_id = %run_id, error = %error, "stale run lookup failed");
                    continue;
                }
            };

            match self
                .apply_observation(run, &record.observation, self.clock.now())
                .await
            {
                Ok(RecordOutcome::Updated) => result.updated += 1,
                Ok(_) => {}
                Err(error) => {
                    result.failed_runs += 1;
                    warn!(run_id = %run_id, error = %error, "stale run sync failed");
                }
            }
        }

        result
    }
}
