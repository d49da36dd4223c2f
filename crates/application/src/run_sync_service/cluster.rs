use super::*;

impl RunSyncService {
    /// Synchronizes one registered, active cluster with the default settings.
    pub async fn sync_cluster(&self, cluster_id: &ClusterId) -> AppResult<ClusterSyncResult> {
        let cluster = self.clusters.find_cluster(cluster_id)?;
        if !cluster.is_active() {
            return Err(AppError::Conflict(format!(
                "cluster '{cluster_id}' is not active"
            )));
        }

        Ok(self
            .sync_cluster_bounded(cluster, self.settings.lookback(), self.settings.batch_size())
            .await)
    }

    /// Synchronizes one cluster.
    ///
    /// Lists external runs changed inside the lookback window, updates the
    /// matching local runs and creates missing ones. Per-run failures are
    /// counted and never abort the batch; listing failures are reported as a
    /// cluster-level error in the result.
    pub async fn sync_cluster_with(
        &self,
        cluster: &Cluster,
        lookback: Duration,
        batch_size: usize,
    ) -> ClusterSyncResult {
        let mut result = ClusterSyncResult::new(cluster.id());

        let scheduler = match self.schedulers.client_for(cluster) {
            Ok(scheduler) => scheduler,
            Err(error) => return ClusterSyncResult::failed(cluster.id(), error),
        };

        let since = self.clock.now() - lookback;
        let records = match scheduler.list_recent_runs(since, batch_size).await {
            Ok(records) => records,
            Err(error) => {
                warn!(cluster_id = %cluster.id(), error = %error, "cluster sync failed");
                return ClusterSyncResult::failed(cluster.id(), error);
            }
        };

        let mut workflow_cache = HashMap::new();
        for record in records {
            match self
                .sync_record(cluster, &record, &mut workflow_cache)
                .await
            {
                Ok(RecordOutcome::Created) => result.created += 1,
                Ok(RecordOutcome::Updated) => result.updated += 1,
                Ok(RecordOutcome::Unchanged) => {}
                Ok(RecordOutcome::Skipped) => result.skipped += 1,
                Err(error) => {
                    result.failed_runs += 1;
                    warn!(
                        cluster_id = %cluster.id(),
                        external_run_id = %record.observation.external_run_id,
                        error = %error,
                        "run sync failed"
                    );
                }
            }
        }

        info!(
            cluster_id = %cluster.id(),
            updated = result.updated,
            created = result.created,
            skipped = result.skipped,
            failed_runs = result.failed_runs,
            "cluster synced"
        );

        result
    }

    /// Runs [`Self::sync_cluster_with`] under the per-cluster timeout.
    pub(super) async fn sync_cluster_bounded(
        &self,
        cluster: Cluster,
        lookback: Duration,
        batch_size: usize,
    ) -> ClusterSyncResult {
        let timeout = self.settings.cluster_timeout();
        match tokio::time::timeout(timeout, self.sync_cluster_with(&cluster, lookback, batch_size))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    cluster_id = %cluster.id(),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "cluster sync timed out"
                );
                ClusterSyncResult::failed(
                    cluster.id(),
                    format!("timed out after {} ms", timeout.as_millis()),
                )
            }
        }
    }

    async fn sync_record(
        &self,
        cluster: &Cluster,
        record: &ExternalRunRecord,
        workflow_cache: &mut HashMap<String, Option<DatasetName>>,
    ) -> AppResult<RecordOutcome> {
        let key = ExternalRunKey::new(
            cluster.id().clone(),
            record.observation.external_run_id.clone(),
        );
        let now = self.clock.now();

        if let Some(run) = self.runs.find_run_by_external_key(&key).await? {
            return self.apply_observation(run, &record.observation, now).await;
        }

        // A run triggered from here may be listed before its trigger call
        // recorded the external id.
        if let Some(origin) = self.unbound_origin(cluster, record).await? {
            debug!(
                run_id = %origin.id(),
                external_run_id = %record.observation.external_run_id,
                "binding listed run to its triggering local run"
            );
            return self.apply_observation(origin, &record.observation, now).await;
        }

        let Some(workflow) = self
            .workflow_for(record.workflow_external_id.as_str(), workflow_cache)
            .await?
        else {
            debug!(
                cluster_id = %cluster.id(),
                workflow_external_id = record.workflow_external_id.as_str(),
                "skipping run of unregistered workflow"
            );
            return Ok(RecordOutcome::Skipped);
        };

        let run = Run::discovered(
            workflow,
            record.workflow_external_id.as_str(),
            cluster.id().clone(),
            &record.observation,
            now,
        );

        match self.runs.insert_run(run).await {
            Ok(run) => {
                if map_external_state(record.observation.raw_state.as_str()).is_err() {
                    warn!(
                        run_id = %run.id(),
                        raw_state = record.observation.raw_state.as_str(),
                        "unmappable external state, run created as UNKNOWN"
                    );
                }
                Ok(RecordOutcome::Created)
            }
            Err(AppError::Conflict(_)) => {
                let run = self
                    .runs
                    .find_run_by_external_key(&key)
                    .await?
                    .ok_or_else(|| AppError::RunNotFound(key.external_run_id.to_string()))?;
                self.apply_observation(run, &record.observation, now).await
            }
            Err(error) => Err(error),
        }
    }

    async fn unbound_origin(
        &self,
        cluster: &Cluster,
        record: &ExternalRunRecord,
    ) -> AppResult<Option<Run>> {
        let Some(origin_run_id) = record.origin_run_id else {
            return Ok(None);
        };

        Ok(self.runs.find_run(origin_run_id).await?.filter(|run| {
            run.cluster_id() == cluster.id()
                && run.external_run_id().is_none()
                && run.workflow_external_id() == record.workflow_external_id
        }))
    }

    async fn workflow_for(
        &self,
        workflow_external_id: &str,
        workflow_cache: &mut HashMap<String, Option<DatasetName>>,
    ) -> AppResult<Option<DatasetName>> {
        if let Some(cached) = workflow_cache.get(workflow_external_id) {
            return Ok(cached.clone());
        }

        let dataset = self
            .workflows
            .find_workflow_by_external_id(workflow_external_id)
            .await?
            .map(|workflow| workflow.dataset().clone());
        workflow_cache.insert(workflow_external_id.to_owned(), dataset.clone());
        Ok(dataset)
    }
}
