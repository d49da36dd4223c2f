use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbit_application::RunRepository;
use orbit_core::{AppError, AppResult};
use orbit_domain::{ClusterId, DatasetName, ExternalRunKey, Run, RunId};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct RunStore {
    runs: HashMap<RunId, Run>,
    by_external_key: HashMap<ExternalRunKey, RunId>,
}

impl RunStore {
    fn claim_external_key(&mut self, run: &Run) -> AppResult<()> {
        let Some(key) = run.external_key() else {
            return Ok(());
        };

        match self.by_external_key.get(&key) {
            Some(owner) if *owner != run.id() => Err(AppError::Conflict(format!(
                "external run '{}' on cluster '{}' already belongs to run '{owner}'",
                key.external_run_id, key.cluster_id
            ))),
            _ => {
                self.by_external_key.insert(key, run.id());
                Ok(())
            }
        }
    }
}

/// In-memory run repository with version compare-and-swap.
#[derive(Debug, Default)]
pub struct InMemoryRunRepository {
    store: RwLock<RunStore>,
}

impl InMemoryRunRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn insert_run(&self, run: Run) -> AppResult<Run> {
        let mut store = self.store.write().await;
        if store.runs.contains_key(&run.id()) {
            return Err(AppError::Conflict(format!(
                "run '{}' already exists",
                run.id()
            )));
        }

        let stored = run.with_version(1);
        store.claim_external_key(&stored)?;
        store.runs.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn update_run(&self, run: Run) -> AppResult<Run> {
        let mut store = self.store.write().await;
        let Some(current) = store.runs.get(&run.id()) else {
            return Err(AppError::RunNotFound(run.id().to_string()));
        };

        if current.version() != run.version() {
            return Err(AppError::Conflict(format!(
                "run '{}' was modified concurrently (expected version {}, found {})",
                run.id(),
                run.version(),
                current.version()
            )));
        }

        let next_version = run.version() + 1;
        let stored = run.with_version(next_version);
        store.claim_external_key(&stored)?;
        store.runs.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn find_run(&self, run_id: RunId) -> AppResult<Option<Run>> {
        Ok(self.store.read().await.runs.get(&run_id).cloned())
    }

    async fn find_run_by_external_key(&self, key: &ExternalRunKey) -> AppResult<Option<Run>> {
        let store = self.store.read().await;
        Ok(store
            .by_external_key
            .get(key)
            .and_then(|run_id| store.runs.get(run_id))
            .cloned())
    }

    async fn list_runs_for_workflow(
        &self,
        workflow: &DatasetName,
        limit: usize,
    ) -> AppResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .store
            .read()
            .await
            .runs
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
            .store
            .read()
            .await
            .runs
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
        let count = self
            .store
            .read()
            .await
            .runs
            .values()
            .filter(|run| run.cluster_id() == cluster_id)
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests;
