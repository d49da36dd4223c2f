use std::collections::HashMap;

use async_trait::async_trait;
use orbit_application::BackfillRepository;
use orbit_core::{AppError, AppResult};
use orbit_domain::{Backfill, BackfillId, DatasetName};
use tokio::sync::RwLock;

/// In-memory backfill repository.
#[derive(Debug, Default)]
pub struct InMemoryBackfillRepository {
    backfills: RwLock<HashMap<BackfillId, Backfill>>,
}

impl InMemoryBackfillRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackfillRepository for InMemoryBackfillRepository {
    async fn insert_backfill(&self, backfill: Backfill) -> AppResult<()> {
        let mut backfills = self.backfills.write().await;
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
        let mut backfills = self.backfills.write().await;
        let Some(current) = backfills.get_mut(backfill.id()) else {
            return Err(AppError::BackfillNotFound(backfill.id().to_string()));
        };

        if current.version() != backfill.version() {
            return Err(AppError::Conflict(format!(
                "backfill '{}' was modified concurrently (expected version {}, found {})",
                backfill.id(),
                backfill.version(),
                current.version()
            )));
        }

        let next_version = backfill.version() + 1;
        *current = backfill.with_version(next_version);
        Ok(current.clone())
    }

    async fn find_backfill(&self, backfill_id: &BackfillId) -> AppResult<Option<Backfill>> {
        Ok(self.backfills.read().await.get(backfill_id).cloned())
    }

    async fn list_active_backfills(
        &self,
        workflow: Option<&DatasetName>,
    ) -> AppResult<Vec<Backfill>> {
        let mut backfills: Vec<Backfill> = self
            .backfills
            .read()
            .await
            .values()
            .filter(|backfill| !backfill.state().is_terminal())
            .filter(|backfill| workflow.is_none_or(|workflow| backfill.workflow() == workflow))
            .cloned()
            .collect();
        backfills.sort_by_key(Backfill::created_at);
        Ok(backfills)
    }
}
