use std::sync::Arc;

use orbit_application::{
    BackfillRepository, ClusterRepository, RunRepository, WorkflowRepository,
};
use orbit_infrastructure::{
    InMemoryBackfillRepository, InMemoryClusterRepository, InMemoryRunRepository,
    InMemoryWorkflowRepository, PostgresBackfillRepository, PostgresClusterRepository,
    PostgresRunRepository, PostgresWorkflowRepository,
};
use sqlx::PgPool;

/// Repository adapters behind the services.
pub struct RepositorySet {
    pub clusters: Arc<dyn ClusterRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub runs: Arc<dyn RunRepository>,
    pub backfills: Arc<dyn BackfillRepository>,
    pub storage: &'static str,
}

impl RepositorySet {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            clusters: Arc::new(PostgresClusterRepository::new(pool.clone())),
            workflows: Arc::new(PostgresWorkflowRepository::new(pool.clone())),
            runs: Arc::new(PostgresRunRepository::new(pool.clone())),
            backfills: Arc::new(PostgresBackfillRepository::new(pool.clone())),
            storage: "postgres",
        }
    }

    pub fn in_memory() -> Self {
        Self {
            clusters: Arc::new(InMemoryClusterRepository::new()),
            workflows: Arc::new(InMemoryWorkflowRepository::new()),
            runs: Arc::new(InMemoryRunRepository::new()),
            backfills: Arc::new(InMemoryBackfillRepository::new()),
            storage: "memory",
        }
    }
}
