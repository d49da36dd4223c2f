//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod fake_scheduler_estate;
mod http_scheduler_client;
mod in_memory_backfill_repository;
mod in_memory_cluster_repository;
mod in_memory_definition_source;
mod in_memory_run_repository;
mod in_memory_workflow_repository;
mod postgres_backfill_repository;
mod postgres_cluster_repository;
mod postgres_errors;
mod postgres_run_repository;
mod postgres_workflow_repository;
mod redis_sync_lease_coordinator;
mod scheduler_client_router;

pub use fake_scheduler_estate::{
    AdvanceSummary, FakeClusterScheduler, FakeSchedulerEstate, FakeSchedulerSettings,
};
pub use http_scheduler_client::{
    HttpSchedulerClient, HttpSchedulerClientProvider, HttpSchedulerSettings,
};
pub use in_memory_backfill_repository::InMemoryBackfillRepository;
pub use in_memory_cluster_repository::InMemoryClusterRepository;
pub use in_memory_definition_source::InMemoryDefinitionSource;
pub use in_memory_run_repository::InMemoryRunRepository;
pub use in_memory_workflow_repository::InMemoryWorkflowRepository;
pub use postgres_backfill_repository::PostgresBackfillRepository;
pub use postgres_cluster_repository::PostgresClusterRepository;
pub use postgres_run_repository::PostgresRunRepository;
pub use postgres_workflow_repository::PostgresWorkflowRepository;
pub use redis_sync_lease_coordinator::RedisSyncLeaseCoordinator;
pub use scheduler_client_router::SchedulerClientRouter;

#[cfg(test)]
mod scenario_tests;
