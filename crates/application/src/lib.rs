//! Application services and ports.

#![forbid(unsafe_code)]

mod backfill_service;
mod cluster_registry;
mod repository_ports;
mod run_lifecycle_service;
mod run_sync_service;
mod scheduler_ports;
mod workflow_registry_service;

#[cfg(test)]
mod test_support;

pub use backfill_service::{
    BackfillLimits, BackfillRefreshSummary, BackfillService, CreateBackfillInput,
};
pub use cluster_registry::{ClusterRegistry, ClusterSnapshot, RegisterClusterInput};
pub use repository_ports::{
    BackfillRepository, ClusterRepository, RunRepository, WorkflowRepository,
};
pub use run_lifecycle_service::{RunLifecycleService, TriggerRunInput};
pub use run_sync_service::{
    AggregateSyncResult, ClusterSyncResult, RunSyncService, StaleSyncResult, SyncSettings,
};
pub use scheduler_ports::{
    BackfillRequest, CodeDefinition, DefinitionListing, ExternalBackfill, ExternalRunRecord,
    ExternalSchedulerPort, ExternalTaskInstance, ScheduleRequest, SchedulerClientProvider,
    SyncLease, SyncLeaseCoordinator, TriggerRunRequest, TriggeredRun, WorkflowDefinitionSource,
};
pub use workflow_registry_service::{DefinitionSyncSummary, WorkflowRegistryService};
