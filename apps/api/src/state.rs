use std::sync::Arc;

use chrono::Duration;
use orbit_application::{
    BackfillService, ClusterRegistry, RunLifecycleService, RunSyncService,
    WorkflowRegistryService,
};
use orbit_infrastructure::InMemoryDefinitionSource;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub cluster_registry: ClusterRegistry,
    pub workflow_registry: WorkflowRegistryService,
    pub run_lifecycle: RunLifecycleService,
    pub run_sync: RunSyncService,
    pub backfill_service: BackfillService,
    pub definition_source: Arc<InMemoryDefinitionSource>,
    pub stale_threshold: Duration,
    pub storage: &'static str,
}
