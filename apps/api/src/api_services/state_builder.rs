use std::sync::Arc;

use orbit_application::{
    BackfillService, ClusterRegistry, RunLifecycleService, RunSyncService,
    SchedulerClientProvider, WorkflowRegistryService,
};
use orbit_core::{AppError, AppResult, Clock, SystemClock};
use orbit_infrastructure::{
    FakeSchedulerEstate, HttpSchedulerClientProvider, InMemoryDefinitionSource,
    SchedulerClientRouter,
};
use tracing::{debug, info};

use crate::api_config::ApiConfig;
use crate::state::AppState;

mod repositories;

pub use repositories::RepositorySet;

pub async fn build_app_state(config: &ApiConfig, repositories: RepositorySet) -> AppResult<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let estate = FakeSchedulerEstate::new(clock.clone(), config.simulation_settings);
    let schedulers: Arc<dyn SchedulerClientProvider> = Arc::new(SchedulerClientRouter::new(
        Arc::new(HttpSchedulerClientProvider::new(
            config.scheduler_settings.clone(),
        )?),
        Some(Arc::new(estate)),
    ));

    let cluster_registry =
        ClusterRegistry::load(repositories.clusters.clone(), repositories.runs.clone()).await?;
    for seed in &config.cluster_seeds {
        match cluster_registry.register_cluster(seed.clone()).await {
            Ok(_) => {}
            Err(AppError::Conflict(_)) => {
                debug!(cluster_id = %seed.cluster_id, "seeded cluster already registered");
            }
            Err(error) => return Err(error),
        }
    }

    info!(
        clusters = cluster_registry.list_clusters().len(),
        storage = repositories.storage,
        "cluster registry loaded"
    );

    let definition_source = Arc::new(InMemoryDefinitionSource::new());

    Ok(AppState {
        workflow_registry: WorkflowRegistryService::new(
            repositories.workflows.clone(),
            cluster_registry.clone(),
            schedulers.clone(),
            clock.clone(),
        )
        .with_definition_source(definition_source.clone()),
        run_lifecycle: RunLifecycleService::new(
            repositories.runs.clone(),
            repositories.workflows.clone(),
            cluster_registry.clone(),
            schedulers.clone(),
            clock.clone(),
        ),
        run_sync: RunSyncService::new(
            repositories.runs,
            repositories.workflows.clone(),
            cluster_registry.clone(),
            schedulers.clone(),
            clock.clone(),
            config.sync_settings,
        ),
        backfill_service: BackfillService::new(
            repositories.backfills,
            repositories.workflows,
            cluster_registry.clone(),
            schedulers,
            clock,
            config.backfill_limits,
        ),
        cluster_registry,
        definition_source,
        stale_threshold: config.stale_threshold,
        storage: repositories.storage,
    })
}
