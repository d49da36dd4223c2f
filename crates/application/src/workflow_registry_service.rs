use std::sync::Arc;

use orbit_core::{AppError, AppResult, Clock};
use orbit_domain::{
    DatasetName, ScheduleDescriptor, Workflow, WorkflowRegistration, WorkflowSourceType,
    WorkflowStatus,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cluster_registry::ClusterRegistry;
use crate::repository_ports::WorkflowRepository;
use crate::scheduler_ports::{
    ExternalSchedulerPort, ScheduleRequest, SchedulerClientProvider, WorkflowDefinitionSource,
};

mod definitions;
mod lifecycle;

/// Counts reported by one definition synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefinitionSyncSummary {
    /// Workflows created from new definitions.
    pub created: usize,
    /// Workflows whose code definition changed.
    pub updated: usize,
    /// Workflows that fell back to MANUAL after their definition disappeared.
    pub released: usize,
    /// Per-definition failures.
    pub errors: Vec<String>,
}

/// Workflow registry service for lifecycle and definition source precedence.
#[derive(Clone)]
pub struct WorkflowRegistryService {
    repository: Arc<dyn WorkflowRepository>,
    clusters: ClusterRegistry,
    schedulers: Arc<dyn SchedulerClientProvider>,
    clock: Arc<dyn Clock>,
    definition_source: Option<Arc<dyn WorkflowDefinitionSource>>,
}

impl WorkflowRegistryService {
    /// Creates a workflow registry service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        clusters: ClusterRegistry,
        schedulers: Arc<dyn SchedulerClientProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            clusters,
            schedulers,
            clock,
            definition_source: None,
        }
    }

    /// Adds the code-managed definition source.
    #[must_use]
    pub fn with_definition_source(
        mut self,
        definition_source: Arc<dyn WorkflowDefinitionSource>,
    ) -> Self {
        self.definition_source = Some(definition_source);
        self
    }

    async fn load_workflow(&self, dataset: &str) -> AppResult<Workflow> {
        let dataset = DatasetName::new(dataset)?;
        self.repository
            .find_workflow(&dataset)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("workflow '{dataset}' not found")))
    }

    fn scheduler_for(&self, workflow: &Workflow) -> AppResult<Arc<dyn ExternalSchedulerPort>> {
        let cluster = self.clusters.resolve_cluster_for_team(workflow.owner_team())?;
        self.schedulers.client_for(&cluster)
    }

    /// Pushes the workflow schedule to its cluster. Failures are logged only.
    async fn publish_schedule(&self, workflow: &Workflow) {
        if workflow.schedule().cron().is_none() {
            return;
        }

        let request = ScheduleRequest {
            workflow_external_id: workflow.external_id().to_owned(),
            cron: workflow.schedule().cron().map(ToOwned::to_owned),
            timezone: workflow.schedule().timezone().to_owned(),
            artifact_location: workflow.artifact_location().map(ToOwned::to_owned),
        };

        let result = match self.scheduler_for(workflow) {
            Ok(scheduler) => scheduler.create_schedule(request).await,
            Err(error) => Err(error),
        };

        if let Err(error) = result {
            warn!(
                workflow = %workflow.dataset(),
                error = %error,
                "failed to publish workflow schedule"
            );
        }
    }
}
