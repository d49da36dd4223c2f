use std::collections::HashMap;

use async_trait::async_trait;
use orbit_application::WorkflowRepository;
use orbit_core::{AppError, AppResult};
use orbit_domain::{DatasetName, Workflow};
use tokio::sync::RwLock;

/// In-memory workflow repository.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<DatasetName, Workflow>>,
}

impl InMemoryWorkflowRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn insert_workflow(&self, workflow: Workflow) -> AppResult<()> {
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(workflow.dataset()) {
            return Err(AppError::Conflict(format!(
                "workflow '{}' already exists",
                workflow.dataset()
            )));
        }

        if workflows
            .values()
            .any(|stored| stored.external_id() == workflow.external_id())
        {
            return Err(AppError::Conflict(format!(
                "workflow external id '{}' is already registered",
                workflow.external_id()
            )));
        }

        workflows.insert(workflow.dataset().clone(), workflow);
        Ok(())
    }

    async fn update_workflow(&self, workflow: Workflow) -> AppResult<()> {
        let mut workflows = self.workflows.write().await;
        let Some(stored) = workflows.get_mut(workflow.dataset()) else {
            return Err(AppError::NotFound(format!(
                "workflow '{}' not found",
                workflow.dataset()
            )));
        };

        *stored = workflow;
        Ok(())
    }

    async fn find_workflow(&self, dataset: &DatasetName) -> AppResult<Option<Workflow>> {
        Ok(self.workflows.read().await.get(dataset).cloned())
    }

    async fn find_workflow_by_external_id(
        &self,
        external_id: &str,
    ) -> AppResult<Option<Workflow>> {
        Ok(self
            .workflows
            .read()
            .await
            .values()
            .find(|workflow| workflow.external_id() == external_id)
            .cloned())
    }

    async fn list_workflows(&self) -> AppResult<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> = self.workflows.read().await.values().cloned().collect();
        workflows.sort_by(|left, right| left.dataset().cmp(right.dataset()));
        Ok(workflows)
    }
}
