use super::*;

impl WorkflowRegistryService {
    /// Registers one workflow in ACTIVE status.
    pub async fn register_workflow(&self, input: WorkflowRegistration) -> AppResult<Workflow> {
        let workflow = Workflow::register(input, self.clock.now())?;
        self.repository.insert_workflow(workflow.clone()).await?;

        info!(
            workflow = %workflow.dataset(),
            external_id = workflow.external_id(),
            owner_team = workflow.owner_team(),
            "workflow registered"
        );

        self.publish_schedule(&workflow).await;
        Ok(workflow)
    }

    /// Returns one workflow.
    pub async fn get_workflow(&self, dataset: &str) -> AppResult<Workflow> {
        self.load_workflow(dataset).await
    }

    /// Lists every workflow.
    pub async fn list_workflows(&self) -> AppResult<Vec<Workflow>> {
        self.repository.list_workflows().await
    }

    /// ACTIVE → PAUSED, then pauses the external schedule.
    pub async fn pause_workflow(&self, dataset: &str, reason: Option<String>) -> AppResult<Workflow> {
        let mut workflow = self.load_workflow(dataset).await?;
        workflow.pause(reason, self.clock.now())?;
        self.repository.update_workflow(workflow.clone()).await?;

        self.set_external_paused(&workflow, true).await;
        info!(workflow = %workflow.dataset(), "workflow paused");
        Ok(workflow)
    }

    /// PAUSED → ACTIVE, then unpauses the external schedule.
    pub async fn unpause_workflow(&self, dataset: &str) -> AppResult<Workflow> {
        let mut workflow = self.load_workflow(dataset).await?;
        workflow.unpause(self.clock.now())?;
        self.repository.update_workflow(workflow.clone()).await?;

        self.set_external_paused(&workflow, false).await;
        info!(workflow = %workflow.dataset(), "workflow unpaused");
        Ok(workflow)
    }

    /// Soft-disables one workflow and removes its external schedule.
    pub async fn disable_workflow(&self, dataset: &str) -> AppResult<Workflow> {
        let mut workflow = self.load_workflow(dataset).await?;
        workflow.disable(self.clock.now())?;
        self.repository.update_workflow(workflow.clone()).await?;

        let result = match self.scheduler_for(&workflow) {
            Ok(scheduler) => scheduler.delete_schedule(workflow.external_id()).await,
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            warn!(
                workflow = %workflow.dataset(),
                error = %error,
                "failed to delete external schedule of disabled workflow"
            );
        }

        info!(workflow = %workflow.dataset(), "workflow disabled");
        Ok(workflow)
    }

    async fn set_external_paused(&self, workflow: &Workflow, paused: bool) {
        let result = match self.scheduler_for(workflow) {
            Ok(scheduler) => scheduler.set_paused(workflow.external_id(), paused).await,
            Err(error) => Err(error),
        };

        if let Err(error) = result {
            warn!(
                workflow = %workflow.dataset(),
                paused,
                error = %error,
                "failed to propagate pause flag to orchestrator"
            );
        }
    }
}
