use super::*;

impl RunLifecycleService {
    /// Creates a PENDING run for an ACTIVE workflow and starts it externally.
    ///
    /// Cluster resolution happens before the run is stored, so
    /// `NoClusterAvailable` leaves nothing behind. A failed external trigger
    /// marks the stored run FAILED and returns the trigger error.
    pub async fn trigger_run(&self, dataset: &str, input: TriggerRunInput) -> AppResult<Run> {
        let dataset = DatasetName::new(dataset)?;
        let workflow = self
            .workflows
            .find_workflow(&dataset)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("workflow '{dataset}' not found")))?;

        if !workflow.can_run() {
            return Err(AppError::InvalidWorkflowTransition {
                current_status: workflow.status().as_str().to_owned(),
                operation: "trigger",
            });
        }

        let cluster = self.clusters.resolve_cluster_for_team(workflow.owner_team())?;
        let scheduler = self.schedulers.client_for(&cluster)?;

        let run = Run::pending(
            NewRun {
                workflow: dataset,
                workflow_external_id: workflow.external_id().to_owned(),
                cluster_id: cluster.id().clone(),
                run_type: input.run_type,
                triggered_by: input.triggered_by,
                parameters: input.parameters.clone(),
            },
            self.clock.now(),
        )?;
        let run = self.runs.insert_run(run).await?;

        info!(
            run_id = %run.id(),
            workflow = %run.workflow(),
            cluster_id = %cluster.id(),
            "run accepted"
        );

        let triggered = scheduler
            .trigger_run(TriggerRunRequest {
                workflow_external_id: workflow.external_id().to_owned(),
                run_id: run.id(),
                logical_date: input.logical_date,
                conf: input.parameters,
            })
            .await;

        match triggered {
            Ok(triggered) => {
                let (run, ()) = apply_with_retry(self.runs.as_ref(), run, |run| {
                    run.assign_external_run(
                        triggered.external_run_id.clone(),
                        triggered.external_url.clone(),
                    )
                })
                .await?;

                info!(
                    run_id = %run.id(),
                    external_run_id = %triggered.external_run_id,
                    "run triggered on orchestrator"
                );
                Ok(run)
            }
            Err(error) => {
                warn!(
                    run_id = %run.id(),
                    cluster_id = %cluster.id(),
                    error = %error,
                    "external trigger failed"
                );

                let run_id = run.id();
                let now = self.clock.now();
                if let Err(mark_error) =
                    apply_with_retry(self.runs.as_ref(), run, |run| run.fail(now)).await
                {
                    return Err(AppError::Internal(format!(
                        "failed to trigger run '{run_id}': {error}; additionally failed to mark run failed: {mark_error}"
                    )));
                }

                Err(error)
            }
        }
    }
}
