use super::*;

impl RunLifecycleService {
    /// Returns one run.
    pub async fn get_run(&self, run_id: RunId) -> AppResult<Run> {
        self.load_run(run_id).await
    }

    /// Lists runs of one workflow, newest first.
    pub async fn list_runs(&self, dataset: &str, limit: usize) -> AppResult<Vec<Run>> {
        if limit == 0 {
            return Err(AppError::Validation(
                "limit must be greater than zero".to_owned(),
            ));
        }

        let dataset = DatasetName::new(dataset)?;
        self.runs.list_runs_for_workflow(&dataset, limit).await
    }

    /// PENDING → RUNNING.
    pub async fn start_run(&self, run_id: RunId) -> AppResult<Run> {
        self.transition(run_id, |run, now| run.start(now)).await
    }

    /// RUNNING → SUCCESS.
    pub async fn complete_run(
        &self,
        run_id: RunId,
        counters: Option<RunCounters>,
    ) -> AppResult<Run> {
        self.transition(run_id, move |run, now| run.complete(counters, now))
            .await
    }

    /// Non-terminal → FAILED.
    pub async fn fail_run(&self, run_id: RunId) -> AppResult<Run> {
        self.transition(run_id, |run, now| run.fail(now)).await
    }

    /// PENDING or RUNNING → TIMEOUT.
    pub async fn timeout_run(&self, run_id: RunId) -> AppResult<Run> {
        self.transition(run_id, |run, now| run.timeout(now)).await
    }

    /// PENDING or RUNNING → STOPPING, then asks the orchestrator to stop.
    ///
    /// The run stays STOPPING until synchronization sees a finished external
    /// state or an operator forces [`Self::complete_stop`].
    pub async fn request_stop(
        &self,
        run_id: RunId,
        requested_by: &str,
        reason: Option<String>,
    ) -> AppResult<Run> {
        let run = self
            .transition(run_id, |run, now| {
                run.request_stop(requested_by, reason.clone(), now)
            })
            .await?;

        info!(run_id = %run_id, requested_by, "run stop requested");

        if let Some(external_run_id) = run.external_run_id() {
            let result = match self.scheduler_for_run(&run) {
                Ok(scheduler) => {
                    scheduler
                        .stop_run(run.workflow_external_id(), external_run_id)
                        .await
                }
                Err(error) => Err(error),
            };

            if let Err(error) = result {
                warn!(
                    run_id = %run_id,
                    cluster_id = %run.cluster_id(),
                    error = %error,
                    "external stop request failed; run stays STOPPING"
                );
            }
        }

        Ok(run)
    }

    /// STOPPING → STOPPED without waiting for the orchestrator.
    pub async fn complete_stop(&self, run_id: RunId) -> AppResult<Run> {
        let run = self
            .transition(run_id, |run, now| run.complete_stop(now))
            .await?;
        info!(run_id = %run_id, "run stop completed");
        Ok(run)
    }

    /// Lists orchestrator task instances of one run.
    pub async fn list_task_instances(&self, run_id: RunId) -> AppResult<Vec<ExternalTaskInstance>> {
        let run = self.load_run(run_id).await?;
        let Some(external_run_id) = run.external_run_id() else {
            return Err(AppError::Conflict(format!(
                "run '{run_id}' has no external run yet"
            )));
        };

        self.scheduler_for_run(&run)?
            .get_task_instances(run.workflow_external_id(), external_run_id)
            .await
    }

    async fn transition<F>(&self, run_id: RunId, mut apply: F) -> AppResult<Run>
    where
        F: FnMut(&mut Run, DateTime<Utc>) -> AppResult<()> + Send,
    {
        let run = self.load_run(run_id).await?;
        let clock = self.clock.clone();
        let (run, ()) =
            apply_with_retry(self.runs.as_ref(), run, |run| apply(run, clock.now())).await?;
        Ok(run)
    }
}
