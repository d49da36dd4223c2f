use super::*;

impl BackfillService {
    /// Creates a backfill for a workflow over `[from_date, to_date)`.
    pub async fn create_backfill(&self, input: CreateBackfillInput) -> AppResult<Backfill> {
        let dataset = DatasetName::new(input.dataset)?;
        let workflow = self
            .workflows
            .find_workflow(&dataset)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("workflow '{dataset}' not found")))?;

        if !workflow.can_run() {
            return Err(AppError::InvalidWorkflowTransition {
                current_status: workflow.status().as_str().to_owned(),
                operation: "backfill",
            });
        }

        let range = DateRange::new(input.from_date, input.to_date)?;
        if range.days() > self.limits.max_range_days() {
            return Err(AppError::Validation(format!(
                "backfill range of {} days exceeds the limit of {} days",
                range.days(),
                self.limits.max_range_days()
            )));
        }

        let open = self.backfills.list_active_backfills(Some(&dataset)).await?;
        if open.len() >= self.limits.max_in_flight() {
            return Err(AppError::Conflict(format!(
                "workflow '{dataset}' already has {} open backfills",
                open.len()
            )));
        }

        let cluster = self.clusters.resolve_cluster_for_team(workflow.owner_team())?;
        let scheduler = self.schedulers.client_for(&cluster)?;
        let external = scheduler
            .create_backfill(BackfillRequest {
                workflow_external_id: workflow.external_id().to_owned(),
                from_date: range.from(),
                to_date: range.to(),
            })
            .await?;

        let now = self.clock.now();
        let mut backfill = Backfill::accepted(
            external.backfill_id,
            dataset,
            workflow.external_id(),
            cluster.id().clone(),
            range,
            now,
        );
        backfill.apply_external(&external.status, now);
        self.backfills.insert_backfill(backfill.clone()).await?;

        info!(
            backfill_id = %backfill.id(),
            workflow = %backfill.workflow(),
            cluster_id = %backfill.cluster_id(),
            days = range.days(),
            "backfill created"
        );

        Ok(backfill)
    }

    /// Polls the orchestrator and returns the refreshed backfill.
    pub async fn get_status(&self, backfill_id: &str) -> AppResult<Backfill> {
        let mut backfill = self.load_backfill(backfill_id).await?;
        self.poll(&mut backfill).await?;
        Ok(backfill)
    }

    /// Pauses an open backfill. The state is left untouched.
    pub async fn pause_backfill(&self, backfill_id: &str) -> AppResult<Backfill> {
        let current = self.load_backfill(backfill_id).await?;
        current.clone().pause()?;

        self.scheduler_for(&current)?
            .pause_backfill(current.id())
            .await?;
        let (backfill, ()) =
            apply_backfill_with_retry(self.backfills.as_ref(), current, Backfill::pause).await?;

        info!(backfill_id = %backfill.id(), "backfill paused");
        Ok(backfill)
    }

    /// Resumes a paused backfill.
    pub async fn unpause_backfill(&self, backfill_id: &str) -> AppResult<Backfill> {
        let current = self.load_backfill(backfill_id).await?;
        current.clone().unpause()?;

        self.scheduler_for(&current)?
            .unpause_backfill(current.id())
            .await?;
        let (backfill, ()) =
            apply_backfill_with_retry(self.backfills.as_ref(), current, Backfill::unpause).await?;

        info!(backfill_id = %backfill.id(), "backfill resumed");
        Ok(backfill)
    }

    /// Cancels a QUEUED or RUNNING backfill.
    pub async fn cancel_backfill(&self, backfill_id: &str) -> AppResult<Backfill> {
        let current = self.load_backfill(backfill_id).await?;
        let now = self.clock.now();
        current.clone().cancel(now)?;

        self.scheduler_for(&current)?
            .cancel_backfill(current.id())
            .await?;
        let (backfill, ()) =
            apply_backfill_with_retry(self.backfills.as_ref(), current, |backfill| {
                backfill.cancel(now)
            })
            .await?;

        info!(backfill_id = %backfill.id(), "backfill cancelled");
        Ok(backfill)
    }

    /// Lists open backfills, optionally for one workflow.
    pub async fn list_active_backfills(&self, dataset: Option<&str>) -> AppResult<Vec<Backfill>> {
        let dataset = dataset.map(DatasetName::new).transpose()?;
        self.backfills.list_active_backfills(dataset.as_ref()).await
    }

    /// Applies the orchestrator's current status and persists the poll.
    ///
    /// `backfill` is replaced with the stored copy, which reflects any write
    /// that won against this poll.
    pub(super) async fn poll(&self, backfill: &mut Backfill) -> AppResult<bool> {
        let external = self
            .scheduler_for(backfill)?
            .get_backfill_status(backfill.id())
            .await?;

        let previous = backfill.state();
        let now = self.clock.now();
        let (stored, changed) =
            apply_backfill_with_retry(self.backfills.as_ref(), backfill.clone(), |backfill| {
                Ok(backfill.apply_external(&external.status, now))
            })
            .await?;
        *backfill = stored;

        if previous != backfill.state() && backfill.state() == BackfillState::Completed {
            info!(backfill_id = %backfill.id(), "backfill completed");
        }

        Ok(changed)
    }
}
