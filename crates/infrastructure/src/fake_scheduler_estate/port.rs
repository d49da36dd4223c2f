use async_trait::async_trait;
use chrono::NaiveDate;
use orbit_application::{
    BackfillRequest, ExternalBackfill, ExternalTaskInstance, TriggerRunRequest, TriggeredRun,
};
use orbit_domain::ExternalBackfillStatus;

use super::*;

#[async_trait]
impl ExternalSchedulerPort for FakeClusterScheduler {
    fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    async fn trigger_run(&self, request: TriggerRunRequest) -> AppResult<TriggeredRun> {
        let now = self.estate.clock.now();
        let mut state = self.enter().await?;
        let sequence = state.next_sequence();
        let key = self.key(&ExternalRunId::new(format!("manual__{sequence}"))?);

        state.runs.insert(
            key.clone(),
            SimulatedRun {
                workflow_external_id: request.workflow_external_id,
                origin_run_id: Some(request.run_id),
                raw_state: "queued".to_owned(),
                started_at: None,
                ended_at: None,
                updated_at: now,
            },
        );

        Ok(TriggeredRun {
            external_url: Some(run_url(&key)),
            external_run_id: key.external_run_id,
            raw_state: "queued".to_owned(),
        })
    }

    async fn get_run(
        &self,
        _workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<ExternalRunRecord> {
        let key = self.key(external_run_id);
        self.enter()
            .await?
            .runs
            .get(&key)
            .map(|run| run.record(&key))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "run '{external_run_id}' not found on cluster '{}'",
                    self.cluster_id
                ))
            })
    }

    async fn stop_run(
        &self,
        _workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<()> {
        let now = self.estate.clock.now();
        let key = self.key(external_run_id);
        let mut state = self.enter().await?;
        let run = state.runs.get_mut(&key).ok_or_else(|| {
            AppError::NotFound(format!(
                "run '{external_run_id}' not found on cluster '{}'",
                self.cluster_id
            ))
        })?;

        if !map_external_state_lossy(&run.raw_state).is_terminal() {
            run.raw_state = "failed".to_owned();
            run.ended_at = Some(now);
            run.updated_at = now;
        }

        Ok(())
    }

    async fn set_paused(&self, workflow_external_id: &str, paused: bool) -> AppResult<()> {
        let mut state = self.enter().await?;
        let cluster = state.cluster(&self.cluster_id);
        if paused {
            cluster
                .paused_workflows
                .insert(workflow_external_id.to_owned());
        } else {
            cluster.paused_workflows.remove(workflow_external_id);
        }

        Ok(())
    }

    async fn create_schedule(&self, request: ScheduleRequest) -> AppResult<()> {
        let mut state = self.enter().await?;
        state
            .cluster(&self.cluster_id)
            .schedules
            .insert(request.workflow_external_id.clone(), request);
        Ok(())
    }

    async fn delete_schedule(&self, workflow_external_id: &str) -> AppResult<()> {
        let mut state = self.enter().await?;
        state
            .cluster(&self.cluster_id)
            .schedules
            .remove(workflow_external_id);
        Ok(())
    }

    async fn list_recent_runs(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>> {
        let state = self.enter().await?;
        let mut recent: Vec<(&ExternalRunKey, &SimulatedRun)> = state
            .runs
            .iter()
            .filter(|(key, run)| key.cluster_id == self.cluster_id && run.updated_at >= since)
            .collect();
        recent.sort_by(|left, right| right.1.updated_at.cmp(&left.1.updated_at));

        Ok(recent
            .into_iter()
            .take(limit)
            .map(|(key, run)| run.record(key))
            .collect())
    }

    async fn list_runs(
        &self,
        workflow_external_id: &str,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>> {
        let state = self.enter().await?;
        let mut runs: Vec<(&ExternalRunKey, &SimulatedRun)> = state
            .runs
            .iter()
            .filter(|(key, run)| {
                key.cluster_id == self.cluster_id && run.workflow_external_id == workflow_external_id
            })
            .collect();
        runs.sort_by(|left, right| right.1.updated_at.cmp(&left.1.updated_at));

        Ok(runs
            .into_iter()
            .take(limit)
            .map(|(key, run)| run.record(key))
            .collect())
    }

    async fn get_task_instances(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<Vec<ExternalTaskInstance>> {
        let record = self.get_run(workflow_external_id, external_run_id).await?;
        let observation = record.observation;
        let duration_seconds = observation
            .started_at
            .zip(observation.ended_at)
            .map(|(started, ended)| (ended - started).num_milliseconds() as f64 / 1000.0);

        // One task per run, mirroring the run itself.
        Ok(vec![ExternalTaskInstance {
            task_id: "main".to_owned(),
            state: Some(observation.raw_state),
            try_number: 1,
            started_at: observation.started_at,
            ended_at: observation.ended_at,
            duration_seconds,
        }])
    }

    async fn create_backfill(&self, request: BackfillRequest) -> AppResult<ExternalBackfill> {
        validate_backfill_dates(request.from_date, request.to_date)?;
        let mut state = self.enter().await?;
        let backfill_id = BackfillId::new(format!("bf-{}", state.next_sequence()))?;
        let backfill = SimulatedBackfill {
            cluster_id: self.cluster_id.clone(),
            raw_state: "running".to_owned(),
            is_paused: false,
            completed_at: None,
        };
        let status = backfill_status(&backfill);
        state.backfills.insert(backfill_id.clone(), backfill);

        Ok(ExternalBackfill {
            backfill_id,
            status,
        })
    }

    async fn get_backfill_status(&self, backfill_id: &BackfillId) -> AppResult<ExternalBackfill> {
        let state = self.enter().await?;
        let backfill = self.owned_backfill(&state, backfill_id)?;
        Ok(ExternalBackfill {
            backfill_id: backfill_id.clone(),
            status: backfill_status(backfill),
        })
    }

    async fn pause_backfill(&self, backfill_id: &BackfillId) -> AppResult<()> {
        self.update_backfill(backfill_id, |backfill| backfill.is_paused = true)
            .await
    }

    async fn unpause_backfill(&self, backfill_id: &BackfillId) -> AppResult<()> {
        self.update_backfill(backfill_id, |backfill| backfill.is_paused = false)
            .await
    }

    async fn cancel_backfill(&self, backfill_id: &BackfillId) -> AppResult<()> {
        self.update_backfill(backfill_id, |backfill| {
            if backfill.completed_at.is_none() {
                backfill.raw_state = "failed".to_owned();
                backfill.is_paused = false;
            }
        })
        .await
    }

    async fn is_available(&self) -> bool {
        self.enter().await.is_ok()
    }
}

impl FakeClusterScheduler {
    fn owned_backfill<'a>(
        &self,
        state: &'a EstateState,
        backfill_id: &BackfillId,
    ) -> AppResult<&'a SimulatedBackfill> {
        state
            .backfills
            .get(backfill_id)
            .filter(|backfill| backfill.cluster_id == self.cluster_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "backfill '{backfill_id}' not found on cluster '{}'",
                    self.cluster_id
                ))
            })
    }

    async fn update_backfill(
        &self,
        backfill_id: &BackfillId,
        apply: impl FnOnce(&mut SimulatedBackfill) + Send,
    ) -> AppResult<()> {
        let mut state = self.enter().await?;
        self.owned_backfill(&state, backfill_id)?;
        if let Some(backfill) = state.backfills.get_mut(backfill_id) {
            apply(backfill);
        }
        Ok(())
    }
}

fn backfill_status(backfill: &SimulatedBackfill) -> ExternalBackfillStatus {
    ExternalBackfillStatus {
        raw_state: backfill.raw_state.clone(),
        is_paused: Some(backfill.is_paused),
        completed_at: backfill.completed_at,
    }
}

fn validate_backfill_dates(from_date: NaiveDate, to_date: NaiveDate) -> AppResult<()> {
    if from_date >= to_date {
        return Err(AppError::Validation(format!(
            "backfill range {from_date}..{to_date} is empty"
        )));
    }
    Ok(())
}
