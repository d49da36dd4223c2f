use super::wire::{
    DagRunCollection, DagRunDto, TaskInstanceCollection, TriggerDagRunBody, origin_dag_run_id,
};
use super::*;

impl HttpSchedulerClient {
    pub(super) fn into_record(&self, dto: DagRunDto) -> AppResult<ExternalRunRecord> {
        dto.into_record(|dag_id, dag_run_id| self.run_ui_url(dag_id, dag_run_id))
    }

    pub(super) async fn trigger_run_impl(
        &self,
        request: TriggerRunRequest,
    ) -> AppResult<TriggeredRun> {
        let url = self.api_url(&["dags", request.workflow_external_id.as_str(), "dagRuns"])?;
        let body = TriggerDagRunBody {
            dag_run_id: origin_dag_run_id(request.run_id),
            logical_date: request.logical_date,
            conf: &request.conf,
        };

        let created: DagRunDto = self
            .send_json("trigger_run", |client| client.post(url.clone()).json(&body))
            .await?;
        let record = self.into_record(created)?;

        Ok(TriggeredRun {
            external_run_id: record.observation.external_run_id,
            raw_state: record.observation.raw_state,
            external_url: record.observation.external_url,
        })
    }

    pub(super) async fn get_run_impl(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<ExternalRunRecord> {
        let url = self.api_url(&[
            "dags",
            workflow_external_id,
            "dagRuns",
            external_run_id.as_str(),
        ])?;
        let run: DagRunDto = self
            .send_json("get_run", |client| client.get(url.clone()))
            .await?;
        self.into_record(run)
    }

    pub(super) async fn stop_run_impl(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<()> {
        let url = self.api_url(&[
            "dags",
            workflow_external_id,
            "dagRuns",
            external_run_id.as_str(),
        ])?;
        self.send_with_retry("stop_run", |client| {
            client
                .patch(url.clone())
                .json(&json!({ "state": "failed" }))
        })
        .await?;
        Ok(())
    }

    pub(super) async fn list_recent_runs_impl(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>> {
        let mut url = self.api_url(&["dags", "~", "dagRuns"])?;
        url.query_pairs_mut()
            .append_pair("updated_at_gte", &since.to_rfc3339())
            .append_pair("limit", &limit.to_string())
            .append_pair("order_by", "-updated_at");
        let listing: DagRunCollection = self
            .send_json("list_recent_runs", |client| client.get(url.clone()))
            .await?;

        listing
            .dag_runs
            .into_iter()
            .map(|dto| self.into_record(dto))
            .collect()
    }

    pub(super) async fn list_runs_impl(
        &self,
        workflow_external_id: &str,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>> {
        let mut url = self.api_url(&["dags", workflow_external_id, "dagRuns"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("order_by", "-start_date");
        let listing: DagRunCollection = self
            .send_json("list_runs", |client| client.get(url.clone()))
            .await?;

        listing
            .dag_runs
            .into_iter()
            .map(|dto| self.into_record(dto))
            .collect()
    }

    pub(super) async fn get_task_instances_impl(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<Vec<ExternalTaskInstance>> {
        let url = self.api_url(&[
            "dags",
            workflow_external_id,
            "dagRuns",
            external_run_id.as_str(),
            "taskInstances",
        ])?;
        let listing: TaskInstanceCollection = self
            .send_json("get_task_instances", |client| client.get(url.clone()))
            .await?;

        Ok(listing
            .task_instances
            .into_iter()
            .map(ExternalTaskInstance::from)
            .collect())
    }
}
