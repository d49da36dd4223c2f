use super::wire::{BackfillDto, CreateBackfillBody};
use super::*;

impl HttpSchedulerClient {
    pub(super) async fn create_backfill_impl(
        &self,
        request: BackfillRequest,
    ) -> AppResult<ExternalBackfill> {
        let url = self.api_url(&["backfills"])?;
        let body = CreateBackfillBody {
            dag_id: request.workflow_external_id.as_str(),
            from_date: request.from_date,
            to_date: request.to_date,
            run_backwards: false,
            reprocess_behavior: "failed",
        };

        let created: BackfillDto = self
            .send_json("create_backfill", |client| {
                client.post(url.clone()).json(&body)
            })
            .await?;
        ExternalBackfill::try_from(created)
    }

    pub(super) async fn get_backfill_impl(
        &self,
        backfill_id: &BackfillId,
    ) -> AppResult<ExternalBackfill> {
        let url = self.api_url(&["backfills", backfill_id.as_str()])?;
        let backfill: BackfillDto = self
            .send_json("get_backfill_status", |client| client.get(url.clone()))
            .await?;
        ExternalBackfill::try_from(backfill)
    }

    pub(super) async fn backfill_action(
        &self,
        backfill_id: &BackfillId,
        action: &str,
    ) -> AppResult<()> {
        let url = self.api_url(&["backfills", backfill_id.as_str(), action])?;
        self.send_with_retry(action, |client| client.put(url.clone()))
            .await?;
        Ok(())
    }
}
