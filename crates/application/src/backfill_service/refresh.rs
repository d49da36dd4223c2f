use super::*;

impl BackfillService {
    /// Polls every open backfill once. One failing poll never stops the pass.
    pub async fn refresh_active_backfills(&self) -> AppResult<BackfillRefreshSummary> {
        let open = self.backfills.list_active_backfills(None).await?;
        let mut summary = BackfillRefreshSummary {
            polled: open.len(),
            ..BackfillRefreshSummary::default()
        };

        for mut backfill in open {
            match self.poll(&mut backfill).await {
                Ok(true) => summary.updated += 1,
                Ok(false) => {}
                Err(error) => {
                    summary.failed += 1;
                    warn!(
                        backfill_id = %backfill.id(),
                        cluster_id = %backfill.cluster_id(),
                        error = %error,
                        "backfill refresh failed"
                    );
                }
            }
        }

        info!(
            polled = summary.polled,
            updated = summary.updated,
            failed = summary.failed,
            "backfill refresh finished"
        );

        Ok(summary)
    }
}
