use std::sync::Arc;

use chrono::NaiveDate;
use orbit_core::{AppError, AppResult, Clock};
use orbit_domain::{Backfill, BackfillId, BackfillState, DatasetName, DateRange};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cluster_registry::ClusterRegistry;
use crate::repository_ports::{BackfillRepository, WorkflowRepository};
use crate::scheduler_ports::{BackfillRequest, ExternalSchedulerPort, SchedulerClientProvider};

mod commands;
mod refresh;

/// Attempts made by [`apply_backfill_with_retry`] before a conflict surfaces.
const MAX_BACKFILL_WRITE_ATTEMPTS: usize = 3;

/// Bounds applied to new backfill requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillLimits {
    max_range_days: i64,
    max_in_flight: usize,
}

impl BackfillLimits {
    /// Creates validated limits.
    pub fn new(max_range_days: i64, max_in_flight: usize) -> AppResult<Self> {
        if max_range_days <= 0 {
            return Err(AppError::Validation(
                "backfill max range must be at least one day".to_owned(),
            ));
        }

        if max_in_flight == 0 {
            return Err(AppError::Validation(
                "backfill in-flight limit must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            max_range_days,
            max_in_flight,
        })
    }

    /// Returns the longest accepted range in days.
    #[must_use]
    pub fn max_range_days(&self) -> i64 {
        self.max_range_days
    }

    /// Returns the maximum number of open backfills per workflow.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }
}

impl Default for BackfillLimits {
    fn default() -> Self {
        Self {
            max_range_days: 365,
            max_in_flight: 3,
        }
    }
}

/// Input payload for a new backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBackfillInput {
    /// Workflow dataset name.
    pub dataset: String,
    /// Inclusive first logical date.
    pub from_date: NaiveDate,
    /// Exclusive end logical date.
    pub to_date: NaiveDate,
}

/// Counts reported by one backfill refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillRefreshSummary {
    /// Open backfills polled.
    pub polled: usize,
    /// Backfills whose state or pause flag changed.
    pub updated: usize,
    /// Backfills whose poll failed.
    pub failed: usize,
}

/// Delegates bulk reruns to the orchestrator and tracks their status.
#[derive(Clone)]
pub struct BackfillService {
    backfills: Arc<dyn BackfillRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    clusters: ClusterRegistry,
    schedulers: Arc<dyn SchedulerClientProvider>,
    clock: Arc<dyn Clock>,
    limits: BackfillLimits,
}

impl BackfillService {
    /// Creates a backfill service.
    #[must_use]
    pub fn new(
        backfills: Arc<dyn BackfillRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        clusters: ClusterRegistry,
        schedulers: Arc<dyn SchedulerClientProvider>,
        clock: Arc<dyn Clock>,
        limits: BackfillLimits,
    ) -> Self {
        Self {
            backfills,
            workflows,
            clusters,
            schedulers,
            clock,
            limits,
        }
    }

    async fn load_backfill(&self, backfill_id: &str) -> AppResult<Backfill> {
        let backfill_id = BackfillId::new(backfill_id)?;
        self.backfills
            .find_backfill(&backfill_id)
            .await?
            .ok_or_else(|| AppError::BackfillNotFound(backfill_id.to_string()))
    }

    fn scheduler_for(&self, backfill: &Backfill) -> AppResult<Arc<dyn ExternalSchedulerPort>> {
        let cluster = self.clusters.find_cluster(backfill.cluster_id())?;
        self.schedulers.client_for(&cluster)
    }
}

/// Applies one change to a backfill and writes it with compare-and-swap.
///
/// On a version conflict the backfill is re-read and `apply` runs again, so a
/// poll that lost to a cancel only records its poll time.
pub(crate) async fn apply_backfill_with_retry<T, F>(
    backfills: &dyn BackfillRepository,
    mut backfill: Backfill,
    mut apply: F,
) -> AppResult<(Backfill, T)>
where
    F: FnMut(&mut Backfill) -> AppResult<T> + Send,
    T: Send,
{
    let backfill_id = backfill.id().clone();
    let mut attempt = 1;

    loop {
        let output = apply(&mut backfill)?;
        match backfills.update_backfill(backfill).await {
            Ok(stored) => return Ok((stored, output)),
            Err(AppError::Conflict(message)) if attempt < MAX_BACKFILL_WRITE_ATTEMPTS => {
                debug!(
                    backfill_id = %backfill_id,
                    attempt,
                    conflict = %message,
                    "retrying backfill write"
                );
                attempt += 1;
                backfill = backfills
                    .find_backfill(&backfill_id)
                    .await?
                    .ok_or_else(|| AppError::BackfillNotFound(backfill_id.to_string()))?;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests;
