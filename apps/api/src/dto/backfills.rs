use chrono::{DateTime, NaiveDate, Utc};
use orbit_application::CreateBackfillInput;
use orbit_domain::Backfill;
use serde::{Deserialize, Serialize};

/// Incoming payload for a backfill. `to_date` is exclusive.
#[derive(Debug, Deserialize)]
pub struct CreateBackfillRequest {
    pub dataset: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

impl From<CreateBackfillRequest> for CreateBackfillInput {
    fn from(value: CreateBackfillRequest) -> Self {
        Self {
            dataset: value.dataset,
            from_date: value.from_date,
            to_date: value.to_date,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListBackfillsQuery {
    pub dataset: Option<String>,
}

/// API representation of a backfill.
#[derive(Debug, Serialize)]
pub struct BackfillResponse {
    pub backfill_id: String,
    pub workflow: String,
    pub cluster_id: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub state: &'static str,
    pub is_paused: bool,
    pub external_state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<Backfill> for BackfillResponse {
    fn from(value: Backfill) -> Self {
        Self {
            backfill_id: value.id().to_string(),
            workflow: value.workflow().to_string(),
            cluster_id: value.cluster_id().to_string(),
            from_date: value.range().from(),
            to_date: value.range().to(),
            state: value.state().as_str(),
            is_paused: value.is_paused(),
            external_state: value.external_state().map(str::to_owned),
            created_at: value.created_at(),
            completed_at: value.completed_at(),
            last_synced_at: value.last_synced_at(),
        }
    }
}
