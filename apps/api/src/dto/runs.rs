use chrono::{DateTime, Utc};
use orbit_application::TriggerRunInput;
use orbit_core::AppResult;
use orbit_domain::{Run, RunType, StopMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming payload for a manual trigger.
#[derive(Debug, Deserialize)]
pub struct TriggerRunRequest {
    pub triggered_by: String,
    #[serde(default)]
    pub parameters: Option<Value>,
    pub logical_date: Option<DateTime<Utc>>,
    pub run_type: Option<String>,
}

impl TryFrom<TriggerRunRequest> for TriggerRunInput {
    type Error = orbit_core::AppError;

    fn try_from(value: TriggerRunRequest) -> AppResult<Self> {
        let run_type = value
            .run_type
            .as_deref()
            .map(RunType::parse)
            .transpose()?
            .unwrap_or(RunType::Manual);

        Ok(Self {
            triggered_by: value.triggered_by,
            parameters: value
                .parameters
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            logical_date: value.logical_date,
            run_type,
        })
    }
}

/// Incoming payload for a stop request.
#[derive(Debug, Deserialize)]
pub struct RequestStopRequest {
    pub requested_by: String,
    pub reason: Option<String>,
}

/// API representation of a run.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: String,
    pub workflow: String,
    pub cluster_id: String,
    pub status: &'static str,
    pub run_type: &'static str,
    pub triggered_by: String,
    pub parameters: Value,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub stop: Option<StopMetadata>,
    pub external_run_id: Option<String>,
    pub external_state: Option<String>,
    pub external_url: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub total_tests: Option<u32>,
    pub passed_tests: Option<u32>,
    pub failed_tests: Option<u32>,
    pub pass_rate: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<Run> for RunResponse {
    fn from(value: Run) -> Self {
        let counters = value.counters();
        Self {
            run_id: value.id().to_string(),
            workflow: value.workflow().to_string(),
            cluster_id: value.cluster_id().to_string(),
            status: value.status().as_str(),
            run_type: value.run_type().as_str(),
            triggered_by: value.triggered_by().to_owned(),
            parameters: value.parameters().clone(),
            started_at: value.started_at(),
            ended_at: value.ended_at(),
            duration_seconds: value.duration().map(|duration| duration.num_seconds()),
            stop: value.stop().cloned(),
            external_run_id: value.external_run_id().map(ToString::to_string),
            external_state: value.external_state().map(str::to_owned),
            external_url: value.external_url().map(str::to_owned),
            last_synced_at: value.last_synced_at(),
            total_tests: counters.map(|counters| counters.total()),
            passed_tests: counters.map(|counters| counters.passed()),
            failed_tests: counters.map(|counters| counters.failed()),
            pass_rate: value.pass_rate(),
            created_at: value.created_at(),
        }
    }
}
