//! Payloads exchanged with the orchestrator REST API.

use chrono::{DateTime, NaiveDate, Utc};
use orbit_application::{ExternalBackfill, ExternalRunRecord, ExternalTaskInstance};
use orbit_core::{AppError, AppResult};
use orbit_domain::{
    BackfillId, ExternalBackfillStatus, ExternalRunId, ExternalRunObservation, RunId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of run identifiers this control plane submits.
const ORIGIN_RUN_PREFIX: &str = "orbit__";

/// Builds the orchestrator run id submitted for a local run.
pub(super) fn origin_dag_run_id(run_id: RunId) -> String {
    format!("{ORIGIN_RUN_PREFIX}{run_id}")
}

fn origin_run_id(dag_run_id: &str) -> Option<RunId> {
    dag_run_id
        .strip_prefix(ORIGIN_RUN_PREFIX)
        .and_then(|value| RunId::parse(value).ok())
}

#[derive(Debug, Serialize)]
pub(super) struct TriggerDagRunBody<'a> {
    pub dag_run_id: String,
    pub logical_date: Option<DateTime<Utc>>,
    pub conf: &'a Value,
}

#[derive(Debug, Deserialize)]
pub(super) struct DagRunDto {
    pub dag_run_id: String,
    pub dag_id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl DagRunDto {
    /// Converts one listed run, attaching the UI link built by the caller.
    pub fn into_record(
        self,
        external_url: impl FnOnce(&str, &str) -> Option<String>,
    ) -> AppResult<ExternalRunRecord> {
        let external_url = external_url(&self.dag_id, &self.dag_run_id);
        let origin_run_id = origin_run_id(&self.dag_run_id);
        Ok(ExternalRunRecord {
            workflow_external_id: self.dag_id,
            observation: ExternalRunObservation {
                external_run_id: ExternalRunId::new(self.dag_run_id)?,
                raw_state: self.state.unwrap_or_else(|| "none".to_owned()),
                external_url,
                started_at: self.start_date,
                ended_at: self.end_date,
            },
            origin_run_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct DagRunCollection {
    #[serde(default)]
    pub dag_runs: Vec<DagRunDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TaskInstanceDto {
    pub task_id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub try_number: u32,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl From<TaskInstanceDto> for ExternalTaskInstance {
    fn from(value: TaskInstanceDto) -> Self {
        Self {
            task_id: value.task_id,
            state: value.state,
            try_number: value.try_number,
            started_at: value.start_date,
            ended_at: value.end_date,
            duration_seconds: value.duration,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TaskInstanceCollection {
    #[serde(default)]
    pub task_instances: Vec<TaskInstanceDto>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateBackfillBody<'a> {
    pub dag_id: &'a str,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub run_backwards: bool,
    pub reprocess_behavior: &'static str,
}

#[derive(Debug, Deserialize)]
pub(super) struct BackfillDto {
    pub id: Value,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub is_paused: Option<bool>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BackfillDto> for ExternalBackfill {
    type Error = AppError;

    fn try_from(value: BackfillDto) -> Result<Self, Self::Error> {
        let backfill_id = match &value.id {
            Value::String(id) => BackfillId::new(id.clone())?,
            Value::Number(id) => BackfillId::new(id.to_string())?,
            other => {
                return Err(AppError::Internal(format!(
                    "orchestrator returned an unusable backfill id: {other}"
                )));
            }
        };

        // Orchestrators without a state field only report completion.
        let raw_state = value.state.unwrap_or_else(|| {
            if value.completed_at.is_some() {
                "success".to_owned()
            } else {
                "running".to_owned()
            }
        });

        Ok(Self {
            backfill_id,
            status: ExternalBackfillStatus {
                raw_state,
                is_paused: value.is_paused,
                completed_at: value.completed_at,
            },
        })
    }
}
