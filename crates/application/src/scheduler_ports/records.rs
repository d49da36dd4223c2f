use chrono::{DateTime, NaiveDate, Utc};
use orbit_domain::{
    BackfillId, ExternalBackfillStatus, ExternalRunId, ExternalRunObservation, RunId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to start one run on the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRunRequest {
    /// Orchestrator workflow identifier.
    pub workflow_external_id: String,
    /// Local run the orchestrator run is created for.
    pub run_id: RunId,
    /// Optional logical date of the run.
    pub logical_date: Option<DateTime<Utc>>,
    /// Run configuration payload.
    pub conf: Value,
}

/// Orchestrator acknowledgement of a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredRun {
    /// Orchestrator run identifier.
    pub external_run_id: ExternalRunId,
    /// Raw state at creation.
    pub raw_state: String,
    /// Orchestrator UI link.
    pub external_url: Option<String>,
}

/// One run as listed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRunRecord {
    /// Orchestrator workflow identifier the run belongs to.
    pub workflow_external_id: String,
    /// Observed run state.
    pub observation: ExternalRunObservation,
    /// Local run this orchestrator run was triggered for, when it carries one.
    pub origin_run_id: Option<RunId>,
}

/// One task instance of an orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTaskInstance {
    /// Task identifier inside the workflow.
    pub task_id: String,
    /// Raw task state.
    pub state: Option<String>,
    /// Attempt number.
    pub try_number: u32,
    /// Task start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Task end time.
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration reported by the orchestrator, in seconds.
    pub duration_seconds: Option<f64>,
}

/// Schedule registration payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    /// Orchestrator workflow identifier.
    pub workflow_external_id: String,
    /// Cron expression, stored verbatim.
    pub cron: Option<String>,
    /// Schedule timezone.
    pub timezone: String,
    /// Storage location of the definition artifact.
    pub artifact_location: Option<String>,
}

/// Backfill creation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillRequest {
    /// Orchestrator workflow identifier.
    pub workflow_external_id: String,
    /// Inclusive first logical date.
    pub from_date: NaiveDate,
    /// Exclusive last logical date.
    pub to_date: NaiveDate,
}

/// Backfill as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBackfill {
    /// Orchestrator backfill identifier.
    pub backfill_id: BackfillId,
    /// Reported status.
    pub status: ExternalBackfillStatus,
}
