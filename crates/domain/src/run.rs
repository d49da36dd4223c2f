//! Run lifecycle state machine.
//!
//! Every status change of a [`Run`] goes through one of the transition
//! methods below. Fields are private so that callers cannot bypass the
//! transition table; persistence adapters rehydrate through [`RunSnapshot`].

use chrono::{DateTime, Duration, Utc};
use orbit_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::cluster::{ClusterId, ExternalRunId, ExternalRunKey};
use crate::external_state::map_external_state;
use crate::workflow::DatasetName;

/// Locally generated run identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a random run identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a run identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Parses a run identifier from its string form.
    pub fn parse(value: &str) -> AppResult<Self> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid run id '{value}': {error}")))
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Lifecycle status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Accepted locally, not yet running externally.
    Pending,
    /// Executing on the orchestrator.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with a failure.
    Failed,
    /// Gave up waiting for the run.
    Timeout,
    /// Stop requested, waiting for the orchestrator to confirm.
    Stopping,
    /// Stop confirmed.
    Stopped,
    /// Skipped by the orchestrator.
    Skipped,
    /// Orchestrator reported a state outside the mapping table.
    Unknown,
}

impl RunStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Pending,
        Self::Running,
        Self::Success,
        Self::Failed,
        Self::Timeout,
        Self::Stopping,
        Self::Stopped,
        Self::Skipped,
        Self::Unknown,
    ];

    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Skipped => "SKIPPED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown run status '{value}'")))
    }

    /// Returns whether no further transition (other than freshness) applies.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Stopped | Self::Skipped | Self::Timeout
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// What caused the run to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunType {
    /// Started by the orchestrator's own schedule.
    Scheduled,
    /// Started by an operator.
    Manual,
    /// Spawned by a backfill.
    Backfill,
}

impl RunType {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Manual => "MANUAL",
            Self::Backfill => "BACKFILL",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "SCHEDULED" => Ok(Self::Scheduled),
            "MANUAL" => Ok(Self::Manual),
            "BACKFILL" => Ok(Self::Backfill),
            _ => Err(AppError::Validation(format!("unknown run type '{value}'"))),
        }
    }

    /// Infers the run type from an orchestrator run identifier prefix.
    #[must_use]
    pub fn infer_from_external_id(external_run_id: &str) -> Self {
        if external_run_id.starts_with("manual__") {
            Self::Manual
        } else if external_run_id.starts_with("backfill__") {
            Self::Backfill
        } else {
            Self::Scheduled
        }
    }
}

/// Who asked a run to stop, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopMetadata {
    /// Principal that requested the stop.
    pub requested_by: String,
    /// Optional free-text reason.
    pub reason: Option<String>,
    /// Stop request timestamp.
    pub requested_at: DateTime<Utc>,
}

/// Test or step summary counters reported at completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    total: u32,
    passed: u32,
    failed: u32,
}

impl RunCounters {
    /// Creates validated counters.
    pub fn new(passed: u32, failed: u32, total: u32) -> AppResult<Self> {
        if passed.saturating_add(failed) > total {
            return Err(AppError::Validation(format!(
                "passed ({passed}) plus failed ({failed}) exceeds total ({total})"
            )));
        }

        Ok(Self {
            total,
            passed,
            failed,
        })
    }

    /// Returns the total count.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Returns the passed count.
    #[must_use]
    pub fn passed(&self) -> u32 {
        self.passed
    }

    /// Returns the failed count.
    #[must_use]
    pub fn failed(&self) -> u32 {
        self.failed
    }
}

/// Input for a locally triggered run.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    /// Owning workflow dataset.
    pub workflow: DatasetName,
    /// Orchestrator identifier of the owning workflow.
    pub workflow_external_id: String,
    /// Cluster the run was routed to.
    pub cluster_id: ClusterId,
    /// Run type.
    pub run_type: RunType,
    /// Principal that triggered the run.
    pub triggered_by: String,
    /// Submitted run parameters.
    pub parameters: Value,
}

/// Run state as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRunObservation {
    /// Orchestrator run identifier.
    pub external_run_id: ExternalRunId,
    /// Raw orchestrator state string.
    pub raw_state: String,
    /// Orchestrator UI link.
    pub external_url: Option<String>,
    /// Start time reported by the orchestrator.
    pub started_at: Option<DateTime<Utc>>,
    /// End time reported by the orchestrator.
    pub ended_at: Option<DateTime<Utc>>,
}

/// Result of applying one external observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Whether any field other than the sync timestamp changed.
    pub changed: bool,
    /// Whether the raw state was outside the mapping table.
    pub unmapped_state: bool,
}

/// Plain persisted shape of a run, used by repository adapters only.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    /// Run identifier.
    pub id: RunId,
    /// Owning workflow dataset.
    pub workflow: DatasetName,
    /// Orchestrator identifier of the owning workflow.
    pub workflow_external_id: String,
    /// Cluster the run belongs to.
    pub cluster_id: ClusterId,
    /// Current status.
    pub status: RunStatus,
    /// Run type.
    pub run_type: RunType,
    /// Triggering principal.
    pub triggered_by: String,
    /// Submitted parameters.
    pub parameters: Value,
    /// Start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// End timestamp.
    pub ended_at: Option<DateTime<Utc>>,
    /// Stop request metadata.
    pub stop: Option<StopMetadata>,
    /// Orchestrator run identifier.
    pub external_run_id: Option<ExternalRunId>,
    /// Raw orchestrator state.
    pub external_state: Option<String>,
    /// Orchestrator UI link.
    pub external_url: Option<String>,
    /// Last successful synchronization.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Summary counters.
    pub counters: Option<RunCounters>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: u64,
}

/// One execution instance of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    id: RunId,
    workflow: DatasetName,
    workflow_external_id: String,
    cluster_id: ClusterId,
    status: RunStatus,
    run_type: RunType,
    triggered_by: String,
    parameters: Value,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    stop: Option<StopMetadata>,
    external_run_id: Option<ExternalRunId>,
    external_state: Option<String>,
    external_url: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    counters: Option<RunCounters>,
    created_at: DateTime<Utc>,
    version: u64,
}

impl Run {
    /// Creates a run in PENDING for a locally accepted trigger.
    pub fn pending(input: NewRun, now: DateTime<Utc>) -> AppResult<Self> {
        let NewRun {
            workflow,
            workflow_external_id,
            cluster_id,
            run_type,
            triggered_by,
            parameters,
        } = input;

        let triggered_by = NonEmptyString::new(triggered_by)?;
        let workflow_external_id = NonEmptyString::new(workflow_external_id)?;
        if !parameters.is_object() && !parameters.is_null() {
            return Err(AppError::Validation(
                "run parameters must be a JSON object".to_owned(),
            ));
        }

        Ok(Self {
            id: RunId::new(),
            workflow,
            workflow_external_id: workflow_external_id.into(),
            cluster_id,
            status: RunStatus::Pending,
            run_type,
            triggered_by: triggered_by.into(),
            parameters,
            started_at: None,
            ended_at: None,
            stop: None,
            external_run_id: None,
            external_state: None,
            external_url: None,
            last_synced_at: None,
            counters: None,
            created_at: now,
            version: 0,
        })
    }

    /// Creates a run first seen on the orchestrator during synchronization.
    #[must_use]
    pub fn discovered(
        workflow: DatasetName,
        workflow_external_id: impl Into<String>,
        cluster_id: ClusterId,
        observation: &ExternalRunObservation,
        now: DateTime<Utc>,
    ) -> Self {
        let status = map_external_state(observation.raw_state.as_str()).unwrap_or(RunStatus::Unknown);
        let ended_at = if status.is_terminal() {
            observation.ended_at.or(Some(now))
        } else {
            None
        };

        Self {
            id: RunId::new(),
            workflow,
            workflow_external_id: workflow_external_id.into(),
            cluster_id,
            status,
            run_type: RunType::infer_from_external_id(observation.external_run_id.as_str()),
            triggered_by: "orchestrator".to_owned(),
            parameters: Value::Null,
            started_at: observation.started_at,
            ended_at,
            stop: None,
            external_run_id: Some(observation.external_run_id.clone()),
            external_state: Some(observation.raw_state.clone()),
            external_url: observation.external_url.clone(),
            last_synced_at: Some(now),
            counters: None,
            created_at: now,
            version: 0,
        }
    }

    /// Rehydrates a persisted run.
    #[must_use]
    pub fn from_snapshot(snapshot: RunSnapshot) -> Self {
        Self {
            id: snapshot.id,
            workflow: snapshot.workflow,
            workflow_external_id: snapshot.workflow_external_id,
            cluster_id: snapshot.cluster_id,
            status: snapshot.status,
            run_type: snapshot.run_type,
            triggered_by: snapshot.triggered_by,
            parameters: snapshot.parameters,
            started_at: snapshot.started_at,
            ended_at: snapshot.ended_at,
            stop: snapshot.stop,
            external_run_id: snapshot.external_run_id,
            external_state: snapshot.external_state,
            external_url: snapshot.external_url,
            last_synced_at: snapshot.last_synced_at,
            counters: snapshot.counters,
            created_at: snapshot.created_at,
            version: snapshot.version,
        }
    }

    /// Returns the persisted shape of this run.
    #[must_use]
    pub fn to_snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            id: self.id,
            workflow: self.workflow.clone(),
            workflow_external_id: self.workflow_external_id.clone(),
            cluster_id: self.cluster_id.clone(),
            status: self.status,
            run_type: self.run_type,
            triggered_by: self.triggered_by.clone(),
            parameters: self.parameters.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            stop: self.stop.clone(),
            external_run_id: self.external_run_id.clone(),
            external_state: self.external_state.clone(),
            external_url: self.external_url.clone(),
            last_synced_at: self.last_synced_at,
            counters: self.counters,
            created_at: self.created_at,
            version: self.version,
        }
    }

    /// Returns a copy stamped with the version assigned by a repository write.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// PENDING → RUNNING.
    pub fn start(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != RunStatus::Pending {
            return Err(self.invalid("start"));
        }

        self.status = RunStatus::Running;
        self.started_at.get_or_insert(now);
        Ok(())
    }

    /// RUNNING → SUCCESS, optionally recording summary counters.
    pub fn complete(
        &mut self,
        counters: Option<RunCounters>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.status != RunStatus::Running {
            return Err(self.invalid("complete"));
        }

        self.status = RunStatus::Success;
        self.ended_at.get_or_insert(now);
        if counters.is_some() {
            self.counters = counters;
        }
        Ok(())
    }

    /// Any non-terminal state → FAILED.
    pub fn fail(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(self.invalid("fail"));
        }

        self.status = RunStatus::Failed;
        self.ended_at.get_or_insert(now);
        Ok(())
    }

    /// PENDING or RUNNING → TIMEOUT.
    pub fn timeout(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if !matches!(self.status, RunStatus::Pending | RunStatus::Running) {
            return Err(self.invalid("timeout"));
        }

        self.status = RunStatus::Timeout;
        self.ended_at.get_or_insert(now);
        Ok(())
    }

    /// PENDING or RUNNING → STOPPING, recording who asked and why.
    pub fn request_stop(
        &mut self,
        requested_by: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if !matches!(self.status, RunStatus::Pending | RunStatus::Running) {
            return Err(self.invalid("request_stop"));
        }

        let requested_by = NonEmptyString::new(requested_by)?;
        self.status = RunStatus::Stopping;
        self.stop = Some(StopMetadata {
            requested_by: requested_by.into(),
            reason: reason
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            requested_at: now,
        });
        Ok(())
    }

    /// STOPPING → STOPPED.
    pub fn complete_stop(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != RunStatus::Stopping {
            return Err(self.invalid("complete_stop"));
        }

        self.status = RunStatus::Stopped;
        self.ended_at.get_or_insert(now);
        Ok(())
    }

    /// Records the orchestrator run created for this run. Set at most once.
    pub fn assign_external_run(
        &mut self,
        external_run_id: ExternalRunId,
        external_url: Option<String>,
    ) -> AppResult<()> {
        match &self.external_run_id {
            Some(existing) if existing == &external_run_id => Ok(()),
            Some(existing) => Err(AppError::Conflict(format!(
                "run '{}' is already bound to external run '{}'",
                self.id, existing
            ))),
            None => {
                self.external_run_id = Some(external_run_id);
                if external_url.is_some() {
                    self.external_url = external_url;
                }
                Ok(())
            }
        }
    }

    /// Merges orchestrator state into this run.
    ///
    /// Non-terminal runs take the mapped state. STOPPING only moves to
    /// STOPPED once the orchestrator reports a finished state. Terminal runs
    /// keep their status and only record the raw state and sync time.
    /// Timestamps from the orchestrator fill unset fields only.
    pub fn sync_from_external(
        &mut self,
        observation: &ExternalRunObservation,
        now: DateTime<Utc>,
    ) -> AppResult<SyncOutcome> {
        if let Some(existing) = &self.external_run_id
            && existing != &observation.external_run_id
        {
            return Err(AppError::Conflict(format!(
                "run '{}' is bound to external run '{}', not '{}'",
                self.id, existing, observation.external_run_id
            )));
        }

        let mapped = map_external_state(observation.raw_state.as_str());
        let unmapped_state = mapped.is_err();
        let observed = mapped.unwrap_or(RunStatus::Unknown);
        let before = self.clone();

        match self.status {
            status if status.is_terminal() => {}
            RunStatus::Stopping => {
                if observed.is_terminal() {
                    self.status = RunStatus::Stopped;
                }
            }
            _ => self.status = observed,
        }

        if self.external_run_id.is_none() {
            self.external_run_id = Some(observation.external_run_id.clone());
        }

        if self.started_at.is_none() && self.status != RunStatus::Pending {
            self.started_at = observation.started_at;
        }

        if self.ended_at.is_none() && self.status.is_terminal() {
            self.ended_at = observation.ended_at.or(Some(now));
        }

        self.external_state = Some(observation.raw_state.clone());
        if observation.external_url.is_some() {
            self.external_url = observation.external_url.clone();
        }

        let changed = *self != before;
        self.touch_synced(now);

        Ok(SyncOutcome {
            changed,
            unmapped_state,
        })
    }

    /// Advances the last synchronization timestamp without moving it backwards.
    pub fn touch_synced(&mut self, now: DateTime<Utc>) {
        self.last_synced_at = Some(match self.last_synced_at {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }

    /// Returns whether the run has not been synchronized since `cutoff`.
    #[must_use]
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.last_synced_at.is_none_or(|synced| synced < cutoff)
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Returns the owning workflow dataset.
    #[must_use]
    pub fn workflow(&self) -> &DatasetName {
        &self.workflow
    }

    /// Returns the orchestrator identifier of the owning workflow.
    #[must_use]
    pub fn workflow_external_id(&self) -> &str {
        self.workflow_external_id.as_str()
    }

    /// Returns the owning cluster.
    #[must_use]
    pub fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the run type.
    #[must_use]
    pub fn run_type(&self) -> RunType {
        self.run_type
    }

    /// Returns the triggering principal.
    #[must_use]
    pub fn triggered_by(&self) -> &str {
        self.triggered_by.as_str()
    }

    /// Returns submitted parameters.
    #[must_use]
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Returns the start timestamp.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns the end timestamp.
    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Returns stop request metadata.
    #[must_use]
    pub fn stop(&self) -> Option<&StopMetadata> {
        self.stop.as_ref()
    }

    /// Returns who requested the stop, when one was requested.
    #[must_use]
    pub fn stopped_by(&self) -> Option<&str> {
        self.stop.as_ref().map(|stop| stop.requested_by.as_str())
    }

    /// Returns the orchestrator run identifier.
    #[must_use]
    pub fn external_run_id(&self) -> Option<&ExternalRunId> {
        self.external_run_id.as_ref()
    }

    /// Returns the composite external key when the run is bound externally.
    #[must_use]
    pub fn external_key(&self) -> Option<ExternalRunKey> {
        self.external_run_id
            .as_ref()
            .map(|external_run_id| ExternalRunKey::new(self.cluster_id.clone(), external_run_id.clone()))
    }

    /// Returns the raw orchestrator state.
    #[must_use]
    pub fn external_state(&self) -> Option<&str> {
        self.external_state.as_deref()
    }

    /// Returns the orchestrator UI link.
    #[must_use]
    pub fn external_url(&self) -> Option<&str> {
        self.external_url.as_deref()
    }

    /// Returns the last synchronization timestamp.
    #[must_use]
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Returns summary counters.
    #[must_use]
    pub fn counters(&self) -> Option<RunCounters> {
        self.counters
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the optimistic concurrency version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns whether the run is executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Returns whether the run reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns passed / total, when counters with a non-zero total exist.
    #[must_use]
    pub fn pass_rate(&self) -> Option<f64> {
        self.counters
            .filter(|counters| counters.total > 0)
            .map(|counters| f64::from(counters.passed) / f64::from(counters.total))
    }

    /// Returns end minus start, when both are known.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(started_at), Some(ended_at)) => Some(ended_at - started_at),
            _ => None,
        }
    }

    fn invalid(&self, operation: &'static str) -> AppError {
        AppError::InvalidTransition {
            resource: "run",
            current_state: self.status.as_str().to_owned(),
            operation,
        }
    }
}
