use chrono::{DateTime, NaiveDate, Utc};
use orbit_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterId;
use crate::external_state::map_external_state_lossy;
use crate::run::RunStatus;
use crate::workflow::DatasetName;

/// Backfill identifier returned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackfillId(NonEmptyString);

impl BackfillId {
    /// Creates a validated backfill identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        Ok(Self(NonEmptyString::new(value)?))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for BackfillId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Collective backfill state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackfillState {
    /// Accepted, no run started yet.
    Queued,
    /// Runs are being executed.
    Running,
    /// Cancelled by an operator.
    Cancelled,
    /// Every run of the range finished.
    Completed,
}

impl BackfillState {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "CANCELLED" => Ok(Self::Cancelled),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(AppError::Validation(format!(
                "unknown backfill state '{value}'"
            ))),
        }
    }

    /// Returns whether the backfill can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    fn from_run_status(status: RunStatus) -> Self {
        match status {
            RunStatus::Pending => Self::Queued,
            RunStatus::Running | RunStatus::Stopping | RunStatus::Unknown => Self::Running,
            RunStatus::Success | RunStatus::Failed | RunStatus::Skipped | RunStatus::Timeout => {
                Self::Completed
            }
            RunStatus::Stopped => Self::Cancelled,
        }
    }
}

impl std::fmt::Display for BackfillState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Half-open logical date range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    /// Creates a validated, non-empty date range.
    pub fn new(from: NaiveDate, to: NaiveDate) -> AppResult<Self> {
        if from >= to {
            return Err(AppError::Validation(format!(
                "backfill range start {from} must be before end {to}"
            )));
        }

        Ok(Self { from, to })
    }

    /// Returns the inclusive start date.
    #[must_use]
    pub fn from(&self) -> NaiveDate {
        self.from
    }

    /// Returns the exclusive end date.
    #[must_use]
    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Returns the number of logical dates covered.
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days()
    }
}

/// Backfill status as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBackfillStatus {
    /// Raw state string, mapped through the run state table.
    pub raw_state: String,
    /// Pause flag reported by the orchestrator, when it reports one.
    pub is_paused: Option<bool>,
    /// Completion timestamp reported by the orchestrator.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Plain persisted shape of a backfill, used by repository adapters only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillSnapshot {
    /// Backfill identifier.
    pub id: BackfillId,
    /// Owning workflow.
    pub workflow: DatasetName,
    /// Orchestrator identifier of the owning workflow.
    pub workflow_external_id: String,
    /// Cluster running the backfill.
    pub cluster_id: ClusterId,
    /// Logical date range.
    pub range: DateRange,
    /// Collective state.
    pub state: BackfillState,
    /// Pause flag.
    pub is_paused: bool,
    /// Last raw orchestrator state.
    pub external_state: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Completion or cancellation timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last successful status poll.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version.
    pub version: u64,
}

/// Bulk re-run of one workflow over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backfill {
    id: BackfillId,
    workflow: DatasetName,
    workflow_external_id: String,
    cluster_id: ClusterId,
    range: DateRange,
    state: BackfillState,
    is_paused: bool,
    external_state: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    last_synced_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Backfill {
    /// Creates a backfill accepted by the orchestrator, in RUNNING.
    #[must_use]
    pub fn accepted(
        id: BackfillId,
        workflow: DatasetName,
        workflow_external_id: impl Into<String>,
        cluster_id: ClusterId,
        range: DateRange,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workflow,
            workflow_external_id: workflow_external_id.into(),
            cluster_id,
            range,
            state: BackfillState::Running,
            is_paused: false,
            external_state: None,
            created_at: now,
            completed_at: None,
            last_synced_at: None,
            version: 0,
        }
    }

    /// Rehydrates a persisted backfill.
    #[must_use]
    pub fn from_snapshot(snapshot: BackfillSnapshot) -> Self {
        Self {
            id: snapshot.id,
            workflow: snapshot.workflow,
            workflow_external_id: snapshot.workflow_external_id,
            cluster_id: snapshot.cluster_id,
            range: snapshot.range,
            state: snapshot.state,
            is_paused: snapshot.is_paused,
            external_state: snapshot.external_state,
            created_at: snapshot.created_at,
            completed_at: snapshot.completed_at,
            last_synced_at: snapshot.last_synced_at,
            version: snapshot.version,
        }
    }

    /// Returns the persisted shape of this backfill.
    #[must_use]
    pub fn to_snapshot(&self) -> BackfillSnapshot {
        BackfillSnapshot {
            id: self.id.clone(),
            workflow: self.workflow.clone(),
            workflow_external_id: self.workflow_external_id.clone(),
            cluster_id: self.cluster_id.clone(),
            range: self.range,
            state: self.state,
            is_paused: self.is_paused,
            external_state: self.external_state.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            last_synced_at: self.last_synced_at,
            version: self.version,
        }
    }

    /// Returns a copy stamped with the version assigned by a repository write.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Sets the pause flag. State is left untouched.
    pub fn pause(&mut self) -> AppResult<()> {
        self.ensure_open("pause")?;
        if self.is_paused {
            return Err(self.invalid("pause"));
        }

        self.is_paused = true;
        Ok(())
    }

    /// Clears the pause flag. State is left untouched.
    pub fn unpause(&mut self) -> AppResult<()> {
        self.ensure_open("unpause")?;
        if !self.is_paused {
            return Err(self.invalid("unpause"));
        }

        self.is_paused = false;
        Ok(())
    }

    /// QUEUED or RUNNING → CANCELLED.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_open("cancel")?;

        self.state = BackfillState::Cancelled;
        self.is_paused = false;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Merges an orchestrator status poll. Returns whether anything changed.
    ///
    /// A reported completion timestamp wins over the raw state. Terminal
    /// backfills only record the poll time.
    pub fn apply_external(&mut self, status: &ExternalBackfillStatus, now: DateTime<Utc>) -> bool {
        let before = self.clone();

        if !self.state.is_terminal() {
            let next = if status.completed_at.is_some() {
                BackfillState::Completed
            } else {
                BackfillState::from_run_status(map_external_state_lossy(&status.raw_state))
            };

            self.state = next;
            if next.is_terminal() {
                self.is_paused = false;
                self.completed_at = status.completed_at.or(Some(now));
            } else if let Some(is_paused) = status.is_paused {
                self.is_paused = is_paused;
            }
            self.external_state = Some(status.raw_state.clone());
        }

        let changed = *self != before;
        self.last_synced_at = Some(match self.last_synced_at {
            Some(previous) if previous > now => previous,
            _ => now,
        });
        changed
    }

    /// Returns the backfill identifier.
    #[must_use]
    pub fn id(&self) -> &BackfillId {
        &self.id
    }

    /// Returns the owning workflow.
    #[must_use]
    pub fn workflow(&self) -> &DatasetName {
        &self.workflow
    }

    /// Returns the orchestrator identifier of the owning workflow.
    #[must_use]
    pub fn workflow_external_id(&self) -> &str {
        self.workflow_external_id.as_str()
    }

    /// Returns the cluster running the backfill.
    #[must_use]
    pub fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    /// Returns the logical date range.
    #[must_use]
    pub fn range(&self) -> DateRange {
        self.range
    }

    /// Returns the collective state.
    #[must_use]
    pub fn state(&self) -> BackfillState {
        self.state
    }

    /// Returns the pause flag.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// Returns the last raw orchestrator state.
    #[must_use]
    pub fn external_state(&self) -> Option<&str> {
        self.external_state.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the completion or cancellation timestamp.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the last successful status poll.
    #[must_use]
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Returns the optimistic concurrency version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    fn ensure_open(&self, operation: &'static str) -> AppResult<()> {
        if self.state.is_terminal() {
            return Err(self.invalid(operation));
        }

        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> AppError {
        let current_state = if self.is_paused {
            format!("{} (paused)", self.state.as_str())
        } else {
            self.state.as_str().to_owned()
        };

        AppError::InvalidTransition {
            resource: "backfill",
            current_state,
            operation,
        }
    }
}
