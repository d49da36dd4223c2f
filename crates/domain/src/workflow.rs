use chrono::{DateTime, Utc};
use orbit_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::cluster::team_from_identifier;

/// Globally unique three-part dataset name (`catalog.schema.table`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetName(NonEmptyString);

impl DatasetName {
    /// Creates a validated dataset name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = NonEmptyString::new(value.into().trim())?;
        let parts: Vec<&str> = value.as_str().split('.').collect();
        if parts.len() != 3 || parts.iter().any(|part| part.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "dataset name '{}' must have the form catalog.schema.table",
                value.as_str()
            )));
        }

        if value
            .as_str()
            .chars()
            .any(|character| character.is_whitespace() || character == '/')
        {
            return Err(AppError::Validation(format!(
                "dataset name '{}' must not contain whitespace or '/'",
                value.as_str()
            )));
        }

        Ok(Self(value))
    }

    /// Returns the dataset name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the team namespace (first segment).
    #[must_use]
    pub fn team(&self) -> &str {
        team_from_identifier(self.as_str()).unwrap_or(self.as_str())
    }

    /// Returns the orchestrator identifier generated for this dataset.
    #[must_use]
    pub fn default_external_id(&self) -> String {
        self.as_str().replace('.', "__")
    }
}

impl std::fmt::Display for DatasetName {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Where the workflow definition is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowSourceType {
    /// Definition is managed in code and synchronized from storage.
    Code,
    /// Definition was registered by an operator.
    Manual,
}

impl WorkflowSourceType {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "CODE",
            Self::Manual => "MANUAL",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "CODE" => Ok(Self::Code),
            "MANUAL" => Ok(Self::Manual),
            _ => Err(AppError::Validation(format!(
                "unknown workflow source type '{value}'"
            ))),
        }
    }
}

/// Workflow lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Accepts new runs.
    Active,
    /// Temporarily refuses new runs.
    Paused,
    /// Permanently retired.
    Disabled,
}

impl WorkflowStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Disabled => "DISABLED",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "PAUSED" => Ok(Self::Paused),
            "DISABLED" => Ok(Self::Disabled),
            _ => Err(AppError::Validation(format!(
                "unknown workflow status '{value}'"
            ))),
        }
    }
}

/// Schedule attached to a workflow. The cron expression is stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDescriptor {
    cron: Option<String>,
    timezone: String,
}

impl ScheduleDescriptor {
    /// Creates a schedule descriptor. Timezone defaults to `UTC`.
    pub fn new(cron: Option<String>, timezone: Option<String>) -> AppResult<Self> {
        let cron = cron
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let timezone = match timezone {
            Some(value) => NonEmptyString::new(value.trim())?.into(),
            None => "UTC".to_owned(),
        };

        Ok(Self { cron, timezone })
    }

    /// Descriptor for an unscheduled workflow.
    #[must_use]
    pub fn unscheduled() -> Self {
        Self {
            cron: None,
            timezone: "UTC".to_owned(),
        }
    }

    /// Returns the cron expression.
    #[must_use]
    pub fn cron(&self) -> Option<&str> {
        self.cron.as_deref()
    }

    /// Returns the timezone.
    #[must_use]
    pub fn timezone(&self) -> &str {
        self.timezone.as_str()
    }
}

impl Default for ScheduleDescriptor {
    fn default() -> Self {
        Self::unscheduled()
    }
}

/// Input payload used to register a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRegistration {
    /// Three-part dataset name.
    pub dataset: String,
    /// Definition source.
    pub source_type: WorkflowSourceType,
    /// Owning team. Defaults to the dataset's team namespace.
    pub owner_team: Option<String>,
    /// Orchestrator identifier. Defaults to the dataset name with `__` separators.
    pub external_id: Option<String>,
    /// Cron expression.
    pub cron: Option<String>,
    /// Schedule timezone.
    pub timezone: Option<String>,
    /// Storage location of the definition artifact.
    pub artifact_location: Option<String>,
}

/// Registered pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    dataset: DatasetName,
    source_type: WorkflowSourceType,
    status: WorkflowStatus,
    owner_team: NonEmptyString,
    external_id: NonEmptyString,
    schedule: ScheduleDescriptor,
    artifact_location: Option<String>,
    pause_reason: Option<String>,
    updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates an ACTIVE workflow from a registration payload.
    pub fn register(input: WorkflowRegistration, now: DateTime<Utc>) -> AppResult<Self> {
        let WorkflowRegistration {
            dataset,
            source_type,
            owner_team,
            external_id,
            cron,
            timezone,
            artifact_location,
        } = input;

        let dataset = DatasetName::new(dataset)?;
        let owner_team = match owner_team {
            Some(team) => NonEmptyString::new(team.trim())?,
            None => NonEmptyString::new(dataset.team())?,
        };
        let external_id = match external_id {
            Some(value) => NonEmptyString::new(value.trim())?,
            None => NonEmptyString::new(dataset.default_external_id())?,
        };

        Ok(Self {
            dataset,
            source_type,
            status: WorkflowStatus::Active,
            owner_team,
            external_id,
            schedule: ScheduleDescriptor::new(cron, timezone)?,
            artifact_location: normalize_optional(artifact_location),
            pause_reason: None,
            updated_at: now,
        })
    }

    /// Rehydrates a persisted workflow.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        dataset: DatasetName,
        source_type: WorkflowSourceType,
        status: WorkflowStatus,
        owner_team: String,
        external_id: String,
        schedule: ScheduleDescriptor,
        artifact_location: Option<String>,
        pause_reason: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            dataset,
            source_type,
            status,
            owner_team: NonEmptyString::new(owner_team)?,
            external_id: NonEmptyString::new(external_id)?,
            schedule,
            artifact_location,
            pause_reason,
            updated_at,
        })
    }

    /// ACTIVE → PAUSED.
    pub fn pause(&mut self, reason: Option<String>, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != WorkflowStatus::Active {
            return Err(self.invalid("pause"));
        }

        self.status = WorkflowStatus::Paused;
        self.pause_reason = normalize_optional(reason);
        self.updated_at = now;
        Ok(())
    }

    /// PAUSED → ACTIVE.
    pub fn unpause(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != WorkflowStatus::Paused {
            return Err(self.invalid("unpause"));
        }

        self.status = WorkflowStatus::Active;
        self.pause_reason = None;
        self.updated_at = now;
        Ok(())
    }

    /// ACTIVE or PAUSED → DISABLED. Disabled is terminal.
    pub fn disable(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status == WorkflowStatus::Disabled {
            return Err(self.invalid("disable"));
        }

        self.status = WorkflowStatus::Disabled;
        self.pause_reason = None;
        self.updated_at = now;
        Ok(())
    }

    /// Takes over a code-managed definition, which wins over a manual one.
    pub fn adopt_code_definition(
        &mut self,
        schedule: ScheduleDescriptor,
        artifact_location: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        if self.status == WorkflowStatus::Disabled {
            return Err(self.invalid("adopt_code_definition"));
        }

        let artifact_location = normalize_optional(artifact_location);
        let changed = self.source_type != WorkflowSourceType::Code
            || self.schedule != schedule
            || self.artifact_location != artifact_location;
        if changed {
            self.source_type = WorkflowSourceType::Code;
            self.schedule = schedule;
            self.artifact_location = artifact_location;
            self.updated_at = now;
        }

        Ok(changed)
    }

    /// Falls back to MANUAL after the code-managed definition disappeared.
    pub fn release_code_definition(&mut self, now: DateTime<Utc>) -> bool {
        if self.source_type != WorkflowSourceType::Code {
            return false;
        }

        self.source_type = WorkflowSourceType::Manual;
        self.artifact_location = None;
        self.updated_at = now;
        true
    }

    /// Returns whether new PENDING runs may be created.
    #[must_use]
    pub fn can_run(&self) -> bool {
        self.status == WorkflowStatus::Active
    }

    /// Returns the dataset name.
    #[must_use]
    pub fn dataset(&self) -> &DatasetName {
        &self.dataset
    }

    /// Returns the definition source.
    #[must_use]
    pub fn source_type(&self) -> WorkflowSourceType {
        self.source_type
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Returns the owning team.
    #[must_use]
    pub fn owner_team(&self) -> &str {
        self.owner_team.as_str()
    }

    /// Returns the orchestrator identifier.
    #[must_use]
    pub fn external_id(&self) -> &str {
        self.external_id.as_str()
    }

    /// Returns the schedule descriptor.
    #[must_use]
    pub fn schedule(&self) -> &ScheduleDescriptor {
        &self.schedule
    }

    /// Returns the definition artifact location.
    #[must_use]
    pub fn artifact_location(&self) -> Option<&str> {
        self.artifact_location.as_deref()
    }

    /// Returns the reason recorded with the last pause.
    #[must_use]
    pub fn pause_reason(&self) -> Option<&str> {
        self.pause_reason.as_deref()
    }

    /// Returns the last modification timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn invalid(&self, operation: &'static str) -> AppError {
        AppError::InvalidWorkflowTransition {
            current_status: self.status.as_str().to_owned(),
            operation,
        }
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim().to_owned();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}
