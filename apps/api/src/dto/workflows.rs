use chrono::{DateTime, Utc};
use orbit_application::CodeDefinition;
use orbit_core::AppResult;
use orbit_domain::{Workflow, WorkflowRegistration, WorkflowSourceType};
use serde::{Deserialize, Serialize};

/// Incoming payload for workflow registration.
#[derive(Debug, Deserialize)]
pub struct RegisterWorkflowRequest {
    pub dataset: String,
    pub source_type: Option<String>,
    pub owner_team: Option<String>,
    pub external_id: Option<String>,
    pub cron: Option<String>,
    pub timezone: Option<String>,
    pub artifact_location: Option<String>,
}

impl TryFrom<RegisterWorkflowRequest> for WorkflowRegistration {
    type Error = orbit_core::AppError;

    fn try_from(value: RegisterWorkflowRequest) -> AppResult<Self> {
        let source_type = value
            .source_type
            .as_deref()
            .map(WorkflowSourceType::parse)
            .transpose()?
            .unwrap_or(WorkflowSourceType::Manual);

        Ok(Self {
            dataset: value.dataset,
            source_type,
            owner_team: value.owner_team,
            external_id: value.external_id,
            cron: value.cron,
            timezone: value.timezone,
            artifact_location: value.artifact_location,
        })
    }
}

/// Incoming payload for a workflow pause.
#[derive(Debug, Default, Deserialize)]
pub struct PauseWorkflowRequest {
    pub reason: Option<String>,
}

/// One code-managed definition pushed by a publisher.
#[derive(Debug, Deserialize)]
pub struct CodeDefinitionRequest {
    pub dataset: String,
    pub owner_team: Option<String>,
    pub external_id: Option<String>,
    pub cron: Option<String>,
    pub timezone: Option<String>,
    pub artifact_location: String,
}

impl From<CodeDefinitionRequest> for CodeDefinition {
    fn from(value: CodeDefinitionRequest) -> Self {
        Self {
            dataset: value.dataset,
            owner_team: value.owner_team,
            external_id: value.external_id,
            cron: value.cron,
            timezone: value.timezone,
            artifact_location: value.artifact_location,
        }
    }
}

/// Incoming payload for a definition sync. Without `definitions` the last
/// published listing is synced again.
#[derive(Debug, Default, Deserialize)]
pub struct SyncDefinitionsRequest {
    pub definitions: Option<Vec<CodeDefinitionRequest>>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// API representation of a workflow.
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub dataset: String,
    pub source_type: &'static str,
    pub status: &'static str,
    pub owner_team: String,
    pub external_id: String,
    pub cron: Option<String>,
    pub timezone: String,
    pub artifact_location: Option<String>,
    pub pause_reason: Option<String>,
    pub can_run: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<Workflow> for WorkflowResponse {
    fn from(value: Workflow) -> Self {
        Self {
            dataset: value.dataset().to_string(),
            source_type: value.source_type().as_str(),
            status: value.status().as_str(),
            owner_team: value.owner_team().to_owned(),
            external_id: value.external_id().to_owned(),
            cron: value.schedule().cron().map(str::to_owned),
            timezone: value.schedule().timezone().to_owned(),
            artifact_location: value.artifact_location().map(str::to_owned),
            pause_reason: value.pause_reason().map(str::to_owned),
            can_run: value.can_run(),
            updated_at: value.updated_at(),
        }
    }
}
