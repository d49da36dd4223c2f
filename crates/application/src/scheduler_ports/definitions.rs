use async_trait::async_trait;
use orbit_core::AppResult;

/// One code-managed workflow definition found in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDefinition {
    /// Three-part dataset name.
    pub dataset: String,
    /// Owning team, when the definition names one.
    pub owner_team: Option<String>,
    /// Orchestrator identifier, when the definition names one.
    pub external_id: Option<String>,
    /// Cron expression.
    pub cron: Option<String>,
    /// Schedule timezone.
    pub timezone: Option<String>,
    /// Storage location of the definition artifact.
    pub artifact_location: String,
}

/// Result of scanning definition storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionListing {
    /// Parsed definitions.
    pub definitions: Vec<CodeDefinition>,
    /// Artifacts that could not be parsed, with the reason.
    pub errors: Vec<String>,
}

/// Source of code-managed workflow definitions.
#[async_trait]
pub trait WorkflowDefinitionSource: Send + Sync {
    /// Lists every definition currently present in storage.
    async fn list_definitions(&self) -> AppResult<DefinitionListing>;
}
