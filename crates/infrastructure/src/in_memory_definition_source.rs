use async_trait::async_trait;
use orbit_application::{CodeDefinition, DefinitionListing, WorkflowDefinitionSource};
use orbit_core::AppResult;
use tokio::sync::RwLock;

/// Definition source backed by an in-process listing.
///
/// Deployments that build definitions elsewhere publish them here with
/// [`InMemoryDefinitionSource::publish`].
#[derive(Debug, Default)]
pub struct InMemoryDefinitionSource {
    listing: RwLock<DefinitionListing>,
}

impl InMemoryDefinitionSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current listing.
    pub async fn publish(&self, definitions: Vec<CodeDefinition>, errors: Vec<String>) {
        *self.listing.write().await = DefinitionListing {
            definitions,
            errors,
        };
    }
}

#[async_trait]
impl WorkflowDefinitionSource for InMemoryDefinitionSource {
    async fn list_definitions(&self) -> AppResult<DefinitionListing> {
        Ok(self.listing.read().await.clone())
    }
}
