use orbit_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Stable identifier of one orchestrator cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(NonEmptyString);

impl ClusterId {
    /// Creates a validated cluster identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        Ok(Self(NonEmptyString::new(value)?))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Run identifier assigned by the external orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalRunId(NonEmptyString);

impl ExternalRunId {
    /// Creates a validated external run identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        Ok(Self(NonEmptyString::new(value)?))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ExternalRunId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Composite key addressing one external run inside one cluster.
///
/// Orchestrators reuse run identifiers across clusters (`manual__<timestamp>`
/// style ids collide easily), so lookups always carry the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalRunKey {
    /// Cluster that owns the external run.
    pub cluster_id: ClusterId,
    /// External run identifier inside that cluster.
    pub external_run_id: ExternalRunId,
}

impl ExternalRunKey {
    /// Creates a composite key.
    #[must_use]
    pub fn new(cluster_id: ClusterId, external_run_id: ExternalRunId) -> Self {
        Self {
            cluster_id,
            external_run_id,
        }
    }
}

/// One orchestrator endpoint and the team routed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    id: ClusterId,
    team: NonEmptyString,
    endpoint: NonEmptyString,
    is_active: bool,
}

impl Cluster {
    /// Creates a validated cluster definition.
    pub fn new(
        id: impl Into<String>,
        team: impl Into<String>,
        endpoint: impl Into<String>,
        is_active: bool,
    ) -> AppResult<Self> {
        let endpoint = NonEmptyString::new(endpoint)?;
        if !(endpoint.as_str().starts_with("http://") || endpoint.as_str().starts_with("https://"))
            && !endpoint.as_str().starts_with("memory://")
        {
            return Err(AppError::Validation(format!(
                "cluster endpoint '{}' must use http, https or memory scheme",
                endpoint.as_str()
            )));
        }

        Ok(Self {
            id: ClusterId::new(id)?,
            team: NonEmptyString::new(team)?,
            endpoint,
            is_active,
        })
    }

    /// Returns the cluster identifier.
    #[must_use]
    pub fn id(&self) -> &ClusterId {
        &self.id
    }

    /// Returns the team explicitly assigned to this cluster.
    #[must_use]
    pub fn team(&self) -> &str {
        self.team.as_str()
    }

    /// Returns the orchestrator endpoint reference.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Returns whether the cluster takes part in routing and sync.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Marks the cluster inactive.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Marks the cluster active again.
    pub fn activate(&mut self) {
        self.is_active = true;
    }

    /// Assigns the cluster to another team.
    ///
    /// Callers must make sure no run still references the cluster.
    pub fn reassign_team(&mut self, team: impl Into<String>) -> AppResult<()> {
        self.team = NonEmptyString::new(team)?;
        Ok(())
    }
}

/// Extracts the owning team from a namespaced identifier.
///
/// Accepted shapes, the team being everything before the first separator:
///
/// * `team.schema.table` (dataset names, dotted DAG ids)
/// * `team__schema__table` (DAG ids generated from dataset names)
///
/// Returns `None` when the identifier carries no namespace, in which case
/// routing falls back to the first active cluster.
#[must_use]
pub fn team_from_identifier(identifier: &str) -> Option<&str> {
    let identifier = identifier.trim();
    let dot = identifier.find('.');
    let double_underscore = identifier.find("__");

    let (split_at, separator_len) = match (dot, double_underscore) {
        (Some(dot), Some(underscore)) if underscore < dot => (underscore, 2),
        (Some(dot), _) => (dot, 1),
        (None, Some(underscore)) => (underscore, 2),
        (None, None) => return None,
    };

    let team = &identifier[..split_at];
    let rest = &identifier[split_at + separator_len..];
    if team.is_empty() || rest.is_empty() {
        return None;
    }

    Some(team)
}
