use orbit_application::RegisterClusterInput;
use orbit_domain::Cluster;
use serde::{Deserialize, Serialize};

/// Incoming payload for cluster registration.
#[derive(Debug, Deserialize)]
pub struct RegisterClusterRequest {
    pub cluster_id: String,
    pub team: String,
    pub endpoint: String,
}

impl From<RegisterClusterRequest> for RegisterClusterInput {
    fn from(value: RegisterClusterRequest) -> Self {
        Self {
            cluster_id: value.cluster_id,
            team: value.team,
            endpoint: value.endpoint,
        }
    }
}

/// API representation of a cluster.
#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    pub cluster_id: String,
    pub team: String,
    pub endpoint: String,
    pub is_active: bool,
}

impl From<Cluster> for ClusterResponse {
    fn from(value: Cluster) -> Self {
        Self {
            cluster_id: value.id().to_string(),
            team: value.team().to_owned(),
            endpoint: value.endpoint().to_owned(),
            is_active: value.is_active(),
        }
    }
}
