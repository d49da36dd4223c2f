use std::sync::Arc;

use orbit_application::{ExternalSchedulerPort, SchedulerClientProvider};
use orbit_core::{AppError, AppResult};
use orbit_domain::Cluster;

/// Picks the scheduler adapter from the cluster endpoint scheme.
///
/// `http`/`https` endpoints get a REST client, `memory` endpoints are served
/// by the simulated estate when one is configured.
pub struct SchedulerClientRouter {
    http: Arc<dyn SchedulerClientProvider>,
    simulated: Option<Arc<dyn SchedulerClientProvider>>,
}

impl SchedulerClientRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(
        http: Arc<dyn SchedulerClientProvider>,
        simulated: Option<Arc<dyn SchedulerClientProvider>>,
    ) -> Self {
        Self { http, simulated }
    }
}

impl SchedulerClientProvider for SchedulerClientRouter {
    fn client_for(&self, cluster: &Cluster) -> AppResult<Arc<dyn ExternalSchedulerPort>> {
        if cluster.endpoint().starts_with("memory://") {
            return match &self.simulated {
                Some(simulated) => simulated.client_for(cluster),
                None => Err(AppError::Validation(format!(
                    "cluster '{}' uses a memory endpoint but no simulated estate is configured",
                    cluster.id()
                ))),
            };
        }

        self.http.client_for(cluster)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use orbit_application::SchedulerClientProvider;
    use orbit_core::{AppError, SystemClock};
    use orbit_domain::Cluster;

    use super::SchedulerClientRouter;
    use crate::{FakeSchedulerEstate, FakeSchedulerSettings, HttpSchedulerClientProvider, HttpSchedulerSettings};

    fn http_provider() -> Arc<dyn SchedulerClientProvider> {
        Arc::new(
            HttpSchedulerClientProvider::new(HttpSchedulerSettings::default())
                .unwrap_or_else(|_| unreachable!()),
        )
    }

    #[test]
    fn routes_by_endpoint_scheme() {
        let estate = FakeSchedulerEstate::new(Arc::new(SystemClock), FakeSchedulerSettings::default());
        let router = SchedulerClientRouter::new(http_provider(), Some(Arc::new(estate)));

        let memory = Cluster::new("cluster-a", "team_a", "memory://cluster-a", true)
            .unwrap_or_else(|_| unreachable!());
        let http = Cluster::new("cluster-b", "team_b", "https://airflow-b.internal", true)
            .unwrap_or_else(|_| unreachable!());

        assert!(router.client_for(&memory).is_ok());
        let client = router.client_for(&http).unwrap_or_else(|_| unreachable!());
        assert_eq!(client.cluster_id().as_str(), "cluster-b");
    }

    #[test]
    fn memory_endpoint_without_estate_is_rejected() {
        let router = SchedulerClientRouter::new(http_provider(), None);
        let memory = Cluster::new("cluster-a", "team_a", "memory://cluster-a", true)
            .unwrap_or_else(|_| unreachable!());

        assert!(matches!(
            router.client_for(&memory),
            Err(AppError::Validation(_))
        ));
    }
}
