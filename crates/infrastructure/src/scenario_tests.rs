//! End-to-end flows over in-memory adapters and the simulated estate.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use orbit_application::{
    ClusterRegistry, RunLifecycleService, RunSyncService, SyncSettings, TriggerRunInput,
    WorkflowRegistryService,
};
use orbit_core::{AppError, Clock, ManualClock};
use orbit_domain::{
    Cluster, ClusterId, RunCounters, RunStatus, RunType, Workflow, WorkflowRegistration,
    WorkflowSourceType,
};
use serde_json::json;

use crate::{
    FakeSchedulerEstate, FakeSchedulerSettings, InMemoryClusterRepository,
    InMemoryRunRepository, InMemoryWorkflowRepository,
};

struct Orbit {
    clock: Arc<ManualClock>,
    estate: FakeSchedulerEstate,
    workflows: WorkflowRegistryService,
    lifecycle: RunLifecycleService,
    sync: RunSyncService,
}

async fn orbit() -> Orbit {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!()),
    ));
    let estate = FakeSchedulerEstate::new(clock.clone(), FakeSchedulerSettings::default());
    let runs = Arc::new(InMemoryRunRepository::new());
    let workflow_repository = Arc::new(InMemoryWorkflowRepository::new());
    let clusters = ClusterRegistry::load(
        Arc::new(InMemoryClusterRepository::with_clusters(vec![
            Cluster::new("cluster-a", "team_a", "memory://cluster-a", true)
                .unwrap_or_else(|_| unreachable!()),
            Cluster::new("cluster-b", "team_b", "memory://cluster-b", true)
                .unwrap_or_else(|_| unreachable!()),
        ])),
        runs.clone(),
    )
    .await
    .unwrap_or_else(|_| unreachable!());
    let schedulers = Arc::new(estate.clone());

    Orbit {
        workflows: WorkflowRegistryService::new(
            workflow_repository.clone(),
            clusters.clone(),
            schedulers.clone(),
            clock.clone(),
        ),
        lifecycle: RunLifecycleService::new(
            runs.clone(),
            workflow_repository.clone(),
            clusters.clone(),
            schedulers.clone(),
            clock.clone(),
        ),
        sync: RunSyncService::new(
            runs,
            workflow_repository,
            clusters,
            schedulers,
            clock.clone(),
            SyncSettings::default(),
        ),
        clock,
        estate,
    }
}

fn cluster_id(value: &str) -> ClusterId {
    ClusterId::new(value).unwrap_or_else(|_| unreachable!())
}

impl Orbit {
    async fn register(&self, dataset: &str) -> Workflow {
        self.workflows
            .register_workflow(WorkflowRegistration {
                dataset: dataset.to_owned(),
                source_type: WorkflowSourceType::Manual,
                owner_team: None,
                external_id: None,
                cron: None,
                timezone: None,
                artifact_location: None,
            })
            .await
            .unwrap_or_else(|_| unreachable!())
    }

    fn manual_trigger(&self) -> TriggerRunInput {
        TriggerRunInput {
            triggered_by: "alice".to_owned(),
            parameters: json!({ "full_refresh": false }),
            logical_date: None,
            run_type: RunType::Manual,
        }
    }
}

#[tokio::test]
async fn manual_run_is_driven_to_success() {
    let orbit = orbit().await;
    orbit.register("team_a.sales.daily_orders").await;

    let run = orbit
        .lifecycle
        .trigger_run("team_a.sales.daily_orders", orbit.manual_trigger())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(run.status(), RunStatus::Pending);
    assert_eq!(run.cluster_id().as_str(), "cluster-a");
    assert!(run.external_run_id().is_some());

    let started = orbit
        .lifecycle
        .start_run(run.id())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(started.status(), RunStatus::Running);

    let counters = RunCounters::new(10, 0, 10).unwrap_or_else(|_| unreachable!());
    let finished = orbit
        .lifecycle
        .complete_run(run.id(), Some(counters))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(finished.status(), RunStatus::Success);
    assert_eq!(finished.pass_rate(), Some(1.0));
    assert!(finished.ended_at().is_some());
}

#[tokio::test]
async fn triggered_run_follows_orchestrator_through_sync() {
    let orbit = orbit().await;
    orbit.register("team_a.sales.daily_orders").await;
    let run = orbit
        .lifecycle
        .trigger_run("team_a.sales.daily_orders", orbit.manual_trigger())
        .await
        .unwrap_or_else(|_| unreachable!());

    orbit.clock.advance(Duration::minutes(1));
    orbit.estate.advance().await;
    let result = orbit.sync.sync_all_clusters().await;
    assert_eq!(result.total_created, 0);
    let running = orbit
        .lifecycle
        .get_run(run.id())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(running.status(), RunStatus::Running);

    orbit.clock.advance(Duration::minutes(1));
    orbit.estate.advance().await;
    orbit.sync.sync_all_clusters().await;
    let finished = orbit
        .lifecycle
        .get_run(run.id())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(finished.status(), RunStatus::Success);
    assert_eq!(finished.last_synced_at(), Some(orbit.clock.now()));

    let tasks = orbit
        .lifecycle
        .list_task_instances(run.id())
        .await
        .unwrap_or_default();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].state.as_deref(), Some("success"));
}

#[tokio::test]
async fn cluster_outage_is_isolated_during_aggregate_sync() {
    let orbit = orbit().await;
    let team_a = orbit.register("team_a.sales.daily_orders").await;
    let team_b = orbit.register("team_b.finance.ledger").await;
    let cluster_a = cluster_id("cluster-a");
    let cluster_b = cluster_id("cluster-b");

    for (cluster, workflow) in [(&cluster_a, &team_a), (&cluster_b, &team_b)] {
        assert!(
            orbit
                .estate
                .seed_run(cluster, workflow.external_id(), "scheduled__1", "running")
                .await
                .is_ok()
        );
    }
    let first = orbit.sync.sync_all_clusters().await;
    assert_eq!(first.total_created, 2);

    orbit.estate.set_reachable(&cluster_a, false).await;
    orbit.clock.advance(Duration::minutes(5));
    assert!(
        orbit
            .estate
            .seed_run(&cluster_b, team_b.external_id(), "scheduled__1", "success")
            .await
            .is_ok()
    );

    let result = orbit.sync.sync_all_clusters().await;

    assert_eq!(result.total_clusters, 2);
    assert_eq!(result.failed_clusters, 1);
    assert_eq!(result.total_updated, 1);
    assert!(result.clusters[0].is_failure());
    assert_eq!(result.clusters[1].cluster_id, "cluster-b");
    assert_eq!(result.clusters[1].updated, 1);

    let ledger_runs = orbit
        .lifecycle
        .list_runs("team_b.finance.ledger", 10)
        .await
        .unwrap_or_default();
    assert_eq!(ledger_runs.len(), 1);
    assert_eq!(ledger_runs[0].status(), RunStatus::Success);
}

#[tokio::test]
async fn operator_stop_is_recorded_and_final() {
    let orbit = orbit().await;
    orbit.register("team_a.sales.daily_orders").await;
    let run = orbit
        .lifecycle
        .trigger_run("team_a.sales.daily_orders", orbit.manual_trigger())
        .await
        .unwrap_or_else(|_| unreachable!());

    let stopping = orbit
        .lifecycle
        .request_stop(run.id(), "ops", Some("manual kill".to_owned()))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stopping.status(), RunStatus::Stopping);
    assert_eq!(stopping.stopped_by(), Some("ops"));

    let stopped = orbit
        .lifecycle
        .complete_stop(run.id())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stopped.status(), RunStatus::Stopped);
    assert!(stopped.ended_at().is_some());

    let again = orbit
        .lifecycle
        .request_stop(run.id(), "ops", None)
        .await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));
}

#[tokio::test]
async fn stop_request_resolves_through_sync() {
    let orbit = orbit().await;
    orbit.register("team_a.sales.daily_orders").await;
    let run = orbit
        .lifecycle
        .trigger_run("team_a.sales.daily_orders", orbit.manual_trigger())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(
        orbit
            .lifecycle
            .request_stop(run.id(), "ops", None)
            .await
            .is_ok()
    );
    orbit.clock.advance(Duration::seconds(10));
    orbit.sync.sync_all_clusters().await;

    let stopped = orbit
        .lifecycle
        .get_run(run.id())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stopped.status(), RunStatus::Stopped);
}
