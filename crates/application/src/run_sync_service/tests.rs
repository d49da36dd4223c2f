use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use orbit_core::{AppError, Clock, ManualClock};
use orbit_domain::{
    Cluster, ExternalRunId, NewRun, Run, RunStatus, RunType, Workflow, WorkflowRegistration,
    WorkflowSourceType,
};
use serde_json::Value;

use crate::cluster_registry::ClusterRegistry;
use crate::repository_ports::{RunRepository, WorkflowRepository};
use crate::test_support::{
    FakeClusterRepository, FakeRunRepository, FakeScheduler, FakeSchedulerProvider,
    FakeWorkflowRepository, cluster, cluster_id, dataset, fixed_now, manual_clock,
};

use super::{RunSyncService, SyncSettings};

const WORKFLOW_EXTERNAL_ID: &str = "team_a__sales__daily_orders";

struct Harness {
    service: RunSyncService,
    runs: Arc<FakeRunRepository>,
    cluster_a: Arc<FakeScheduler>,
    cluster_b: Arc<FakeScheduler>,
    clock: Arc<ManualClock>,
}

async fn harness_with(clusters: Vec<Cluster>, settings: SyncSettings) -> Harness {
    let runs = Arc::new(FakeRunRepository::default());
    let workflows = Arc::new(FakeWorkflowRepository::default());
    let cluster_a = Arc::new(FakeScheduler::new("cluster-a"));
    let cluster_b = Arc::new(FakeScheduler::new("cluster-b"));
    let clock = manual_clock();

    let registry = ClusterRegistry::load(
        Arc::new(FakeClusterRepository::with_clusters(clusters)),
        runs.clone(),
    )
    .await
    .unwrap_or_else(|_| unreachable!());

    let workflow = Workflow::register(
        WorkflowRegistration {
            dataset: "team_a.sales.daily_orders".to_owned(),
            source_type: WorkflowSourceType::Code,
            owner_team: None,
            external_id: None,
            cron: Some("0 6 * * *".to_owned()),
            timezone: None,
            artifact_location: None,
        },
        fixed_now(),
    )
    .unwrap_or_else(|_| unreachable!());
    assert!(workflows.insert_workflow(workflow).await.is_ok());

    let provider = FakeSchedulerProvider::default()
        .with(cluster_a.clone())
        .with(cluster_b.clone());
    let service = RunSyncService::new(
        runs.clone(),
        workflows,
        registry,
        Arc::new(provider),
        clock.clone(),
        settings,
    );

    Harness {
        service,
        runs,
        cluster_a,
        cluster_b,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(
        vec![cluster("cluster-a", "team_a"), cluster("cluster-b", "team_b")],
        SyncSettings::default(),
    )
    .await
}

/// Stores a run already linked to `external_run_id` on `cluster`.
async fn linked_run(harness: &Harness, cluster: &str, external_run_id: &str) -> Run {
    let mut run = Run::pending(
        NewRun {
            workflow: dataset("team_a.sales.daily_orders"),
            workflow_external_id: WORKFLOW_EXTERNAL_ID.to_owned(),
            cluster_id: cluster_id(cluster),
            run_type: RunType::Manual,
            triggered_by: "alice".to_owned(),
            parameters: Value::Null,
        },
        harness.clock.now(),
    )
    .unwrap_or_else(|_| unreachable!());
    assert!(
        run.assign_external_run(
            ExternalRunId::new(external_run_id).unwrap_or_else(|_| unreachable!()),
            None,
        )
        .is_ok()
    );
    harness
        .runs
        .insert_run(run)
        .await
        .unwrap_or_else(|_| unreachable!())
}

/// Stores a pending run whose trigger has not recorded an external id yet.
async fn unbound_run(harness: &Harness, cluster: &str) -> Run {
    let run = Run::pending(
        NewRun {
            workflow: dataset("team_a.sales.daily_orders"),
            workflow_external_id: WORKFLOW_EXTERNAL_ID.to_owned(),
            cluster_id: cluster_id(cluster),
            run_type: RunType::Manual,
            triggered_by: "alice".to_owned(),
            parameters: Value::Null,
        },
        harness.clock.now(),
    )
    .unwrap_or_else(|_| unreachable!());
    harness
        .runs
        .insert_run(run)
        .await
        .unwrap_or_else(|_| unreachable!())
}

async fn stored(harness: &Harness, run: &Run) -> Run {
    harness
        .runs
        .find_run(run.id())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!())
}

#[tokio::test]
async fn first_sight_creates_local_run() {
    let harness = harness().await;
    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "scheduled__2026-06-01", "running")
        .await;

    let result = harness.service.sync_cluster(&cluster_id("cluster-a")).await;

    assert!(matches!(result, Ok(ref result) if result.created == 1 && result.updated == 0));
    let runs = harness.runs.all_runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status(), RunStatus::Running);
    assert_eq!(runs[0].run_type(), RunType::Scheduled);
    assert_eq!(runs[0].triggered_by(), "orchestrator");
    assert_eq!(runs[0].cluster_id().as_str(), "cluster-a");
}

#[tokio::test]
async fn repeated_sync_is_idempotent() {
    let harness = harness().await;
    let run = linked_run(&harness, "cluster-a", "manual__1").await;
    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "success")
        .await;

    let first = harness.service.sync_cluster(&cluster_id("cluster-a")).await;
    assert!(matches!(first, Ok(ref result) if result.updated == 1));
    let after_first = stored(&harness, &run).await;

    let second = harness.service.sync_cluster(&cluster_id("cluster-a")).await;
    assert!(matches!(second, Ok(ref result) if result.updated == 0 && result.created == 0));
    let after_second = stored(&harness, &run).await;

    assert_eq!(after_first.status(), RunStatus::Success);
    assert_eq!(after_second.status(), RunStatus::Success);
    assert_eq!(after_first.ended_at(), after_second.ended_at());
    assert_eq!(harness.runs.all_runs().await.len(), 1);
}

#[tokio::test]
async fn discovered_terminal_run_is_stable_on_resync() {
    let harness = harness().await;
    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "scheduled__2026-06-01", "success")
        .await;

    let first = harness.service.sync_cluster(&cluster_id("cluster-a")).await;
    assert!(matches!(first, Ok(ref result) if result.created == 1));
    let created = harness.runs.all_runs().await;
    assert_eq!(created[0].ended_at(), Some(fixed_now()));

    harness.clock.advance(Duration::minutes(5));
    let second = harness.service.sync_cluster(&cluster_id("cluster-a")).await;
    assert!(matches!(second, Ok(ref result) if result.updated == 0 && result.created == 0));

    let runs = harness.runs.all_runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].ended_at(), Some(fixed_now()));
    assert_eq!(runs[0].status(), RunStatus::Success);
}

#[tokio::test]
async fn listed_run_binds_to_its_unbound_trigger() {
    let harness = harness().await;
    let pending = unbound_run(&harness, "cluster-a").await;
    harness
        .cluster_a
        .put_run_for(WORKFLOW_EXTERNAL_ID, "manual__7", "queued", Some(pending.id()))
        .await;

    let result = harness.service.sync_cluster(&cluster_id("cluster-a")).await;

    assert!(matches!(result, Ok(ref result) if result.created == 0 && result.updated == 1));
    assert_eq!(harness.runs.all_runs().await.len(), 1);
    let mut bound = stored(&harness, &pending).await;
    assert_eq!(
        bound.external_run_id().map(ExternalRunId::as_str),
        Some("manual__7")
    );

    // The trigger call recording the same id afterwards is a no-op.
    assert!(
        bound
            .assign_external_run(
                ExternalRunId::new("manual__7").unwrap_or_else(|_| unreachable!()),
                None,
            )
            .is_ok()
    );
    assert!(harness.runs.update_run(bound).await.is_ok());
    assert_eq!(harness.runs.all_runs().await.len(), 1);
}

#[tokio::test]
async fn listed_run_of_other_workflow_does_not_bind() {
    let harness = harness().await;
    let pending = unbound_run(&harness, "cluster-a").await;
    harness
        .cluster_a
        .put_run_for("someone_else__dag", "manual__7", "queued", Some(pending.id()))
        .await;

    let result = harness.service.sync_cluster(&cluster_id("cluster-a")).await;

    assert!(matches!(result, Ok(ref result) if result.skipped == 1 && result.updated == 0));
    assert!(stored(&harness, &pending).await.external_run_id().is_none());
}

#[tokio::test]
async fn unreachable_cluster_does_not_block_others() {
    let harness = harness().await;
    let run = linked_run(&harness, "cluster-a", "manual__1").await;
    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "success")
        .await;
    harness.cluster_b.set_unreachable(true).await;

    let result = harness.service.sync_all_clusters().await;

    assert_eq!(result.total_clusters, 2);
    assert_eq!(result.failed_clusters, 1);
    assert_eq!(result.total_updated, 1);
    assert_eq!(result.clusters[0].cluster_id, "cluster-a");
    assert!(result.clusters[0].error.is_none());
    assert!(
        result.clusters[1]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("connection refused"))
    );
    assert_eq!(stored(&harness, &run).await.status(), RunStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn slow_cluster_times_out_without_affecting_others() {
    let settings = SyncSettings::new(
        Duration::minutes(60),
        100,
        StdDuration::from_millis(100),
        100,
    )
    .unwrap_or_else(|_| unreachable!());
    let harness = harness_with(
        vec![cluster("cluster-a", "team_a"), cluster("cluster-b", "team_b")],
        settings,
    )
    .await;
    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__9", "running")
        .await;
    harness.cluster_b.set_delay(StdDuration::from_secs(5)).await;

    let result = harness.service.sync_all_clusters().await;

    assert_eq!(result.failed_clusters, 1);
    assert_eq!(result.total_created, 1);
    assert!(
        result.clusters[1]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("timed out"))
    );
}

#[tokio::test]
async fn stopping_run_completes_on_terminal_observation() {
    let harness = harness().await;
    let mut run = linked_run(&harness, "cluster-a", "manual__1").await;
    assert!(run.start(harness.clock.now()).is_ok());
    assert!(run.request_stop("ops", None, harness.clock.now()).is_ok());
    let run = harness
        .runs
        .update_run(run)
        .await
        .unwrap_or_else(|_| unreachable!());

    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "running")
        .await;
    assert!(harness.service.sync_cluster(&cluster_id("cluster-a")).await.is_ok());
    assert_eq!(stored(&harness, &run).await.status(), RunStatus::Stopping);

    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "failed")
        .await;
    assert!(harness.service.sync_cluster(&cluster_id("cluster-a")).await.is_ok());
    let stopped = stored(&harness, &run).await;
    assert_eq!(stopped.status(), RunStatus::Stopped);
    assert_eq!(stopped.stopped_by(), Some("ops"));
}

#[tokio::test]
async fn unmapped_state_degrades_and_recovers() {
    let harness = harness().await;
    let run = linked_run(&harness, "cluster-a", "manual__1").await;

    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "deferred_forever")
        .await;
    let result = harness.service.sync_cluster(&cluster_id("cluster-a")).await;
    assert!(matches!(result, Ok(ref result) if result.failed_runs == 0));
    let degraded = stored(&harness, &run).await;
    assert_eq!(degraded.status(), RunStatus::Unknown);
    assert_eq!(degraded.external_state(), Some("deferred_forever"));

    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "success")
        .await;
    assert!(harness.service.sync_cluster(&cluster_id("cluster-a")).await.is_ok());
    assert_eq!(stored(&harness, &run).await.status(), RunStatus::Success);
}

#[tokio::test]
async fn runs_of_unregistered_workflows_are_skipped() {
    let harness = harness().await;
    harness
        .cluster_a
        .put_run("someone_else__dag", "scheduled__1", "running")
        .await;
    harness
        .cluster_a
        .put_run("someone_else__dag", "scheduled__2", "success")
        .await;

    let result = harness.service.sync_cluster(&cluster_id("cluster-a")).await;

    assert!(matches!(result, Ok(ref result) if result.skipped == 2 && result.created == 0));
    assert!(harness.runs.all_runs().await.is_empty());
}

#[tokio::test]
async fn same_external_id_on_two_clusters_stays_separate() {
    let harness = harness().await;
    let on_a = linked_run(&harness, "cluster-a", "manual__1").await;
    let on_b = linked_run(&harness, "cluster-b", "manual__1").await;
    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "success")
        .await;
    harness
        .cluster_b
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "failed")
        .await;

    let result = harness.service.sync_all_clusters().await;

    assert_eq!(result.total_updated, 2);
    assert_eq!(stored(&harness, &on_a).await.status(), RunStatus::Success);
    assert_eq!(stored(&harness, &on_b).await.status(), RunStatus::Failed);
}

#[tokio::test]
async fn stale_runs_are_repaired_per_owning_cluster() {
    let harness = harness().await;
    let stale = linked_run(&harness, "cluster-a", "manual__1").await;
    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "success")
        .await;
    harness.cluster_b.set_unreachable(true).await;

    harness.clock.advance(Duration::minutes(20));
    let result = harness.service.sync_stale_runs(Duration::minutes(10)).await;

    assert!(matches!(
        result,
        Ok(ref result) if result.stale_runs == 1
            && result.total_clusters == 1
            && result.total_updated == 1
            && result.failed_clusters == 0
    ));
    let repaired = stored(&harness, &stale).await;
    assert_eq!(repaired.status(), RunStatus::Success);
    assert_eq!(repaired.last_synced_at(), Some(harness.clock.now()));

    let again = harness.service.sync_stale_runs(Duration::minutes(10)).await;
    assert!(matches!(again, Ok(ref result) if result.stale_runs == 0));
}

#[tokio::test]
async fn unbound_runs_do_not_starve_stale_repair() {
    let settings = SyncSettings::new(Duration::minutes(60), 100, StdDuration::from_secs(5), 2)
        .unwrap_or_else(|_| unreachable!());
    let harness = harness_with(
        vec![cluster("cluster-a", "team_a"), cluster("cluster-b", "team_b")],
        settings,
    )
    .await;
    let stale = linked_run(&harness, "cluster-a", "manual__1").await;
    let _unbound = unbound_run(&harness, "cluster-a").await;
    let _unbound_too = unbound_run(&harness, "cluster-b").await;
    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "success")
        .await;

    harness.clock.advance(Duration::minutes(20));
    let result = harness.service.sync_stale_runs(Duration::minutes(10)).await;

    assert!(matches!(
        result,
        Ok(ref result) if result.stale_runs == 1 && result.total_updated == 1
    ));
    assert_eq!(stored(&harness, &stale).await.status(), RunStatus::Success);
}

#[tokio::test]
async fn stale_runs_on_inactive_clusters_are_not_selected() {
    let mut inactive = cluster("cluster-b", "team_b");
    inactive.deactivate();
    let settings = SyncSettings::new(Duration::minutes(60), 100, StdDuration::from_secs(5), 1)
        .unwrap_or_else(|_| unreachable!());
    let harness = harness_with(vec![cluster("cluster-a", "team_a"), inactive], settings).await;
    let _parked = linked_run(&harness, "cluster-b", "manual__0").await;
    harness.clock.advance(Duration::minutes(1));
    let stale = linked_run(&harness, "cluster-a", "manual__1").await;
    harness
        .cluster_a
        .put_run(WORKFLOW_EXTERNAL_ID, "manual__1", "failed")
        .await;

    harness.clock.advance(Duration::minutes(20));
    let result = harness.service.sync_stale_runs(Duration::minutes(10)).await;

    assert!(matches!(
        result,
        Ok(ref result) if result.stale_runs == 1 && result.total_clusters == 1
    ));
    assert_eq!(stored(&harness, &stale).await.status(), RunStatus::Failed);
}

#[tokio::test]
async fn stale_sync_rejects_non_positive_threshold() {
    let harness = harness().await;
    let result = harness.service.sync_stale_runs(Duration::zero()).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn inactive_cluster_cannot_be_synced_directly() {
    let mut inactive = cluster("cluster-b", "team_b");
    inactive.deactivate();
    let harness = harness_with(
        vec![cluster("cluster-a", "team_a"), inactive],
        SyncSettings::default(),
    )
    .await;

    let direct = harness.service.sync_cluster(&cluster_id("cluster-b")).await;
    assert!(matches!(direct, Err(AppError::Conflict(_))));

    let all = harness.service.sync_all_clusters().await;
    assert_eq!(all.total_clusters, 1);
}

#[test]
fn settings_reject_zero_values() {
    assert!(SyncSettings::new(Duration::zero(), 1, StdDuration::from_secs(1), 1).is_err());
    assert!(SyncSettings::new(Duration::minutes(1), 0, StdDuration::from_secs(1), 1).is_err());
    assert!(SyncSettings::new(Duration::minutes(1), 1, StdDuration::ZERO, 1).is_err());
}
