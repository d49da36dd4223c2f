use std::sync::Arc;

use chrono::NaiveDate;
use orbit_core::{AppError, Clock, ManualClock};
use orbit_domain::{Backfill, BackfillState, Workflow, WorkflowRegistration, WorkflowSourceType};

use crate::cluster_registry::ClusterRegistry;
use crate::repository_ports::{BackfillRepository, WorkflowRepository};
use crate::test_support::{
    FakeBackfillRepository, FakeClusterRepository, FakeRunRepository, FakeScheduler,
    FakeSchedulerProvider, FakeWorkflowRepository, cluster, dataset, fixed_now, manual_clock,
};

use super::{BackfillLimits, BackfillService, CreateBackfillInput, apply_backfill_with_retry};

struct Harness {
    service: BackfillService,
    backfills: Arc<FakeBackfillRepository>,
    workflows: Arc<FakeWorkflowRepository>,
    cluster_a: Arc<FakeScheduler>,
    cluster_b: Arc<FakeScheduler>,
    clock: Arc<ManualClock>,
}

async fn harness_with_limits(limits: BackfillLimits) -> Harness {
    let workflows = Arc::new(FakeWorkflowRepository::default());
    let cluster_a = Arc::new(FakeScheduler::new("cluster-a"));
    let cluster_b = Arc::new(FakeScheduler::new("cluster-b"));
    let clock = manual_clock();

    let registry = ClusterRegistry::load(
        Arc::new(FakeClusterRepository::with_clusters(vec![
            cluster("cluster-a", "team_a"),
            cluster("cluster-b", "team_b"),
        ])),
        Arc::new(FakeRunRepository::default()),
    )
    .await
    .unwrap_or_else(|_| unreachable!());

    for name in ["team_a.sales.daily_orders", "team_b.finance.ledger"] {
        let workflow = Workflow::register(
            WorkflowRegistration {
                dataset: name.to_owned(),
                source_type: WorkflowSourceType::Manual,
                owner_team: None,
                external_id: None,
                cron: None,
                timezone: None,
                artifact_location: None,
            },
            fixed_now(),
        )
        .unwrap_or_else(|_| unreachable!());
        assert!(workflows.insert_workflow(workflow).await.is_ok());
    }

    let provider = FakeSchedulerProvider::default()
        .with(cluster_a.clone())
        .with(cluster_b.clone());
    let backfills = Arc::new(FakeBackfillRepository::default());
    let service = BackfillService::new(
        backfills.clone(),
        workflows.clone(),
        registry,
        Arc::new(provider),
        clock.clone(),
        limits,
    );

    Harness {
        service,
        backfills,
        workflows,
        cluster_a,
        cluster_b,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with_limits(BackfillLimits::default()).await
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| unreachable!())
}

fn january(dataset: &str) -> CreateBackfillInput {
    CreateBackfillInput {
        dataset: dataset.to_owned(),
        from_date: date(2026, 1, 1),
        to_date: date(2026, 2, 1),
    }
}

#[tokio::test]
async fn create_delegates_to_routed_cluster() {
    let harness = harness().await;

    let backfill = harness
        .service
        .create_backfill(january("team_b.finance.ledger"))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(backfill.state(), BackfillState::Running);
    assert!(!backfill.is_paused());
    assert_eq!(backfill.cluster_id().as_str(), "cluster-b");
    assert_eq!(backfill.range().days(), 31);
    assert_eq!(backfill.created_at(), harness.clock.now());
}

#[tokio::test]
async fn pause_keeps_state_and_rejects_repeat() {
    let harness = harness().await;
    let backfill = harness
        .service
        .create_backfill(january("team_a.sales.daily_orders"))
        .await
        .unwrap_or_else(|_| unreachable!());

    let paused = harness
        .service
        .pause_backfill(backfill.id().as_str())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(paused.is_paused());
    assert_eq!(paused.state(), BackfillState::Running);

    let again = harness.service.pause_backfill(backfill.id().as_str()).await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));

    let resumed = harness.service.unpause_backfill(backfill.id().as_str()).await;
    assert!(matches!(resumed, Ok(ref backfill) if !backfill.is_paused()));
}

#[tokio::test]
async fn pause_on_completed_backfill_fails() {
    let harness = harness().await;
    let backfill = harness
        .service
        .create_backfill(january("team_a.sales.daily_orders"))
        .await
        .unwrap_or_else(|_| unreachable!());
    harness
        .cluster_a
        .set_backfill_state(backfill.id(), "success", Some(harness.clock.now()))
        .await;

    let status = harness
        .service
        .get_status(backfill.id().as_str())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(status.state(), BackfillState::Completed);
    assert!(status.completed_at().is_some());

    let paused = harness.service.pause_backfill(backfill.id().as_str()).await;
    assert!(matches!(
        paused,
        Err(AppError::InvalidTransition { ref current_state, operation: "pause", .. })
            if current_state == "COMPLETED"
    ));
}

#[tokio::test]
async fn cancel_stamps_completion_and_is_final() {
    let harness = harness().await;
    let backfill = harness
        .service
        .create_backfill(january("team_a.sales.daily_orders"))
        .await
        .unwrap_or_else(|_| unreachable!());

    let cancelled = harness
        .service
        .cancel_backfill(backfill.id().as_str())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(cancelled.state(), BackfillState::Cancelled);
    assert_eq!(cancelled.completed_at(), Some(harness.clock.now()));

    let again = harness.service.cancel_backfill(backfill.id().as_str()).await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));

    let status = harness.service.get_status(backfill.id().as_str()).await;
    assert!(matches!(status, Ok(ref backfill) if backfill.state() == BackfillState::Cancelled));
}

#[tokio::test]
async fn poll_losing_to_cancel_keeps_cancellation() {
    let harness = harness().await;
    let backfill = harness
        .service
        .create_backfill(january("team_a.sales.daily_orders"))
        .await
        .unwrap_or_else(|_| unreachable!());
    let mut stale_copy = harness
        .service
        .list_active_backfills(None)
        .await
        .unwrap_or_default()
        .pop()
        .unwrap_or_else(|| unreachable!());

    assert!(harness.service.cancel_backfill(backfill.id().as_str()).await.is_ok());
    harness
        .cluster_a
        .set_backfill_state(backfill.id(), "success", Some(harness.clock.now()))
        .await;

    assert!(harness.service.poll(&mut stale_copy).await.is_ok());
    assert_eq!(stale_copy.state(), BackfillState::Cancelled);

    let stored = harness
        .backfills
        .find_backfill(backfill.id())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(stored.state(), BackfillState::Cancelled);
    assert_eq!(stored.last_synced_at(), Some(harness.clock.now()));
}

#[tokio::test]
async fn stale_pause_write_fails_against_cancelled_backfill() {
    let harness = harness().await;
    let backfill = harness
        .service
        .create_backfill(january("team_a.sales.daily_orders"))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(harness.service.cancel_backfill(backfill.id().as_str()).await.is_ok());

    let result = apply_backfill_with_retry(
        harness.backfills.as_ref(),
        backfill.clone(),
        Backfill::pause,
    )
    .await;

    assert!(matches!(
        result,
        Err(AppError::InvalidTransition { ref current_state, operation: "pause", .. })
            if current_state == "CANCELLED"
    ));
}

#[tokio::test]
async fn oversized_range_is_rejected() {
    let harness = harness().await;
    let result = harness
        .service
        .create_backfill(CreateBackfillInput {
            dataset: "team_a.sales.daily_orders".to_owned(),
            from_date: date(2024, 1, 1),
            to_date: date(2026, 1, 1),
        })
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn in_flight_limit_is_enforced_per_workflow() {
    let limits = BackfillLimits::new(365, 1).unwrap_or_else(|_| unreachable!());
    let harness = harness_with_limits(limits).await;

    assert!(
        harness
            .service
            .create_backfill(january("team_a.sales.daily_orders"))
            .await
            .is_ok()
    );
    let second = harness
        .service
        .create_backfill(january("team_a.sales.daily_orders"))
        .await;
    assert!(matches!(second, Err(AppError::Conflict(_))));

    let other_workflow = harness
        .service
        .create_backfill(january("team_b.finance.ledger"))
        .await;
    assert!(other_workflow.is_ok());
}

#[tokio::test]
async fn paused_workflow_cannot_be_backfilled() {
    let harness = harness().await;
    let mut workflow = harness
        .workflows
        .find_workflow(&dataset("team_a.sales.daily_orders"))
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert!(workflow.pause(None, harness.clock.now()).is_ok());
    assert!(harness.workflows.update_workflow(workflow).await.is_ok());

    let result = harness
        .service
        .create_backfill(january("team_a.sales.daily_orders"))
        .await;
    assert!(matches!(
        result,
        Err(AppError::InvalidWorkflowTransition { operation: "backfill", .. })
    ));
}

#[tokio::test]
async fn refresh_isolates_unreachable_clusters() {
    let harness = harness().await;
    let on_a = harness
        .service
        .create_backfill(january("team_a.sales.daily_orders"))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(
        harness
            .service
            .create_backfill(january("team_b.finance.ledger"))
            .await
            .is_ok()
    );
    harness
        .cluster_a
        .set_backfill_state(on_a.id(), "success", Some(harness.clock.now()))
        .await;
    harness.cluster_b.set_unreachable(true).await;

    let summary = harness
        .service
        .refresh_active_backfills()
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(summary.polled, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.failed, 1);

    let open = harness
        .service
        .list_active_backfills(None)
        .await
        .unwrap_or_default();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].cluster_id().as_str(), "cluster-b");
}

#[tokio::test]
async fn unknown_backfill_is_reported() {
    let harness = harness().await;
    let result = harness.service.get_status("bf-404").await;
    assert!(matches!(result, Err(AppError::BackfillNotFound(_))));
}

#[test]
fn limits_reject_zero_values() {
    assert!(BackfillLimits::new(0, 1).is_err());
    assert!(BackfillLimits::new(1, 0).is_err());
}
