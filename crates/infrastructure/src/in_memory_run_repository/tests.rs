use chrono::{DateTime, Duration, TimeZone, Utc};
use orbit_application::RunRepository;
use orbit_core::AppError;
use orbit_domain::{
    ClusterId, DatasetName, ExternalRunId, ExternalRunKey, NewRun, Run, RunType,
};
use serde_json::Value;

use super::InMemoryRunRepository;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

fn pending_run(cluster: &str, created_at: DateTime<Utc>) -> Run {
    Run::pending(
        NewRun {
            workflow: DatasetName::new("team_a.sales.daily_orders")
                .unwrap_or_else(|_| unreachable!()),
            workflow_external_id: "team_a__sales__daily_orders".to_owned(),
            cluster_id: ClusterId::new(cluster).unwrap_or_else(|_| unreachable!()),
            run_type: RunType::Manual,
            triggered_by: "alice".to_owned(),
            parameters: Value::Null,
        },
        created_at,
    )
    .unwrap_or_else(|_| unreachable!())
}

fn external(value: &str) -> ExternalRunId {
    ExternalRunId::new(value).unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn update_requires_current_version() {
    let repository = InMemoryRunRepository::new();
    let stored = repository
        .insert_run(pending_run("cluster-a", now()))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.version(), 1);

    let mut first = stored.clone();
    assert!(first.start(now()).is_ok());
    let written = repository.update_run(first).await;
    assert!(matches!(written, Ok(ref run) if run.version() == 2));

    let mut stale = stored;
    assert!(stale.fail(now()).is_ok());
    let rejected = repository.update_run(stale).await;
    assert!(matches!(rejected, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn external_keys_are_scoped_by_cluster() {
    let repository = InMemoryRunRepository::new();

    let mut on_a = pending_run("cluster-a", now());
    assert!(on_a.assign_external_run(external("manual__1"), None).is_ok());
    let mut on_b = pending_run("cluster-b", now());
    assert!(on_b.assign_external_run(external("manual__1"), None).is_ok());

    assert!(repository.insert_run(on_a.clone()).await.is_ok());
    assert!(repository.insert_run(on_b.clone()).await.is_ok());

    let key = ExternalRunKey::new(
        ClusterId::new("cluster-b").unwrap_or_else(|_| unreachable!()),
        external("manual__1"),
    );
    let found = repository.find_run_by_external_key(&key).await;
    assert!(matches!(found, Ok(Some(ref run)) if run.id() == on_b.id()));

    let mut duplicate = pending_run("cluster-a", now());
    assert!(duplicate.assign_external_run(external("manual__1"), None).is_ok());
    let rejected = repository.insert_run(duplicate).await;
    assert!(matches!(rejected, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn stale_listing_skips_fresh_terminal_and_unreachable_runs() {
    let repository = InMemoryRunRepository::new();
    let bound = |cluster: &str, external_run_id: &str| {
        let mut run = pending_run(cluster, now());
        assert!(run.assign_external_run(external(external_run_id), None).is_ok());
        run
    };

    let never_synced = bound("cluster-a", "manual__1");
    let mut fresh = bound("cluster-a", "manual__2");
    fresh.touch_synced(now());
    let mut old = bound("cluster-a", "manual__3");
    old.touch_synced(now() - Duration::hours(2));
    let mut finished = bound("cluster-a", "manual__4");
    assert!(finished.fail(now()).is_ok());
    let unbound = pending_run("cluster-a", now());
    let elsewhere = bound("cluster-b", "manual__5");

    for run in [
        never_synced.clone(),
        fresh,
        old.clone(),
        finished,
        unbound,
        elsewhere,
    ] {
        assert!(repository.insert_run(run).await.is_ok());
    }

    let clusters = [ClusterId::new("cluster-a").unwrap_or_else(|_| unreachable!())];
    let stale = repository
        .list_stale_runs(now() - Duration::minutes(10), &clusters, 10)
        .await
        .unwrap_or_default();
    let ids: Vec<_> = stale.iter().map(Run::id).collect();

    assert_eq!(ids, vec![never_synced.id(), old.id()]);
}

#[tokio::test]
async fn workflow_listing_is_newest_first_and_limited() {
    let repository = InMemoryRunRepository::new();
    let older = pending_run("cluster-a", now() - Duration::hours(1));
    let newer = pending_run("cluster-a", now());
    assert!(repository.insert_run(older).await.is_ok());
    assert!(repository.insert_run(newer.clone()).await.is_ok());

    let dataset =
        DatasetName::new("team_a.sales.daily_orders").unwrap_or_else(|_| unreachable!());
    let listed = repository
        .list_runs_for_workflow(&dataset, 1)
        .await
        .unwrap_or_default();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), newer.id());
}

#[tokio::test]
async fn runs_are_counted_per_cluster() {
    let repository = InMemoryRunRepository::new();
    for cluster in ["cluster-a", "cluster-a", "cluster-b"] {
        assert!(repository.insert_run(pending_run(cluster, now())).await.is_ok());
    }

    let cluster_a = ClusterId::new("cluster-a").unwrap_or_else(|_| unreachable!());
    let cluster_c = ClusterId::new("cluster-c").unwrap_or_else(|_| unreachable!());
    assert!(matches!(repository.count_runs_for_cluster(&cluster_a).await, Ok(2)));
    assert!(matches!(repository.count_runs_for_cluster(&cluster_c).await, Ok(0)));
}
