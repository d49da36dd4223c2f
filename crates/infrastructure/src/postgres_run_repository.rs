use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbit_application::RunRepository;
use orbit_core::{AppError, AppResult};
use orbit_domain::{
    ClusterId, DatasetName, ExternalRunId, ExternalRunKey, Run, RunCounters, RunId, RunSnapshot,
    RunStatus, RunType, StopMetadata,
};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::postgres_errors::is_unique_violation;

/// PostgreSQL-backed run repository.
///
/// Updates are compare-and-swap on the `version` column.
#[derive(Clone)]
pub struct PostgresRunRepository {
    pool: PgPool,
}

impl PostgresRunRepository {
    /// Creates a run repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RunRow {
    id: uuid::Uuid,
    workflow: String,
    workflow_external_id: String,
    cluster_id: String,
    external_run_id: Option<String>,
    run_type: String,
    status: String,
    triggered_by: String,
    parameters: Value,
    external_state: Option<String>,
    external_url: Option<String>,
    passed_count: Option<i64>,
    failed_count: Option<i64>,
    total_count: Option<i64>,
    stop_requested_by: Option<String>,
    stop_reason: Option<String>,
    stop_requested_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    last_synced_at: Option<DateTime<Utc>>,
    version: i64,
}

const RUN_COLUMNS: &str = r#"
    id,
    workflow,
    workflow_external_id,
    cluster_id,
    external_run_id,
    run_type,
    status,
    triggered_by,
    parameters,
    external_state,
    external_url,
    passed_count,
    failed_count,
    total_count,
    stop_requested_by,
    stop_reason,
    stop_requested_at,
    created_at,
    started_at,
    ended_at,
    last_synced_at,
    version
"#;

fn count_from_column(value: i64, column: &str) -> AppResult<u32> {
    u32::try_from(value).map_err(|error| {
        AppError::Internal(format!("stored {column} '{value}' is out of range: {error}"))
    })
}

fn run_from_row(row: RunRow) -> AppResult<Run> {
    let counters = match (row.passed_count, row.failed_count, row.total_count) {
        (Some(passed), Some(failed), Some(total)) => Some(RunCounters::new(
            count_from_column(passed, "passed_count")?,
            count_from_column(failed, "failed_count")?,
            count_from_column(total, "total_count")?,
        )?),
        _ => None,
    };

    let stop = match (row.stop_requested_by, row.stop_requested_at) {
        (Some(requested_by), Some(requested_at)) => Some(StopMetadata {
            requested_by,
            reason: row.stop_reason,
            requested_at,
        }),
        _ => None,
    };

    let version = u64::try_from(row.version).map_err(|error| {
        AppError::Internal(format!("stored run version is negative: {error}"))
    })?;

    Ok(Run::from_snapshot(RunSnapshot {
        id: RunId::from_uuid(row.id),
        workflow: DatasetName::new(row.workflow)?,
        workflow_external_id: row.workflow_external_id,
        cluster_id: ClusterId::new(row.cluster_id)?,
        status: RunStatus::parse(row.status.as_str())?,
        run_type: RunType::parse(row.run_type.as_str())?,
        triggered_by: row.triggered_by,
        parameters: row.parameters,
        started_at: row.started_at,
        ended_at: row.ended_at,
        stop,
        external_run_id: row.external_run_id.map(ExternalRunId::new).transpose()?,
        external_state: row.external_state,
        external_url: row.external_url,
        last_synced_at: row.last_synced_at,
        counters,
        created_at: row.created_at,
        version,
    }))
}

fn version_to_column(version: u64) -> AppResult<i64> {
    i64::try_from(version)
        .map_err(|error| AppError::Internal(format!("run version overflow: {error}")))
}

fn conflict_or_internal(error: sqlx::Error, run_id: RunId, action: &str) -> AppError {
    if is_unique_violation(&error) {
        AppError::Conflict(format!(
            "run '{run_id}' collides with an existing run or external run id"
        ))
    } else {
        AppError::Internal(format!("failed to {action} run '{run_id}': {error}"))
    }
}

#[async_trait]
impl RunRepository for PostgresRunRepository {
    async fn insert_run(&self, run: Run) -> AppResult<Run> {
        let snapshot = run.with_version(1).to_snapshot();
        let row = sqlx::query_as::<_, RunRow>(&format!(
            r#"
            INSERT INTO workflow_runs (
                id,
                workflow,
                workflow_external_id,
                cluster_id,
                external_run_id,
                run_type,
                status,
                triggered_by,
                parameters,
                external_state,
                external_url,
                passed_count,
                failed_count,
                total_count,
                stop_requested_by,
                stop_reason,
                stop_requested_at,
                created_at,
                started_at,
                ended_at,
                last_synced_at,
                version
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
            )
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(snapshot.id.as_uuid())
        .bind(snapshot.workflow.as_str())
        .bind(snapshot.workflow_external_id.as_str())
        .bind(snapshot.cluster_id.as_str())
        .bind(snapshot.external_run_id.as_ref().map(ExternalRunId::as_str))
        .bind(snapshot.run_type.as_str())
        .bind(snapshot.status.as_str())
        .bind(snapshot.triggered_by.as_str())
        .bind(&snapshot.parameters)
        .bind(snapshot.external_state.as_deref())
        .bind(snapshot.external_url.as_deref())
        .bind(snapshot.counters.map(|counters| i64::from(counters.passed())))
        .bind(snapshot.counters.map(|counters| i64::from(counters.failed())))
        .bind(snapshot.counters.map(|counters| i64::from(counters.total())))
        .bind(snapshot.stop.as_ref().map(|stop| stop.requested_by.as_str()))
        .bind(snapshot.stop.as_ref().and_then(|stop| stop.reason.as_deref()))
        .bind(snapshot.stop.as_ref().map(|stop| stop.requested_at))
        .bind(snapshot.created_at)
        .bind(snapshot.started_at)
        .bind(snapshot.ended_at)
        .bind(snapshot.last_synced_at)
        .bind(version_to_column(snapshot.version)?)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| conflict_or_internal(error, snapshot.id, "insert"))?;

        run_from_row(row)
    }

    async fn update_run(&self, run: Run) -> AppResult<Run> {
        let snapshot = run.to_snapshot();
        let row = sqlx::query_as::<_, RunRow>(&format!(
            r#"
            UPDATE workflow_runs
            SET
                external_run_id = $3,
                status = $4,
                external_state = $5,
                external_url = $6,
                passed_count = $7,
                failed_count = $8,
                total_count = $9,
                stop_requested_by = $10,
                stop_reason = $11,
                stop_requested_at = $12,
                started_at = $13,
                ended_at = $14,
                last_synced_at = $15,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(snapshot.id.as_uuid())
        .bind(version_to_column(snapshot.version)?)
        .bind(snapshot.external_run_id.as_ref().map(ExternalRunId::as_str))
        .bind(snapshot.status.as_str())
        .bind(snapshot.external_state.as_deref())
        .bind(snapshot.external_url.as_deref())
        .bind(snapshot.counters.map(|counters| i64::from(counters.passed())))
        .bind(snapshot.counters.map(|counters| i64::from(counters.failed())))
        .bind(snapshot.counters.map(|counters| i64::from(counters.total())))
        .bind(snapshot.stop.as_ref().map(|stop| stop.requested_by.as_str()))
        .bind(snapshot.stop.as_ref().and_then(|stop| stop.reason.as_deref()))
        .bind(snapshot.stop.as_ref().map(|stop| stop.requested_at))
        .bind(snapshot.started_at)
        .bind(snapshot.ended_at)
        .bind(snapshot.last_synced_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| conflict_or_internal(error, snapshot.id, "update"))?;

        match row {
            Some(row) => run_from_row(row),
            None if self.find_run(snapshot.id).await?.is_some() => Err(AppError::Conflict(
                format!("run '{}' was modified concurrently", snapshot.id),
            )),
            None => Err(AppError::RunNotFound(snapshot.id.to_string())),
        }
    }

    async fn find_run(&self, run_id: RunId) -> AppResult<Option<Run>> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM workflow_runs WHERE id = $1"
        ))
        .bind(run_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find run '{run_id}': {error}")))?;

        row.map(run_from_row).transpose()
    }

    async fn find_run_by_external_key(&self, key: &ExternalRunKey) -> AppResult<Option<Run>> {
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM workflow_runs WHERE cluster_id = $1 AND external_run_id = $2"
        ))
        .bind(key.cluster_id.as_str())
        .bind(key.external_run_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find external run '{}' on cluster '{}': {error}",
                key.external_run_id, key.cluster_id
            ))
        })?;

        row.map(run_from_row).transpose()
    }

    async fn list_runs_for_workflow(
        &self,
        workflow: &DatasetName,
        limit: usize,
    ) -> AppResult<Vec<Run>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM workflow_runs
            WHERE workflow = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(workflow.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list runs for '{workflow}': {error}"))
        })?;

        rows.into_iter().map(run_from_row).collect()
    }

    async fn list_stale_runs(
        &self,
        synced_before: DateTime<Utc>,
        clusters: &[ClusterId],
        limit: usize,
    ) -> AppResult<Vec<Run>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let clusters: Vec<String> = clusters.iter().map(ToString::to_string).collect();
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM workflow_runs
            WHERE status NOT IN ('SUCCESS', 'FAILED', 'STOPPED', 'SKIPPED', 'TIMEOUT')
              AND (last_synced_at IS NULL OR last_synced_at < $1)
              AND external_run_id IS NOT NULL
              AND cluster_id = ANY($2)
            ORDER BY last_synced_at NULLS FIRST
            LIMIT $3
            "#
        ))
        .bind(synced_before)
        .bind(clusters)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list stale runs: {error}")))?;

        rows.into_iter().map(run_from_row).collect()
    }

    async fn count_runs_for_cluster(&self, cluster_id: &ClusterId) -> AppResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM workflow_runs WHERE cluster_id = $1")
                .bind(cluster_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|error| {
                    AppError::Internal(format!(
                        "failed to count runs for cluster '{cluster_id}': {error}"
                    ))
                })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
