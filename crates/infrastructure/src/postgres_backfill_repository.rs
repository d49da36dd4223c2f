use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use orbit_application::BackfillRepository;
use orbit_core::{AppError, AppResult};
use orbit_domain::{
    Backfill, BackfillId, BackfillSnapshot, BackfillState, ClusterId, DatasetName, DateRange,
};
use sqlx::{FromRow, PgPool};

use crate::postgres_errors::is_unique_violation;

/// PostgreSQL-backed backfill repository.
#[derive(Clone)]
pub struct PostgresBackfillRepository {
    pool: PgPool,
}

impl PostgresBackfillRepository {
    /// Creates a backfill repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct BackfillRow {
    id: String,
    workflow: String,
    workflow_external_id: String,
    cluster_id: String,
    from_date: NaiveDate,
    to_date: NaiveDate,
    state: String,
    is_paused: bool,
    external_state: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    last_synced_at: Option<DateTime<Utc>>,
    version: i64,
}

const BACKFILL_COLUMNS: &str = r#"
    id,
    workflow,
    workflow_external_id,
    cluster_id,
    from_date,
    to_date,
    state,
    is_paused,
    external_state,
    created_at,
    completed_at,
    last_synced_at,
    version
"#;

fn backfill_from_row(row: BackfillRow) -> AppResult<Backfill> {
    Ok(Backfill::from_snapshot(BackfillSnapshot {
        id: BackfillId::new(row.id)?,
        workflow: DatasetName::new(row.workflow)?,
        workflow_external_id: row.workflow_external_id,
        cluster_id: ClusterId::new(row.cluster_id)?,
        range: DateRange::new(row.from_date, row.to_date)?,
        state: BackfillState::parse(row.state.as_str())?,
        is_paused: row.is_paused,
        external_state: row.external_state,
        created_at: row.created_at,
        completed_at: row.completed_at,
        last_synced_at: row.last_synced_at,
        version: u64::try_from(row.version).map_err(|error| {
            AppError::Internal(format!("stored backfill version is negative: {error}"))
        })?,
    }))
}

fn version_to_column(version: u64) -> AppResult<i64> {
    i64::try_from(version)
        .map_err(|error| AppError::Internal(format!("backfill version overflow: {error}")))
}

#[async_trait]
impl BackfillRepository for PostgresBackfillRepository {
    async fn insert_backfill(&self, backfill: Backfill) -> AppResult<()> {
        let snapshot = backfill.to_snapshot();
        sqlx::query(
            r#"
            INSERT INTO backfills (
                id,
                workflow,
                workflow_external_id,
                cluster_id,
                from_date,
                to_date,
                state,
                is_paused,
                external_state,
                created_at,
                completed_at,
                last_synced_at,
                version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(snapshot.id.as_str())
        .bind(snapshot.workflow.as_str())
        .bind(snapshot.workflow_external_id.as_str())
        .bind(snapshot.cluster_id.as_str())
        .bind(snapshot.range.from())
        .bind(snapshot.range.to())
        .bind(snapshot.state.as_str())
        .bind(snapshot.is_paused)
        .bind(snapshot.external_state.as_deref())
        .bind(snapshot.created_at)
        .bind(snapshot.completed_at)
        .bind(snapshot.last_synced_at)
        .bind(version_to_column(snapshot.version)?)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                AppError::Conflict(format!("backfill '{}' already exists", snapshot.id))
            } else {
                AppError::Internal(format!(
                    "failed to insert backfill '{}': {error}",
                    snapshot.id
                ))
            }
        })?;

        Ok(())
    }

    async fn update_backfill(&self, backfill: Backfill) -> AppResult<Backfill> {
        let snapshot = backfill.to_snapshot();
        let row = sqlx::query_as::<_, BackfillRow>(&format!(
            r#"
            UPDATE backfills
            SET
                state = $3,
                is_paused = $4,
                external_state = $5,
                completed_at = $6,
                last_synced_at = $7,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {BACKFILL_COLUMNS}
            "#
        ))
        .bind(snapshot.id.as_str())
        .bind(version_to_column(snapshot.version)?)
        .bind(snapshot.state.as_str())
        .bind(snapshot.is_paused)
        .bind(snapshot.external_state.as_deref())
        .bind(snapshot.completed_at)
        .bind(snapshot.last_synced_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update backfill '{}': {error}",
                snapshot.id
            ))
        })?;

        match row {
            Some(row) => backfill_from_row(row),
            None if self.find_backfill(&snapshot.id).await?.is_some() => Err(
                AppError::Conflict(format!("backfill '{}' was modified concurrently", snapshot.id)),
            ),
            None => Err(AppError::BackfillNotFound(snapshot.id.to_string())),
        }
    }

    async fn find_backfill(&self, backfill_id: &BackfillId) -> AppResult<Option<Backfill>> {
        let row = sqlx::query_as::<_, BackfillRow>(&format!(
            "SELECT {BACKFILL_COLUMNS} FROM backfills WHERE id = $1"
        ))
        .bind(backfill_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find backfill '{backfill_id}': {error}"))
        })?;

        row.map(backfill_from_row).transpose()
    }

    async fn list_active_backfills(
        &self,
        workflow: Option<&DatasetName>,
    ) -> AppResult<Vec<Backfill>> {
        let rows = sqlx::query_as::<_, BackfillRow>(&format!(
            r#"
            SELECT {BACKFILL_COLUMNS}
            FROM backfills
            WHERE state IN ('QUEUED', 'RUNNING')
              AND ($1::TEXT IS NULL OR workflow = $1)
            ORDER BY created_at
            "#
        ))
        .bind(workflow.map(DatasetName::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list active backfills: {error}"))
        })?;

        rows.into_iter().map(backfill_from_row).collect()
    }
}
