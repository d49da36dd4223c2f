use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbit_application::WorkflowRepository;
use orbit_core::{AppError, AppResult};
use orbit_domain::{
    DatasetName, ScheduleDescriptor, Workflow, WorkflowSourceType, WorkflowStatus,
};
use sqlx::{FromRow, PgPool};

use crate::postgres_errors::is_unique_violation;

/// PostgreSQL-backed workflow repository.
#[derive(Clone)]
pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    /// Creates a workflow repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct WorkflowRow {
    dataset: String,
    source_type: String,
    status: String,
    owner_team: String,
    external_id: String,
    cron: Option<String>,
    timezone: String,
    artifact_location: Option<String>,
    pause_reason: Option<String>,
    updated_at: DateTime<Utc>,
}

const WORKFLOW_COLUMNS: &str = r#"
    dataset,
    source_type,
    status,
    owner_team,
    external_id,
    cron,
    timezone,
    artifact_location,
    pause_reason,
    updated_at
"#;

fn workflow_from_row(row: WorkflowRow) -> AppResult<Workflow> {
    Workflow::restore(
        DatasetName::new(row.dataset)?,
        WorkflowSourceType::parse(row.source_type.as_str())?,
        WorkflowStatus::parse(row.status.as_str())?,
        row.owner_team,
        row.external_id,
        ScheduleDescriptor::new(row.cron, Some(row.timezone))?,
        row.artifact_location,
        row.pause_reason,
        row.updated_at,
    )
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn insert_workflow(&self, workflow: Workflow) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows (
                dataset,
                source_type,
                status,
                owner_team,
                external_id,
                cron,
                timezone,
                artifact_location,
                pause_reason,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(workflow.dataset().as_str())
        .bind(workflow.source_type().as_str())
        .bind(workflow.status().as_str())
        .bind(workflow.owner_team())
        .bind(workflow.external_id())
        .bind(workflow.schedule().cron())
        .bind(workflow.schedule().timezone())
        .bind(workflow.artifact_location())
        .bind(workflow.pause_reason())
        .bind(workflow.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                AppError::Conflict(format!(
                    "workflow '{}' already exists",
                    workflow.dataset()
                ))
            } else {
                AppError::Internal(format!(
                    "failed to insert workflow '{}': {error}",
                    workflow.dataset()
                ))
            }
        })?;

        Ok(())
    }

    async fn update_workflow(&self, workflow: Workflow) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET
                source_type = $2,
                status = $3,
                owner_team = $4,
                external_id = $5,
                cron = $6,
                timezone = $7,
                artifact_location = $8,
                pause_reason = $9,
                updated_at = $10
            WHERE dataset = $1
            "#,
        )
        .bind(workflow.dataset().as_str())
        .bind(workflow.source_type().as_str())
        .bind(workflow.status().as_str())
        .bind(workflow.owner_team())
        .bind(workflow.external_id())
        .bind(workflow.schedule().cron())
        .bind(workflow.schedule().timezone())
        .bind(workflow.artifact_location())
        .bind(workflow.pause_reason())
        .bind(workflow.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update workflow '{}': {error}",
                workflow.dataset()
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "workflow '{}' not found",
                workflow.dataset()
            )));
        }

        Ok(())
    }

    async fn find_workflow(&self, dataset: &DatasetName) -> AppResult<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE dataset = $1"
        ))
        .bind(dataset.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find workflow '{dataset}': {error}"))
        })?;

        row.map(workflow_from_row).transpose()
    }

    async fn find_workflow_by_external_id(
        &self,
        external_id: &str,
    ) -> AppResult<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find workflow by external id '{external_id}': {error}"
            ))
        })?;

        row.map(workflow_from_row).transpose()
    }

    async fn list_workflows(&self) -> AppResult<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows ORDER BY dataset"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list workflows: {error}")))?;

        rows.into_iter().map(workflow_from_row).collect()
    }
}
