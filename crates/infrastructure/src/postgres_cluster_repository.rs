use async_trait::async_trait;
use orbit_application::ClusterRepository;
use orbit_core::{AppError, AppResult};
use orbit_domain::{Cluster, ClusterId};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed cluster repository.
#[derive(Clone)]
pub struct PostgresClusterRepository {
    pool: PgPool,
}

impl PostgresClusterRepository {
    /// Creates a cluster repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ClusterRow {
    cluster_id: String,
    team: String,
    endpoint: String,
    is_active: bool,
}

impl TryFrom<ClusterRow> for Cluster {
    type Error = AppError;

    fn try_from(row: ClusterRow) -> AppResult<Self> {
        Cluster::new(row.cluster_id, row.team, row.endpoint, row.is_active)
    }
}

#[async_trait]
impl ClusterRepository for PostgresClusterRepository {
    async fn save_cluster(&self, cluster: Cluster) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO clusters (cluster_id, team, endpoint, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cluster_id) DO UPDATE
            SET
                team = EXCLUDED.team,
                endpoint = EXCLUDED.endpoint,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(cluster.id().as_str())
        .bind(cluster.team())
        .bind(cluster.endpoint())
        .bind(cluster.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save cluster '{}': {error}",
                cluster.id()
            ))
        })?;

        Ok(())
    }

    async fn list_clusters(&self) -> AppResult<Vec<Cluster>> {
        let rows = sqlx::query_as::<_, ClusterRow>(
            r#"
            SELECT cluster_id, team, endpoint, is_active
            FROM clusters
            ORDER BY position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list clusters: {error}")))?;

        rows.into_iter().map(Cluster::try_from).collect()
    }

    async fn find_cluster(&self, cluster_id: &ClusterId) -> AppResult<Option<Cluster>> {
        let row = sqlx::query_as::<_, ClusterRow>(
            r#"
            SELECT cluster_id, team, endpoint, is_active
            FROM clusters
            WHERE cluster_id = $1
            "#,
        )
        .bind(cluster_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find cluster '{cluster_id}': {error}"))
        })?;

        row.map(Cluster::try_from).transpose()
    }
}
