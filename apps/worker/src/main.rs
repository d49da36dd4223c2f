//! Orbit reconciliation worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use orbit_application::{
    BackfillLimits, BackfillService, ClusterRegistry, RunSyncService, SyncLeaseCoordinator,
    SyncSettings,
};
use orbit_core::{AppError, AppResult, Clock, SystemClock};
use orbit_infrastructure::{
    HttpSchedulerClientProvider, HttpSchedulerSettings, PostgresBackfillRepository,
    PostgresClusterRepository, PostgresRunRepository, PostgresWorkflowRepository,
    RedisSyncLeaseCoordinator, SchedulerClientRouter,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    redis_url: Option<String>,
    worker_id: String,
    sync_interval_ms: u64,
    stale_sync_interval_ms: u64,
    backfill_refresh_interval_ms: u64,
    stale_threshold: Duration,
    lease_seconds: u32,
    sync_settings: SyncSettings,
    scheduler_settings: HttpSchedulerSettings,
}

/// Periodic passes owned by the worker. Each pass has its own lease scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodicPass {
    ClusterSync,
    StaleSync,
    BackfillRefresh,
}

impl PeriodicPass {
    fn scope_key(self) -> &'static str {
        match self {
            Self::ClusterSync => "cluster_sync",
            Self::StaleSync => "stale_sync",
            Self::BackfillRefresh => "backfill_refresh",
        }
    }
}

struct Worker {
    config: WorkerConfig,
    cluster_registry: ClusterRegistry,
    run_sync: RunSyncService,
    backfill_service: BackfillService,
    lease_coordinator: Option<Arc<dyn SyncLeaseCoordinator>>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let worker = build_worker(config, pool).await?;

    info!(
        worker_id = %worker.config.worker_id,
        sync_interval_ms = worker.config.sync_interval_ms,
        stale_sync_interval_ms = worker.config.stale_sync_interval_ms,
        backfill_refresh_interval_ms = worker.config.backfill_refresh_interval_ms,
        leased = worker.lease_coordinator.is_some(),
        "orbit-worker started"
    );

    let mut sync_ticker = ticker(worker.config.sync_interval_ms);
    let mut stale_ticker = ticker(worker.config.stale_sync_interval_ms);
    let mut backfill_ticker = ticker(worker.config.backfill_refresh_interval_ms);

    loop {
        let pass = tokio::select! {
            _ = sync_ticker.tick() => PeriodicPass::ClusterSync,
            _ = stale_ticker.tick() => PeriodicPass::StaleSync,
            _ = backfill_ticker.tick() => PeriodicPass::BackfillRefresh,
        };

        worker.run_leased(pass).await;
    }
}

fn ticker(interval_ms: u64) -> Interval {
    let mut interval = tokio::time::interval(StdDuration::from_millis(interval_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn build_worker(config: WorkerConfig, pool: PgPool) -> AppResult<Worker> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cluster_repository = Arc::new(PostgresClusterRepository::new(pool.clone()));
    let workflow_repository = Arc::new(PostgresWorkflowRepository::new(pool.clone()));
    let run_repository = Arc::new(PostgresRunRepository::new(pool.clone()));
    let backfill_repository = Arc::new(PostgresBackfillRepository::new(pool));

    let schedulers = Arc::new(SchedulerClientRouter::new(
        Arc::new(HttpSchedulerClientProvider::new(
            config.scheduler_settings.clone(),
        )?),
        None,
    ));
    let cluster_registry = ClusterRegistry::load(cluster_repository, run_repository.clone()).await?;

    let lease_coordinator = match config.redis_url.as_deref() {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL '{redis_url}': {error}"))
            })?;
            let coordinator: Arc<dyn SyncLeaseCoordinator> =
                Arc::new(RedisSyncLeaseCoordinator::new(client, "orbit:sync_lease"));
            Some(coordinator)
        }
        None => None,
    };

    Ok(Worker {
        run_sync: RunSyncService::new(
            run_repository,
            workflow_repository.clone(),
            cluster_registry.clone(),
            schedulers.clone(),
            clock.clone(),
            config.sync_settings,
        ),
        backfill_service: BackfillService::new(
            backfill_repository,
            workflow_repository,
            cluster_registry.clone(),
            schedulers,
            clock,
            BackfillLimits::default(),
        ),
        cluster_registry,
        lease_coordinator,
        config,
    })
}

impl Worker {
    /// Runs one pass, holding its lease when a coordinator is configured.
    async fn run_leased(&self, pass: PeriodicPass) {
        let Some(coordinator) = &self.lease_coordinator else {
            self.run_pass(pass).await;
            return;
        };

        let lease = match coordinator
            .try_acquire_lease(
                pass.scope_key(),
                self.config.worker_id.as_str(),
                self.config.lease_seconds,
            )
            .await
        {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                debug!(
                    worker_id = %self.config.worker_id,
                    pass = pass.scope_key(),
                    "pass lease held by another worker"
                );
                return;
            }
            Err(error) => {
                warn!(
                    worker_id = %self.config.worker_id,
                    pass = pass.scope_key(),
                    error = %error,
                    "failed to acquire pass lease"
                );
                return;
            }
        };

        let pass_run = self.run_pass(pass);
        tokio::pin!(pass_run);
        let mut renew_ticker = ticker(u64::from(self.config.lease_seconds) * 500);
        renew_ticker.tick().await;

        loop {
            tokio::select! {
                () = &mut pass_run => break,
                _ = renew_ticker.tick() => {
                    match coordinator.renew_lease(&lease, self.config.lease_seconds).await {
                        Ok(true) => {}
                        Ok(false) => warn!(
                            worker_id = %self.config.worker_id,
                            pass = pass.scope_key(),
                            "pass lease taken over while running"
                        ),
                        Err(error) => warn!(
                            worker_id = %self.config.worker_id,
                            pass = pass.scope_key(),
                            error = %error,
                            "failed to renew pass lease"
                        ),
                    }
                }
            }
        }

        if let Err(error) = coordinator.release_lease(&lease).await {
            warn!(
                worker_id = %self.config.worker_id,
                pass = pass.scope_key(),
                error = %error,
                "failed to release pass lease"
            );
        }
    }

    async fn run_pass(&self, pass: PeriodicPass) {
        match pass {
            PeriodicPass::ClusterSync => {
                // Clusters are administered through the API process.
                if let Err(error) = self.cluster_registry.refresh().await {
                    warn!(
                        worker_id = %self.config.worker_id,
                        error = %error,
                        "failed to refresh cluster registry"
                    );
                }

                let result = self.run_sync.sync_all_clusters().await;
                debug!(
                    worker_id = %self.config.worker_id,
                    total_updated = result.total_updated,
                    failed_clusters = result.failed_clusters,
                    "cluster sync pass done"
                );
            }
            PeriodicPass::StaleSync => {
                if let Err(error) = self
                    .run_sync
                    .sync_stale_runs(self.config.stale_threshold)
                    .await
                {
                    warn!(
                        worker_id = %self.config.worker_id,
                        error = %error,
                        "stale run sync failed"
                    );
                }
            }
            PeriodicPass::BackfillRefresh => {
                if let Err(error) = self.backfill_service.refresh_active_backfills().await {
                    warn!(
                        worker_id = %self.config.worker_id,
                        error = %error,
                        "backfill refresh failed"
                    );
                }
            }
        }
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let redis_url = optional_env("REDIS_URL");
        let worker_id = optional_env("WORKER_ID")
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));

        let sync_interval_ms = positive_env("SYNC_INTERVAL_MS", 30_000_u64)?;
        let stale_sync_interval_ms = positive_env("STALE_SYNC_INTERVAL_MS", 300_000_u64)?;
        let backfill_refresh_interval_ms =
            positive_env("BACKFILL_REFRESH_INTERVAL_MS", 60_000_u64)?;
        let stale_threshold_minutes = positive_env("STALE_THRESHOLD_MINUTES", 30_i64)?;
        let lease_seconds = positive_env("SYNC_LEASE_SECONDS", 60_u32)?;

        let sync_settings = SyncSettings::new(
            Duration::minutes(parse_env("SYNC_LOOKBACK_MINUTES", 60_i64)?),
            parse_env("SYNC_BATCH_SIZE", 100_usize)?,
            StdDuration::from_millis(parse_env("SYNC_CLUSTER_TIMEOUT_MS", 30_000_u64)?),
            parse_env("SYNC_STALE_BATCH_SIZE", 500_usize)?,
        )?;

        let scheduler_settings = HttpSchedulerSettings::new(
            StdDuration::from_millis(parse_env("SCHEDULER_HTTP_TIMEOUT_MS", 10_000_u64)?),
            parse_env("SCHEDULER_MAX_ATTEMPTS", 3_u8)?,
            parse_env("SCHEDULER_RETRY_BACKOFF_MS", 200_u64)?,
            optional_env("SCHEDULER_AUTH_TOKEN"),
        )?;

        if u64::from(lease_seconds) * 1000 < sync_interval_ms {
            warn!(
                lease_seconds,
                sync_interval_ms, "SYNC_LEASE_SECONDS is shorter than SYNC_INTERVAL_MS"
            );
        }

        Ok(Self {
            database_url,
            redis_url,
            worker_id,
            sync_interval_ms,
            stale_sync_interval_ms,
            backfill_refresh_interval_ms,
            stale_threshold: Duration::minutes(stale_threshold_minutes),
            lease_seconds,
            sync_settings,
            scheduler_settings,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    optional_env(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env<T>(name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => parse_value(name, value.as_str()),
        Err(_) => Ok(default),
    }
}

fn positive_env<T>(name: &str, default: T) -> AppResult<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = parse_env(name, default)?;
    if value <= T::default() {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(value)
}

fn parse_value<T>(name: &str, value: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}")))
}

#[cfg(test)]
mod tests {
    use super::{PeriodicPass, parse_value};

    #[test]
    fn pass_scopes_are_distinct() {
        let scopes = [
            PeriodicPass::ClusterSync.scope_key(),
            PeriodicPass::StaleSync.scope_key(),
            PeriodicPass::BackfillRefresh.scope_key(),
        ];

        assert_ne!(scopes[0], scopes[1]);
        assert_ne!(scopes[1], scopes[2]);
        assert_ne!(scopes[0], scopes[2]);
    }

    #[test]
    fn values_are_trimmed_before_parsing() {
        assert_eq!(parse_value::<u64>("SYNC_INTERVAL_MS", " 1500 ").ok(), Some(1500));
        assert!(parse_value::<u32>("SYNC_LEASE_SECONDS", "soon").is_err());
    }
}
