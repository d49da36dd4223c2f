use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use orbit_application::{BackfillLimits, RegisterClusterInput, SyncSettings};
use orbit_core::{AppError, AppResult};
use orbit_infrastructure::{FakeSchedulerSettings, HttpSchedulerSettings};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub cluster_seeds: Vec<RegisterClusterInput>,
    pub sync_settings: SyncSettings,
    pub stale_threshold: Duration,
    pub scheduler_settings: HttpSchedulerSettings,
    pub simulation_settings: FakeSchedulerSettings,
    pub backfill_limits: BackfillLimits,
}

impl ApiConfig {
    pub fn load() -> AppResult<Self> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let database_url = optional_env("DATABASE_URL");
        if migrate_only && database_url.is_none() {
            return Err(AppError::Validation(
                "DATABASE_URL is required to run migrations".to_owned(),
            ));
        }

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = parse_env("API_PORT", 3001_u16)?;

        let cluster_seeds = optional_env("ORBIT_CLUSTERS")
            .map(|value| parse_cluster_seeds(value.as_str()))
            .transpose()?
            .unwrap_or_default();

        let sync_settings = SyncSettings::new(
            Duration::minutes(parse_env("SYNC_LOOKBACK_MINUTES", 60_i64)?),
            parse_env("SYNC_BATCH_SIZE", 100_usize)?,
            StdDuration::from_millis(parse_env("SYNC_CLUSTER_TIMEOUT_MS", 30_000_u64)?),
            parse_env("SYNC_STALE_BATCH_SIZE", 500_usize)?,
        )?;

        let stale_threshold_minutes = parse_env("STALE_THRESHOLD_MINUTES", 30_i64)?;
        if stale_threshold_minutes <= 0 {
            return Err(AppError::Validation(
                "STALE_THRESHOLD_MINUTES must be greater than zero".to_owned(),
            ));
        }

        let scheduler_settings = HttpSchedulerSettings::new(
            StdDuration::from_millis(parse_env("SCHEDULER_HTTP_TIMEOUT_MS", 10_000_u64)?),
            parse_env("SCHEDULER_MAX_ATTEMPTS", 3_u8)?,
            parse_env("SCHEDULER_RETRY_BACKOFF_MS", 200_u64)?,
            optional_env("SCHEDULER_AUTH_TOKEN"),
        )?;

        let simulation_settings = FakeSchedulerSettings::new(
            parse_env("SIMULATION_SEED", 7_u64)?,
            parse_env("SIMULATION_FAILURE_RATE", 0.0_f64)?,
            match parse_env("SIMULATION_LATENCY_MS", 0_u64)? {
                0 => None,
                latency_ms => Some(StdDuration::from_millis(latency_ms)),
            },
        )?;

        let backfill_limits = BackfillLimits::new(
            parse_env("BACKFILL_MAX_RANGE_DAYS", 365_i64)?,
            parse_env("BACKFILL_MAX_IN_FLIGHT", 3_usize)?,
        )?;

        Ok(Self {
            migrate_only,
            database_url,
            api_host,
            api_port,
            cluster_seeds,
            sync_settings,
            stale_threshold: Duration::minutes(stale_threshold_minutes),
            scheduler_settings,
            simulation_settings,
            backfill_limits,
        })
    }

    pub fn socket_address(&self) -> AppResult<SocketAddr> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

/// Parses `id=team@endpoint` entries separated by commas.
pub fn parse_cluster_seeds(value: &str) -> AppResult<Vec<RegisterClusterInput>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || {
                AppError::Validation(format!(
                    "invalid ORBIT_CLUSTERS entry '{entry}', expected id=team@endpoint"
                ))
            };
            let (cluster_id, rest) = entry.split_once('=').ok_or_else(invalid)?;
            let (team, endpoint) = rest.split_once('@').ok_or_else(invalid)?;

            Ok(RegisterClusterInput {
                cluster_id: cluster_id.trim().to_owned(),
                team: team.trim().to_owned(),
                endpoint: endpoint.trim().to_owned(),
            })
        })
        .collect()
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
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
        Ok(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
