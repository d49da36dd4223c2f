//! Redis-backed lease so only one worker replica runs each periodic pass.

use async_trait::async_trait;
use orbit_application::{SyncLease, SyncLeaseCoordinator};
use orbit_core::{AppError, AppResult};
use redis::Script;
use redis::aio::MultiplexedConnection;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const RENEW_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('EXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

/// Redis implementation of sync pass leases.
#[derive(Clone)]
pub struct RedisSyncLeaseCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisSyncLeaseCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, scope_key: &str) -> String {
        format!("{}:{scope_key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

fn validate_lease_seconds(lease_seconds: u32) -> AppResult<()> {
    if lease_seconds == 0 {
        return Err(AppError::Validation(
            "sync lease_seconds must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}

#[async_trait]
impl SyncLeaseCoordinator for RedisSyncLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<SyncLease>> {
        if scope_key.trim().is_empty() || holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "sync lease scope_key and holder_id must not be empty".to_owned(),
            ));
        }
        validate_lease_seconds(lease_seconds)?;

        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let mut connection = self.connection().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key_for(scope_key))
            .arg(token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(u64::from(lease_seconds))
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to acquire sync lease '{scope_key}': {error}"
                ))
            })?;

        Ok(reply.map(|_| SyncLease {
            scope_key: scope_key.to_owned(),
            holder_id: holder_id.to_owned(),
            token,
        }))
    }

    async fn release_lease(&self, lease: &SyncLease) -> AppResult<()> {
        let mut connection = self.connection().await?;

        Script::new(RELEASE_LEASE_SCRIPT)
            .key(self.key_for(lease.scope_key.as_str()))
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to release sync lease '{}': {error}",
                    lease.scope_key
                ))
            })?;

        Ok(())
    }

    async fn renew_lease(&self, lease: &SyncLease, lease_seconds: u32) -> AppResult<bool> {
        validate_lease_seconds(lease_seconds)?;
        let mut connection = self.connection().await?;

        let renewed = Script::new(RENEW_LEASE_SCRIPT)
            .key(self.key_for(lease.scope_key.as_str()))
            .arg(lease.token.as_str())
            .arg(i64::from(lease_seconds))
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to renew sync lease '{}': {error}",
                    lease.scope_key
                ))
            })?;

        Ok(renewed > 0)
    }
}
