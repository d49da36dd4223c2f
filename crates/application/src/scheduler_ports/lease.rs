use async_trait::async_trait;
use orbit_core::AppResult;

/// One held synchronization lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLease {
    /// Lease scope, one per periodic pass kind.
    pub scope_key: String,
    /// Worker holding the lease.
    pub holder_id: String,
    /// Random ownership token.
    pub token: String,
}

/// Distributed coordination port so only one worker runs a periodic pass.
#[async_trait]
pub trait SyncLeaseCoordinator: Send + Sync {
    /// Attempts to acquire one lease for the given scope.
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<SyncLease>>;

    /// Releases one lease using token compare-and-delete semantics.
    async fn release_lease(&self, lease: &SyncLease) -> AppResult<()>;

    /// Renews one existing lease and returns false when token ownership changed.
    async fn renew_lease(&self, lease: &SyncLease, lease_seconds: u32) -> AppResult<bool>;
}
