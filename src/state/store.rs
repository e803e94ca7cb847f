//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.
//! Saves must be atomic: a commit interrupted mid-write must never leave a
//! partially-written state behind.

use async_trait::async_trait;

use super::lock::LockInfo;
use super::types::DeploymentUnitState;
use crate::error::Result;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the deployment unit state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<DeploymentUnitState>>;

    /// Saves the deployment unit state atomically.
    async fn save(&self, state: &DeploymentUnitState) -> Result<()>;

    /// Deletes the deployment unit state.
    async fn delete(&self) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires a lease on the state.
    ///
    /// Fails with `LockedByOther` while another run holds an unexpired
    /// lease.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Refreshes a held lease, extending its expiry.
    ///
    /// Fails with `LockFailed` when no lease is held and `LockedByOther`
    /// when the held lease has a different id.
    async fn refresh_lock(&self, lock_id: &str) -> Result<()>;

    /// Releases a lease on the state.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if the state is locked.
    async fn is_locked(&self) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self) -> Result<Option<DeploymentUnitState>> {
        (**self).load().await
    }

    async fn save(&self, state: &DeploymentUnitState) -> Result<()> {
        (**self).save(state).await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }

    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder).await
    }

    async fn refresh_lock(&self, lock_id: &str) -> Result<()> {
        (**self).refresh_lock(lock_id).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
