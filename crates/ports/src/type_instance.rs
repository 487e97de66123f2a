//! Type-instance repository port.

use async_trait::async_trait;
use quasar_core::{TypeInstance, TypeInstanceId};

use crate::error::PortsError;

/// Store of materialized Type-instances.
///
/// Locks are advisory and owner-scoped: locking ids already held by the
/// same owner succeeds, locking ids held by another owner fails with
/// [`PortsError::Locked`] and leaves every id untouched.
#[async_trait]
pub trait TypeInstanceRepository: Send + Sync {
    /// Read an instance and its current value.
    async fn get(&self, id: &TypeInstanceId) -> Result<TypeInstance, PortsError>;

    /// Lock all `ids` for `owner`, atomically.
    async fn lock(&self, ids: &[TypeInstanceId], owner: &str) -> Result<(), PortsError>;

    /// Release locks held by `owner`. Ids not locked by `owner` are ignored.
    async fn unlock(&self, ids: &[TypeInstanceId], owner: &str) -> Result<(), PortsError>;
}
