//! Action record persistence port.
//!
//! Records are stored as versioned JSON documents so this crate does not
//! depend on the lifecycle model. Writers use compare-and-swap on the
//! version; a lost race is reported as `Ok(false)`.

use async_trait::async_trait;
use quasar_core::ActionId;

use crate::error::PortsError;

/// Versioned storage of Action records.
#[async_trait]
pub trait ActionRepo: Send + Sync {
    /// Store a new record at version 1.
    ///
    /// Fails with [`PortsError::AlreadyExists`] if `id` is taken.
    async fn create(&self, id: ActionId, record: serde_json::Value) -> Result<(), PortsError>;

    /// Get a record. Returns `(version, record_json)` or `None`.
    async fn get(&self, id: ActionId) -> Result<Option<(u64, serde_json::Value)>, PortsError>;

    /// Compare-and-swap update. Returns `true` if `expected_version` matched
    /// and the record now has version `expected_version + 1`.
    async fn transition(
        &self,
        id: ActionId,
        expected_version: u64,
        record: serde_json::Value,
    ) -> Result<bool, PortsError>;

    /// Identifiers of all stored records.
    async fn list(&self) -> Result<Vec<ActionId>, PortsError>;
}
