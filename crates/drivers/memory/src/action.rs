//! In-memory Action record store.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quasar_core::ActionId;
use quasar_ports::{ActionRepo, PortsError};

/// Versioned Action records held in a [`DashMap`].
#[derive(Default)]
pub struct MemoryActionRepo {
    records: DashMap<ActionId, (u64, serde_json::Value)>,
}

impl MemoryActionRepo {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ActionRepo for MemoryActionRepo {
    async fn create(&self, id: ActionId, record: serde_json::Value) -> Result<(), PortsError> {
        match self.records.entry(id) {
            Entry::Occupied(_) => Err(PortsError::already_exists("Action", id.to_string())),
            Entry::Vacant(entry) => {
                entry.insert((1, record));
                Ok(())
            }
        }
    }

    async fn get(&self, id: ActionId) -> Result<Option<(u64, serde_json::Value)>, PortsError> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    async fn transition(
        &self,
        id: ActionId,
        expected_version: u64,
        record: serde_json::Value,
    ) -> Result<bool, PortsError> {
        match self.records.entry(id) {
            Entry::Occupied(mut entry) => {
                if entry.get().0 != expected_version {
                    return Ok(false);
                }
                entry.insert((expected_version + 1, record));
                Ok(true)
            }
            Entry::Vacant(_) => Err(PortsError::not_found("Action", id.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<ActionId>, PortsError> {
        Ok(self.records.iter().map(|entry| *entry.key()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_cas() {
        let repo = MemoryActionRepo::new();
        let id = ActionId::v4();
        repo.create(id, json!({ "v": 1 })).await.unwrap();
        assert_eq!(repo.get(id).await.unwrap(), Some((1, json!({ "v": 1 }))));

        assert!(repo.transition(id, 1, json!({ "v": 2 })).await.unwrap());
        // Stale version loses.
        assert!(!repo.transition(id, 1, json!({ "v": 3 })).await.unwrap());
        assert_eq!(repo.get(id).await.unwrap(), Some((2, json!({ "v": 2 }))));
    }

    #[tokio::test]
    async fn duplicate_create_is_already_exists() {
        let repo = MemoryActionRepo::new();
        let id = ActionId::v4();
        repo.create(id, json!({})).await.unwrap();
        assert!(repo.create(id, json!({})).await.unwrap_err().is_already_exists());
        assert_eq!(repo.list().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn transition_of_unknown_record_is_not_found() {
        let repo = MemoryActionRepo::new();
        let err = repo.transition(ActionId::v4(), 1, json!({})).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
