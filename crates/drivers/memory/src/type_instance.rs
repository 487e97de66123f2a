//! In-memory Type-instance repository.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use quasar_core::{TypeInstance, TypeInstanceId};
use quasar_ports::{PortsError, TypeInstanceRepository};

/// Type-instance store with owner-scoped advisory locks.
#[derive(Default)]
pub struct MemoryTypeInstances {
    instances: DashMap<TypeInstanceId, TypeInstance>,
    locks: Mutex<HashMap<TypeInstanceId, String>>,
}

impl MemoryTypeInstances {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace an instance.
    pub fn insert(&self, instance: TypeInstance) {
        self.instances.insert(instance.id.clone(), instance);
    }

    /// Current lock owner of `id`.
    #[must_use]
    pub fn lock_owner(&self, id: &TypeInstanceId) -> Option<String> {
        self.locks.lock().get(id).cloned()
    }
}

#[async_trait]
impl TypeInstanceRepository for MemoryTypeInstances {
    async fn get(&self, id: &TypeInstanceId) -> Result<TypeInstance, PortsError> {
        self.instances
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PortsError::not_found("TypeInstance", id.as_str()))
    }

    async fn lock(&self, ids: &[TypeInstanceId], owner: &str) -> Result<(), PortsError> {
        let mut locks = self.locks.lock();
        for id in ids {
            if !self.instances.contains_key(id) {
                return Err(PortsError::not_found("TypeInstance", id.as_str()));
            }
            if let Some(holder) = locks.get(id)
                && holder != owner
            {
                return Err(PortsError::locked(id.as_str(), holder.clone()));
            }
        }
        for id in ids {
            locks.insert(id.clone(), owner.to_owned());
        }
        Ok(())
    }

    async fn unlock(&self, ids: &[TypeInstanceId], owner: &str) -> Result<(), PortsError> {
        let mut locks = self.locks.lock();
        for id in ids {
            if locks.get(id).is_some_and(|holder| holder == owner) {
                locks.remove(id);
            }
        }
        Ok(())
    }
}
