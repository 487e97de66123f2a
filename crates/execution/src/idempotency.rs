//! Idempotency keys for backend side effects.

use std::fmt;

use quasar_core::ActionId;
use serde::{Deserialize, Serialize};

/// Deterministic key handed to the execution backend so a resubmission
/// after a crash is recognized as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key for `operation` of `action_id` in run attempt `attempt`.
    #[must_use]
    pub fn generate(action_id: ActionId, operation: &str, attempt: u32) -> Self {
        Self(format!("{action_id}:{operation}:{attempt}"))
    }

    /// Key for submitting the rendered workflow of `action_id`.
    #[must_use]
    pub fn submit(action_id: ActionId, attempt: u32) -> Self {
        Self::generate(action_id, "submit", attempt)
    }

    /// Get the underlying key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
