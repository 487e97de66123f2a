//! Action record errors.

use thiserror::Error;

use crate::phase::ActionPhase;

/// Errors raised while manipulating an Action record.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The phase change is not in the transition table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current phase.
        from: ActionPhase,
        /// Attempted target phase.
        to: ActionPhase,
    },

    /// The record could not be (de)serialized.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ActionError {
    /// Create an invalid-transition error.
    pub fn invalid_transition(from: ActionPhase, to: ActionPhase) -> Self {
        Self::InvalidTransition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err = ActionError::from(serde_err);
        assert!(err.to_string().starts_with("serialization:"));
    }
}
