//! Engine error types.

use quasar_core::ActionId;
use quasar_execution::ActionError;
use quasar_ports::PortsError;

/// Errors from the engine layer.
///
/// Render and backend failures are not here: the reconciler records them on
/// the Action itself. These are failures to run a pass at all.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No record exists for the action.
    #[error("action {0} not found")]
    ActionNotFound(ActionId),

    /// Another writer updated the record between read and write.
    #[error("action {0} was updated concurrently")]
    Conflict(ActionId),

    /// The action repository failed.
    #[error("action repository: {0}")]
    Repository(#[from] PortsError),

    /// The record is malformed or a transition was rejected.
    #[error("action record: {0}")]
    Action(#[from] ActionError),

    /// A configuration value could not be parsed.
    #[error("invalid {key}={value:?}: {reason}")]
    Config {
        /// Environment variable or config key.
        key: String,
        /// Rejected value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// The controller's work queue is closed.
    #[error("controller is shut down")]
    ShutDown,

    /// [`Controller::run`](crate::Controller::run) was called twice.
    #[error("controller is already running")]
    AlreadyRunning,

    /// A reconcile pass panicked.
    #[error("reconcile pass panicked: {0}")]
    TaskPanicked(String),
}

impl EngineError {
    /// Returns `true` if repeating the pass may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict(_) | Self::TaskPanicked(_) => true,
            Self::Repository(source) => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_retryable() {
        assert!(EngineError::Conflict(ActionId::v4()).is_retryable());
    }

    #[test]
    fn repository_retryability_follows_source() {
        assert!(EngineError::from(PortsError::Connection("refused".into())).is_retryable());
        assert!(!EngineError::from(PortsError::Internal("corrupt".into())).is_retryable());
    }

    #[test]
    fn record_errors_are_permanent() {
        let serde_err = serde_json::from_str::<String>("{").unwrap_err();
        let err = EngineError::from(ActionError::from(serde_err));
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("action record: serialization:"));
    }

    #[test]
    fn not_found_display() {
        let id = ActionId::v4();
        assert_eq!(
            EngineError::ActionNotFound(id).to_string(),
            format!("action {id} not found")
        );
    }
}
