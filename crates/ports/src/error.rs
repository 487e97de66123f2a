//! Error types for port operations.
//!
//! Every port method returns `Result<_, PortsError>`. Drivers map their
//! internal errors into these variants so the renderer and reconciler can
//! make retry decisions without knowing the concrete backend.

use std::time::Duration;

/// Error type for all port operations.
///
/// Distinguishes retryable failures (connection, timeout) from permanent
/// ones, and reports "already exists" separately so idempotent callers can
/// treat it as success.
#[derive(Debug, thiserror::Error)]
pub enum PortsError {
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity (e.g. "Interface", "TypeInstance").
        entity: String,
        /// Identifier that was looked up.
        id: String,
    },

    /// Entity already exists.
    ///
    /// Returned by create-style calls; idempotent callers treat it as success.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of entity (e.g. "Identity", "Execution").
        entity: String,
        /// Identifier of the existing entity.
        id: String,
    },

    /// Optimistic concurrency conflict.
    #[error("{entity} {id}: expected version {expected_version}, got {actual_version}")]
    Conflict {
        /// Kind of entity.
        entity: String,
        /// Identifier of the conflicting entity.
        id: String,
        /// Version the caller expected.
        expected_version: u64,
        /// Version currently stored.
        actual_version: u64,
    },

    /// Resource is locked by another owner.
    #[error("{id} is locked by {owner}")]
    Locked {
        /// Identifier of the locked resource.
        id: String,
        /// Current lock owner.
        owner: String,
    },

    /// Backend connection failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation exceeded its timeout.
    #[error("timeout: {operation} after {duration:?}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
        /// How long was waited before giving up.
        duration: Duration,
    },

    /// Catch-all internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PortsError {
    /// Convenience constructor for [`PortsError::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Convenience constructor for [`PortsError::AlreadyExists`].
    pub fn already_exists(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Convenience constructor for [`PortsError::Conflict`].
    pub fn conflict(
        entity: impl Into<String>,
        id: impl Into<String>,
        expected: u64,
        actual: u64,
    ) -> Self {
        Self::Conflict {
            entity: entity.into(),
            id: id.into(),
            expected_version: expected,
            actual_version: actual,
        }
    }

    /// Convenience constructor for [`PortsError::Locked`].
    pub fn locked(id: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::Locked {
            id: id.into(),
            owner: owner.into(),
        }
    }

    /// Convenience constructor for [`PortsError::Timeout`].
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Returns `true` for transient errors that may be retried.
    ///
    /// Currently [`Connection`](Self::Connection) and [`Timeout`](Self::Timeout).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }

    /// Returns `true` for [`AlreadyExists`](Self::AlreadyExists).
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` for [`NotFound`](Self::NotFound).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for PortsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Construction ────────────────────────────────────────────────────

    #[test]
    fn not_found_convenience() {
        let err = PortsError::not_found("Interface", "cap.interface.db");
        match &err {
            PortsError::NotFound { entity, id } => {
                assert_eq!(entity, "Interface");
                assert_eq!(id, "cap.interface.db");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(err.is_not_found());
    }

    #[test]
    fn conflict_convenience() {
        let err = PortsError::conflict("Action", "a-1", 3, 5);
        match &err {
            PortsError::Conflict {
                entity,
                id,
                expected_version,
                actual_version,
            } => {
                assert_eq!(entity, "Action");
                assert_eq!(id, "a-1");
                assert_eq!(*expected_version, 3);
                assert_eq!(*actual_version, 5);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn already_exists_is_flagged() {
        let err = PortsError::already_exists("Identity", "runner-a1");
        assert!(err.is_already_exists());
        assert!(!err.is_retryable());
    }

    // ── is_retryable ────────────────────────────────────────────────────

    #[test]
    fn connection_is_retryable() {
        assert!(PortsError::Connection("refused".into()).is_retryable());
    }

    #[test]
    fn timeout_is_retryable() {
        assert!(PortsError::timeout("get_implementation", Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!PortsError::not_found("X", "1").is_retryable());
        assert!(!PortsError::conflict("X", "1", 0, 1).is_retryable());
        assert!(!PortsError::locked("ti-1", "other").is_retryable());
        assert!(!PortsError::Serialization("bad json".into()).is_retryable());
        assert!(!PortsError::Internal("oops".into()).is_retryable());
    }

    // ── From<serde_json::Error> ─────────────────────────────────────────

    #[test]
    fn from_serde_json_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let ports_err: PortsError = serde_err.into();
        assert!(matches!(ports_err, PortsError::Serialization(msg) if !msg.is_empty()));
    }

    // ── Display ─────────────────────────────────────────────────────────

    #[test]
    fn display_messages() {
        assert_eq!(
            PortsError::not_found("Interface", "i-1").to_string(),
            "Interface not found: i-1"
        );
        assert_eq!(
            PortsError::locked("ti-1", "action-9").to_string(),
            "ti-1 is locked by action-9"
        );
        assert_eq!(
            PortsError::Connection("refused".into()).to_string(),
            "connection error: refused"
        );
    }
}
