//! Execution backend port.
//!
//! The engine never runs workflow steps. It hands a flattened workflow to an
//! execution backend and supervises the opaque execution through
//! [`ExecutionBackend::status`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use quasar_core::{ActionId, OutputTypeInstance};
use serde::{Deserialize, Serialize};

use crate::error::PortsError;

/// Context an execution runs under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Action being executed.
    pub action_id: ActionId,
    /// Human-readable action name.
    pub action_name: String,
    /// Render and validate only; the backend must not run anything.
    #[serde(default)]
    pub dry_run: bool,
    /// Wall-clock budget for the runner, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Identity the execution runs as, once ensured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Caller-supplied trace/auth context, forwarded opaquely.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Context for `action_id` with no identity, timeout or metadata.
    pub fn new(action_id: ActionId, action_name: impl Into<String>) -> Self {
        Self {
            action_id,
            action_name: action_name.into(),
            dry_run: false,
            timeout_ms: None,
            identity: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Runner timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Identity (service account) an execution runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIdentity {
    /// Identity name.
    pub name: String,
}

/// Everything a runner needs to execute an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerInput {
    /// Execution context.
    pub context: ExecutionContext,
    /// Flattened workflow document.
    pub workflow: serde_json::Value,
    /// Serialized input parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Backend-assigned handle of a submitted execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    /// Wrap a backend identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a submitted execution as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerStatus {
    /// The execution reached an end state.
    pub finished: bool,
    /// The end state is a recognized success condition.
    pub succeeded: bool,
    /// Backend-provided explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Runner-specific status document.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
    /// Type-instances uploaded by the execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_type_instances: Vec<OutputTypeInstance>,
}

impl RunnerStatus {
    /// A running, unfinished status.
    #[must_use]
    pub fn running() -> Self {
        Self::default()
    }

    /// A finished, successful status.
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            finished: true,
            succeeded: true,
            ..Self::default()
        }
    }

    /// A finished, failed status.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            finished: true,
            succeeded: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelStatus {
    /// Teardown is complete.
    Confirmed,
    /// Teardown was requested but has not completed yet.
    Pending,
}

/// Executes flattened workflows.
///
/// Create-style calls are idempotent: repeating one with the same input
/// either succeeds with the existing result or fails with
/// [`PortsError::AlreadyExists`], which callers treat as success.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Ensure the identity the execution runs as exists; returns the existing
    /// one when already present.
    async fn ensure_identity(
        &self,
        context: &ExecutionContext,
    ) -> Result<ExecutionIdentity, PortsError>;

    /// Persist the runner input for later consumption by the runner.
    async fn store_runner_input(&self, input: &RunnerInput) -> Result<(), PortsError>;

    /// Submit an execution. `idempotency_key` deduplicates resubmissions.
    ///
    /// A duplicate fails with [`PortsError::AlreadyExists`] whose `id` is the
    /// existing handle.
    async fn submit(
        &self,
        input: &RunnerInput,
        idempotency_key: &str,
    ) -> Result<ExecutionHandle, PortsError>;

    /// Current status of a submitted execution.
    async fn status(&self, handle: &ExecutionHandle) -> Result<RunnerStatus, PortsError>;

    /// Request teardown of a submitted execution.
    async fn cancel(&self, handle: &ExecutionHandle) -> Result<CancelStatus, PortsError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn context_timeout_round_trips_through_millis() {
        let mut ctx = ExecutionContext::new(ActionId::v4(), "install-db");
        assert_eq!(ctx.timeout(), None);
        ctx.timeout_ms = Some(1_500);
        assert_eq!(ctx.timeout(), Some(Duration::from_millis(1_500)));
    }

    #[test]
    fn status_constructors() {
        assert!(!RunnerStatus::running().finished);
        let ok = RunnerStatus::succeeded();
        assert!(ok.finished && ok.succeeded);
        let failed = RunnerStatus::failed("OOMKilled");
        assert!(failed.finished && !failed.succeeded);
        assert_eq!(failed.message.as_deref(), Some("OOMKilled"));
    }

    #[test]
    fn metadata_is_forwarded_in_json() {
        let mut ctx = ExecutionContext::new(ActionId::v4(), "a");
        ctx.metadata.insert("traceparent".into(), "00-abc-01".into());
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["metadata"]["traceparent"], "00-abc-01");
    }
}
