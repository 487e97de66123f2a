//! The Action record: what was requested and how far it got.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use quasar_core::{ActionId, InputTypeInstance, ManifestRef, OutputTypeInstance};
use quasar_ports::{ExecutionHandle, RunnerStatus};
use quasar_render::{RenderInput, RenderOutput, RenderState};
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::phase::ActionPhase;
use crate::transition::validate_transition;

/// Caller-owned part of an Action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// Interface (or implementation) to run.
    pub action_ref: ManifestRef,
    /// Opaque input parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_parameters: Option<serde_json::Value>,
    /// Type-instances the action consumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_type_instances: Vec<InputTypeInstance>,
    /// Render and validate only.
    #[serde(default)]
    pub dry_run: bool,
    /// Expand one nesting level per pass instead of rendering to completion.
    #[serde(default)]
    pub advanced_rendering: bool,
    /// Set by the caller once the rendered workflow should run.
    #[serde(default)]
    pub run: bool,
    /// Set by the caller to cancel the action.
    #[serde(default)]
    pub cancel: bool,
    /// Trace and auth context forwarded to the execution backend.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ActionSpec {
    /// Spec for `action_ref` with every flag cleared.
    #[must_use]
    pub fn new(action_ref: ManifestRef) -> Self {
        Self {
            action_ref,
            input_parameters: None,
            input_type_instances: Vec::new(),
            dry_run: false,
            advanced_rendering: false,
            run: false,
            cancel: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach input parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.input_parameters = Some(parameters);
        self
    }

    /// Add an input Type-instance.
    #[must_use]
    pub fn with_type_instance(mut self, binding: InputTypeInstance) -> Self {
        self.input_type_instances.push(binding);
        self
    }

    /// Request execution right after rendering.
    #[must_use]
    pub fn run_immediately(mut self) -> Self {
        self.run = true;
        self
    }

    /// Render one nesting level per pass.
    #[must_use]
    pub fn advanced(mut self) -> Self {
        self.advanced_rendering = true;
        self
    }
}

/// Engine-owned part of an Action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStatus {
    /// Current phase.
    pub phase: ActionPhase,
    /// Last error or explanation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The completed render. Never holds a partial result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_workflow: Option<RenderOutput>,
    /// Partial render carried between passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_progress: Option<RenderState>,
    /// Last status document reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_status: Option<RunnerStatus>,
    /// Type-instances the execution produced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_type_instances: Vec<OutputTypeInstance>,
    /// Handle of the submitted execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_handle: Option<ExecutionHandle>,
    /// Identity the execution runs as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Consecutive failed attempts in the current phase.
    #[serde(default)]
    pub attempts: u32,
    /// Whether this action currently holds its Type-instance locks.
    #[serde(default)]
    pub locked: bool,
    /// When the execution was submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_started_at: Option<DateTime<Utc>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the phase last changed.
    pub last_transition_at: DateTime<Utc>,
}

impl ActionStatus {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            phase: ActionPhase::Initial,
            message: None,
            rendered_workflow: None,
            render_progress: None,
            runner_status: None,
            output_type_instances: Vec::new(),
            execution_handle: None,
            identity: None,
            attempts: 0,
            locked: false,
            runner_started_at: None,
            created_at: now,
            last_transition_at: now,
        }
    }
}

/// A request to run a capability, plus its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier.
    pub id: ActionId,
    /// Human-readable name.
    pub name: String,
    /// What was requested.
    pub spec: ActionSpec,
    /// How far it got.
    pub status: ActionStatus,
}

impl Action {
    /// Create an action in [`ActionPhase::Initial`].
    #[must_use]
    pub fn new(id: ActionId, name: impl Into<String>, spec: ActionSpec) -> Self {
        Self {
            id,
            name: name.into(),
            spec,
            status: ActionStatus::new(Utc::now()),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ActionPhase {
        self.status.phase
    }

    /// Move to `phase`, rejecting anything outside the transition table.
    ///
    /// Resets the per-phase attempt counter.
    pub fn transition_to(&mut self, phase: ActionPhase) -> Result<(), ActionError> {
        validate_transition(self.status.phase, phase)?;
        self.status.phase = phase;
        self.status.attempts = 0;
        self.status.last_transition_at = Utc::now();
        Ok(())
    }

    /// Move to [`ActionPhase::Failed`] with `message`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), ActionError> {
        self.transition_to(ActionPhase::Failed)?;
        self.status.message = Some(message.into());
        Ok(())
    }

    /// Record a retryable failure in the current phase.
    ///
    /// Returns the attempt count after this failure.
    pub fn record_retry(&mut self, message: impl Into<String>) -> u32 {
        self.status.attempts = self.status.attempts.saturating_add(1);
        self.status.message = Some(message.into());
        self.status.attempts
    }

    /// Render request derived from the spec.
    #[must_use]
    pub fn render_input(&self) -> RenderInput {
        RenderInput {
            action_ref: self.spec.action_ref.clone(),
            parameters: self.spec.input_parameters.clone(),
            input_type_instances: self.spec.input_type_instances.clone(),
        }
    }

    /// Serialize for an [`ActionRepo`](quasar_ports::ActionRepo).
    pub fn to_record(&self) -> Result<serde_json::Value, ActionError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize a record read from an [`ActionRepo`](quasar_ports::ActionRepo).
    pub fn from_record(record: serde_json::Value) -> Result<Self, ActionError> {
        Ok(serde_json::from_value(record)?)
    }
}
