//! Render error types.
//!
//! Errors carry the capability path and the step path (`<template>/<step>`,
//! or `root`) they arose at, so their display text can be surfaced as an
//! Action's status message without re-wrapping.

use std::time::Duration;

use quasar_core::TypeInstanceId;
use quasar_ports::PortsError;
use quasar_workflow::WorkflowError;
use thiserror::Error;

/// Errors produced while rendering an action.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The interface does not exist in the manifest repository.
    #[error("interface {interface} not found (step {step})")]
    InterfaceNotFound {
        /// Requested interface.
        interface: String,
        /// Step path the interface was referenced from.
        step: String,
    },

    /// No implementation satisfies the interface after filtering.
    #[error("no implementation found for interface {interface} (step {step})")]
    ImplementationNotFound {
        /// Requested interface.
        interface: String,
        /// Step path the interface was referenced from.
        step: String,
    },

    /// Several implementations satisfy the interface and the policy could not
    /// pick one.
    #[error(
        "ambiguous implementation for interface {interface} (step {step}): {}",
        .candidates.join(", ")
    )]
    AmbiguousImplementation {
        /// Requested interface.
        interface: String,
        /// Step path the interface was referenced from.
        step: String,
        /// Paths of the competing implementations.
        candidates: Vec<String>,
    },

    /// Two producers export the same global artifact name.
    #[error("global artifact name collision: {name}")]
    ArtifactNameCollision {
        /// The duplicated global name.
        name: String,
    },

    /// Two templates share a name.
    #[error("template name collision: {name}")]
    TemplateNameCollision {
        /// The duplicated template name.
        name: String,
    },

    /// The implementation is not run by the built-in workflow runner.
    #[error("implementation {implementation} uses unsupported runner {runner}")]
    UnsupportedRunner {
        /// Implementation path.
        implementation: String,
        /// Its runner.
        runner: String,
    },

    /// The implementation's embedded workflow is missing or malformed.
    #[error("implementation {implementation} embeds an invalid workflow: {reason}")]
    InvalidWorkflow {
        /// Implementation path.
        implementation: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An `<alias>.<method>` step reference matches no import.
    #[error("step {step} references {reference}, which matches no import of {implementation}")]
    UnresolvedImport {
        /// Step path.
        step: String,
        /// The unmatched reference.
        reference: String,
        /// Implementation owning the step.
        implementation: String,
    },

    /// Inlining would exceed the configured nesting depth.
    #[error("render depth {depth} exceeds maximum {max} (step {step})")]
    MaxDepthExceeded {
        /// Depth the expansion would reach.
        depth: usize,
        /// Configured limit.
        max: usize,
        /// Step path being expanded.
        step: String,
    },

    /// A Type-instance to inject cannot be read.
    #[error("type instance {name} ({id}) is unavailable: {source}")]
    TypeInstanceUnavailable {
        /// Local name of the binding.
        name: String,
        /// Repository identifier.
        id: TypeInstanceId,
        /// Repository failure.
        #[source]
        source: PortsError,
    },

    /// A manifest repository call failed.
    #[error("manifest repository error while resolving {subject}: {source}")]
    Repository {
        /// What was being resolved.
        subject: String,
        /// Repository failure.
        #[source]
        source: PortsError,
    },

    /// The flattened workflow failed final validation.
    #[error("rendered workflow is invalid: {}", summarize(.0))]
    InvalidRendered(Vec<WorkflowError>),

    /// Input parameters could not be serialized.
    #[error("cannot serialize input parameters: {0}")]
    Parameters(String),

    /// Rendering exceeded its wall-clock budget.
    #[error("render timed out after {after:?}")]
    Timeout {
        /// The configured budget.
        after: Duration,
    },
}

fn summarize(errors: &[WorkflowError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl RenderError {
    /// Wrap a repository failure that happened while resolving `subject`.
    pub fn repository(subject: impl Into<String>, source: PortsError) -> Self {
        Self::Repository {
            subject: subject.into(),
            source,
        }
    }

    /// Returns `true` if a later render attempt may succeed without any
    /// manifest or input change.
    ///
    /// Resolution and collision errors are never retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository { source, .. } | Self::TypeInstanceUnavailable { source, .. } => {
                source.is_retryable()
            }
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Map final-validation failures onto the collision taxonomy.
    ///
    /// Duplicate template or global artifact names become
    /// [`TemplateNameCollision`](Self::TemplateNameCollision) /
    /// [`ArtifactNameCollision`](Self::ArtifactNameCollision); anything else
    /// is reported as [`InvalidRendered`](Self::InvalidRendered).
    #[must_use]
    pub fn from_validation(errors: Vec<WorkflowError>) -> Self {
        for err in &errors {
            match err {
                WorkflowError::DuplicateTemplate(name) => {
                    return Self::TemplateNameCollision { name: name.clone() };
                }
                WorkflowError::DuplicateGlobalArtifact(name) => {
                    return Self::ArtifactNameCollision { name: name.clone() };
                }
                _ => {}
            }
        }
        Self::InvalidRendered(errors)
    }
}
