//! Workflow-specific error types.

use thiserror::Error;

/// Structural problems found in a workflow document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The entrypoint is empty.
    #[error("workflow entrypoint must not be empty")]
    EmptyEntrypoint,

    /// The entrypoint names a template that does not exist.
    #[error("entrypoint references unknown template: {0}")]
    UnknownEntrypoint(String),

    /// Two templates share a name.
    #[error("duplicate template name: {0}")]
    DuplicateTemplate(String),

    /// Two templates export an artifact under the same global name.
    #[error("duplicate global artifact name: {0}")]
    DuplicateGlobalArtifact(String),

    /// A step calls a template that does not exist.
    #[error("step {template}/{step} references unknown template: {target}")]
    UnknownTemplate {
        /// Template containing the step.
        template: String,
        /// Step name.
        step: String,
        /// The missing template.
        target: String,
    },

    /// A step has neither a template nor an action reference.
    #[error("step {template}/{step} has no template or action reference")]
    MissingStepTarget {
        /// Template containing the step.
        template: String,
        /// Step name.
        step: String,
    },

    /// A step still carries an action reference after rendering.
    #[error("step {template}/{step} still references unresolved action {action}")]
    UnresolvedAction {
        /// Template containing the step.
        template: String,
        /// Step name.
        step: String,
        /// The pending reference.
        action: String,
    },

    /// A placeholder names a global artifact no template exports.
    #[error("step {template}/{step} references unknown global artifact: {artifact}")]
    DanglingArtifactReference {
        /// Template containing the step.
        template: String,
        /// Step name.
        step: String,
        /// The missing global artifact.
        artifact: String,
    },

    /// A placeholder names a step that does not exist in the same template.
    #[error("{template}/{referrer} references outputs of unknown step: {target}")]
    UnknownStepReference {
        /// Template owning the placeholder.
        template: String,
        /// Step or template output holding the placeholder.
        referrer: String,
        /// The missing step.
        target: String,
    },

    /// The template call graph contains a cycle.
    #[error("cycle detected in template graph")]
    CycleDetected,
}
