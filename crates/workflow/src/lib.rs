#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Quasar Workflow
//!
//! The executable workflow document produced by the renderer and consumed by
//! an execution backend.
//!
//! - [`Workflow`] -- entrypoint, templates and workflow-level arguments
//! - [`Template`] -- composite (step groups) or leaf (opaque exec unit)
//! - [`WorkflowStep`] -- a call to a template, or a pending [`ActionRef`]
//! - [`Artifact`] / [`Artifacts`] -- named data passed between steps
//! - [`reference`] -- `{{workflow.outputs.artifacts.X}}` placeholder handling
//! - [`TemplateGraph`] -- template call graph (acyclicity, reachability)
//! - [`validate_workflow`] / [`validate_rendered`] -- collect-all validation
//! - [`WorkflowBuilder`] / [`TemplateBuilder`] / [`StepBuilder`] -- fluent construction

pub mod builder;
pub mod definition;
pub mod error;
pub mod graph;
pub mod reference;
pub mod validate;

pub use builder::{StepBuilder, TemplateBuilder, WorkflowBuilder};
pub use definition::{
    ActionRef, Artifact, Artifacts, ParallelSteps, RawArtifact, Template, TypeInstanceBinding,
    TypeInstanceOutput, Workflow, WorkflowStep,
};
pub use error::WorkflowError;
pub use graph::TemplateGraph;
pub use validate::{validate_rendered, validate_workflow};
