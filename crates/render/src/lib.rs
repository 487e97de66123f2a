#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Quasar Render
//!
//! Turns a reference to an abstract capability into one flat, directly
//! executable [`Workflow`](quasar_workflow::Workflow).
//!
//! - [`Renderer`] -- fixpoint inlining of nested capability references,
//!   resumable across passes via [`RenderState`]
//! - [`namespace`] -- deterministic `<prefix>-<name>` renaming of a nested
//!   workflow before it is merged
//! - [`inject`] -- synthetic templates that materialize Type-instances and
//!   capture produced ones
//! - [`ImplementationPolicy`] -- chooses one implementation per interface
//! - [`RenderConfig`] / [`RenderError`]
//!
//! The renderer only reads from its repositories; it never locks or mutates
//! Type-instances.

pub mod config;
pub mod error;
pub mod inject;
pub mod namespace;
pub mod policy;
pub mod renderer;
pub mod state;

pub use config::RenderConfig;
pub use error::RenderError;
pub use namespace::{Renames, namespace};
pub use policy::{
    ImplementationPolicy, PolicyDecision, PreferencePolicy, SelectionError, StrictPolicy,
};
pub use renderer::Renderer;
pub use state::{
    OutputBinding, RenderInput, RenderOutput, RenderProgress, RenderState, TemplateContext,
};
