#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Quasar Core
//!
//! Shared vocabulary for the Quasar action engine:
//!
//! - [`ActionId`] -- strongly-typed identifier of an Action record
//! - [`ManifestRef`] -- path + optional revision of a capability manifest
//! - [`Interface`] / [`Implementation`] -- the manifest model served by a
//!   manifest repository
//! - [`TypeInstanceId`], [`InputTypeInstance`], [`OutputTypeInstance`] --
//!   references to materialized Type-instances
//!
//! Everything here is plain data; behavior lives in the render and engine
//! crates.

pub mod id;
pub mod manifest;
pub mod type_instance;

pub use id::{ActionId, UuidParseError};
pub use manifest::{
    Implementation, ImplementationAction, Import, ImportMethod, Interface, ManifestRef,
    WORKFLOW_RUNNER,
};
pub use type_instance::{InputTypeInstance, OutputTypeInstance, TypeInstance, TypeInstanceId};
