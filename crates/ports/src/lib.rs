#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Quasar Ports
//!
//! Interface traits (ports) for the collaborators of the Quasar action engine.
//! Drivers implement them; the renderer and reconciler only ever see the
//! traits:
//!
//! - [`ManifestRepository`] -- read-only capability resolution
//! - [`TypeInstanceRepository`] -- Type-instance reads and owner locks
//! - [`ExecutionBackend`] -- identity, runner input, submission and status
//!   of flattened workflows
//! - [`ActionRepo`] -- versioned persistence of Action records
//!
//! All traits are `async_trait` and object-safe, suitable for use as
//! `Arc<dyn Trait>` behind dependency injection.

pub mod action;
pub mod backend;
pub mod error;
pub mod manifest;
pub mod type_instance;

pub use action::ActionRepo;
pub use backend::{
    CancelStatus, ExecutionBackend, ExecutionContext, ExecutionHandle, ExecutionIdentity,
    RunnerInput, RunnerStatus,
};
pub use error::PortsError;
pub use manifest::{ImplementationFilter, ManifestRepository};
pub use type_instance::TypeInstanceRepository;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check that every port is object-safe.
    #[test]
    fn traits_are_object_safe() {
        fn _assert_manifests(_: &dyn ManifestRepository) {}
        fn _assert_type_instances(_: &dyn TypeInstanceRepository) {}
        fn _assert_backend(_: &dyn ExecutionBackend) {}
        fn _assert_actions(_: &dyn ActionRepo) {}
    }

    /// Verify traits can be wrapped in `Arc` for shared ownership.
    #[test]
    fn traits_work_as_arc_dyn() {
        use std::sync::Arc;
        fn _takes_manifests(_: Arc<dyn ManifestRepository>) {}
        fn _takes_type_instances(_: Arc<dyn TypeInstanceRepository>) {}
        fn _takes_backend(_: Arc<dyn ExecutionBackend>) {}
        fn _takes_actions(_: Arc<dyn ActionRepo>) {}
    }
}
