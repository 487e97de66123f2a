#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Quasar Memory Drivers
//!
//! In-memory implementations of every Quasar port:
//!
//! - [`MemoryManifests`] -- [`ManifestRepository`](quasar_ports::ManifestRepository)
//!   with semver-ordered revisions and upsert-only-if-newer publishing
//! - [`MemoryTypeInstances`] -- [`TypeInstanceRepository`](quasar_ports::TypeInstanceRepository)
//!   with owner-scoped locks
//! - [`MemoryActionRepo`] -- [`ActionRepo`](quasar_ports::ActionRepo) with
//!   compare-and-swap versions
//! - [`MemoryBackend`] -- scriptable [`ExecutionBackend`](quasar_ports::ExecutionBackend)
//!   that counts side effects
//!
//! Nothing is persisted. Suitable for tests and single-process deployments
//! where durability is not required.

pub mod action;
pub mod backend;
pub mod manifest;
pub mod type_instance;

pub use action::MemoryActionRepo;
pub use backend::MemoryBackend;
pub use manifest::MemoryManifests;
pub use type_instance::MemoryTypeInstances;
