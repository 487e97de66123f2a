#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Quasar Engine
//!
//! Drives Actions from creation to a terminal phase.
//!
//! - [`ActionReconciler`] -- one idempotent pass over one Action: render,
//!   hand off to the execution backend, supervise, cancel
//! - [`Controller`] -- bounded worker pool with per-action exclusivity,
//!   delayed requeues and backoff
//! - [`EngineConfig`] -- render limits, reconciler and pool settings,
//!   overridable from the environment
//!
//! The Action record in the [`ActionRepo`](quasar_ports::ActionRepo) is the
//! only state; events on the [`EventBus`](quasar_telemetry::EventBus) are
//! projections of it.

pub mod config;
pub mod controller;
pub mod error;
pub mod reconciler;

pub use config::{ControllerConfig, EngineConfig, ReconcilerConfig, RetryConfig};
pub use controller::Controller;
pub use error::EngineError;
pub use reconciler::{ActionReconciler, ReconcileOutcome};
