#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Quasar Telemetry
//!
//! Lifecycle events for the Quasar action engine.
//!
//! - [`EventBus`] -- broadcast-based event distribution
//! - [`ActionEvent`] -- phase changes, render progress and execution results
//!
//! Events are **projections**, not the source of truth. The
//! `ActionRepo` record is the single source of truth; a subscriber that
//! lags or joins late must re-read it.

pub mod event;

pub use event::{ActionEvent, EventBus, EventSubscriber};
