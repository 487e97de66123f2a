#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Quasar Execution
//!
//! The Action record and its lifecycle rules. This crate models the record;
//! it does NOT drive it. The reconciler in `quasar-engine` does. It defines:
//!
//! - [`ActionPhase`] -- lifecycle state machine (7 phases)
//! - [`Action`], [`ActionSpec`] and [`ActionStatus`] -- the persisted record
//! - [`IdempotencyKey`] -- deterministic keys for backend submissions
//! - Phase transitions validated by the [`transition`] module

pub mod action;
pub mod error;
pub mod idempotency;
pub mod phase;
pub mod transition;

pub use action::{Action, ActionSpec, ActionStatus};
pub use error::ActionError;
pub use idempotency::IdempotencyKey;
pub use phase::ActionPhase;
