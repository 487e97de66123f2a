//! Unique identifiers for Quasar entities.
//!
//! Identifiers are [`domain-key`](https://crates.io/crates/domain-key) `Uuid<D>`
//! wrappers, so an [`ActionId`] can never be confused with another UUID-backed
//! identifier. They are `Copy`, serialize as UUID strings and support
//! `v4()`, `nil()` and `parse(&str)`.

use domain_key::define_uuid;

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

define_uuid!(pub ActionIdDomain => ActionId);
