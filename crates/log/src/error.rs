//! Logger setup errors.

use thiserror::Error;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LogError {
    /// The level filter could not be parsed.
    #[error("invalid log filter {filter:?}: {reason}")]
    Filter {
        /// The rejected filter string.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}
