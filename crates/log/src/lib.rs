#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Quasar Log
//!
//! One-call `tracing` setup for Quasar processes and tests.
//!
//! - [`Config`] -- level filter, output [`Format`], display options and
//!   [`Writer`], with `from_env`, `development` and `production` presets
//! - [`init`] -- installs the global subscriber
//!
//! ```no_run
//! quasar_log::init(&quasar_log::Config::from_env()).expect("logger");
//! tracing::info!(workers = 4, "Controller started");
//! ```

pub mod config;
pub mod error;
pub mod init;

pub use config::{Config, DisplayConfig, Format, Writer};
pub use error::LogError;
pub use init::init;
