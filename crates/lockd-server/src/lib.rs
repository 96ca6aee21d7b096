//! lockd Server - process assembly for the named-lock coordinator
//!
//! Loads the configuration, sets up logging and metrics descriptions, and runs
//! the lock engine from `lockd-core` until a shutdown signal arrives.

pub mod error;
pub mod metrics;
pub mod model;
pub mod startup;

pub use error::ConfigError;
pub use model::Configuration;
pub use model::config::Cli;
