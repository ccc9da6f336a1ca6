//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the sheet sync service:
//! - Configuration management (credentials, source location, sheet metadata)
//! - Logging and tracing setup
//!
//! Every other crate in the workspace logs through `tracing` and is configured
//! from the [`config::SyncServiceConfig`] defined here.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{GraphCredentials, SourceConfig, SyncServiceConfig, SyncServiceConfigBuilder};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LoggingConfig};
