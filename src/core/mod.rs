//! Core configuration and error types for metricube.
//!
//! Everything outside the cube engine itself that the rest of the crate
//! shares: the error type, the `Result` alias and the layered configuration.

#![warn(missing_docs)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, CubeConfig, LoggingConfig, WorkloadConfig};
pub use error::{CubeError, Result};
