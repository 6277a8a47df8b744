//! Configuration management for metricube.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by the CLI layer)
//! - Validation and defaults

use crate::core::{CubeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete configuration for metricube
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cube shape and limits
    pub cube: CubeConfig,
    /// Simulated workload settings
    pub workload: WorkloadConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Cube configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeConfig {
    /// Maximum distinct values per node, one entry per dimension
    pub cardinality_caps: Vec<usize>,
    /// Maximum number of leaf points across the whole cube
    pub total_points_limit: usize,
    /// How long a caller waits on another caller's pending creation
    #[serde(with = "humantime_serde")]
    pub creation_timeout: Duration,
}

/// Workload simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Lookups issued by each worker
    pub operations_per_worker: usize,
    /// Size of the value pool drawn from for each dimension
    pub values_per_dimension: usize,
    /// Artificial delay inside the point factory
    #[serde(with = "humantime_serde")]
    pub factory_delay: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cube: CubeConfig::default(),
            workload: WorkloadConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl Default for CubeConfig {
    fn default() -> Self {
        CubeConfig {
            cardinality_caps: vec![100, 100, 1000],
            total_points_limit: 100_000,
            creation_timeout: Duration::from_millis(500),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            workers: 8,
            operations_per_worker: 10_000,
            values_per_dimension: 50,
            factory_delay: Duration::ZERO,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.cube.validate()?;

        if self.workload.workers == 0 {
            return Err(CubeError::config("workload.workers must be greater than 0"));
        }

        if self.workload.values_per_dimension == 0 {
            return Err(CubeError::config(
                "workload.values_per_dimension must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl CubeConfig {
    /// Number of dimensions described by this configuration
    pub fn dimensionality(&self) -> usize {
        self.cardinality_caps.len()
    }

    /// Validate the cube shape
    pub fn validate(&self) -> Result<()> {
        if self.cardinality_caps.is_empty() {
            return Err(CubeError::config("cube.cardinality_caps must name at least one dimension"));
        }

        if let Some(index) = self.cardinality_caps.iter().position(|&cap| cap == 0) {
            return Err(CubeError::config(format!(
                "cube.cardinality_caps[{}] must be greater than 0",
                index
            )));
        }

        if self.total_points_limit == 0 {
            return Err(CubeError::config("cube.total_points_limit must be greater than 0"));
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)?;
        Ok(self)
    }

    /// Set per-dimension cardinality caps
    pub fn cardinality_caps(mut self, caps: Vec<usize>) -> Self {
        self.config.cube.cardinality_caps = caps;
        self
    }

    /// Set the total points limit
    pub fn total_points_limit(mut self, limit: usize) -> Self {
        self.config.cube.total_points_limit = limit;
        self
    }

    /// Set the creation wait timeout
    pub fn creation_timeout(mut self, timeout: Duration) -> Self {
        self.config.cube.creation_timeout = timeout;
        self
    }

    /// Set number of workload workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workload.workers = workers;
        self
    }

    /// Set lookups per worker
    pub fn operations_per_worker(mut self, operations: usize) -> Self {
        self.config.workload.operations_per_worker = operations;
        self
    }

    /// Set distinct values drawn per dimension
    pub fn values_per_dimension(mut self, values: usize) -> Self {
        self.config.workload.values_per_dimension = values;
        self
    }

    /// Set how long each point factory takes in the workload
    pub fn factory_delay(mut self, delay: Duration) -> Self {
        self.config.workload.factory_delay = delay;
        self
    }

    /// Enable structured logging
    pub fn structured_logging(mut self, structured: bool) -> Self {
        self.config.logging.structured = structured;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cube.dimensionality(), 3);
    }

    #[test]
    fn test_zero_cap_rejected() {
        let mut config = Config::default();
        config.cube.cardinality_caps = vec![10, 0];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cardinality_caps[1]"));
    }

    #[test]
    fn test_empty_caps_rejected() {
        let result = ConfigBuilder::new().cardinality_caps(Vec::new()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .cardinality_caps(vec![4, 8])
            .total_points_limit(32)
            .creation_timeout(Duration::from_millis(50))
            .workers(2)
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.cube.cardinality_caps, vec![4, 8]);
        assert_eq!(config.cube.total_points_limit, 32);
        assert_eq!(config.cube.creation_timeout, Duration::from_millis(50));
        assert_eq!(config.workload.workers, 2);
        assert!(config.debug);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
cube:
  cardinality_caps: [2, 2]
  creation_timeout: 250ms
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.cube.cardinality_caps, vec![2, 2]);
        assert_eq!(config.cube.creation_timeout, Duration::from_millis(250));
        assert_eq!(config.cube.total_points_limit, 100_000);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.workload.workers, 8);
    }
}
