use thiserror::Error;

/// Errors returned by cube construction, configuration and the CLI.
///
/// Lookup outcomes such as a cardinality rejection or a creation timeout
/// are not errors; they are reported as [`crate::cube::PointResult`].
#[derive(Error, Debug)]
pub enum CubeError {
    /// A coordinate tuple did not have one value per dimension
    #[error("Coordinate tuple has {actual} values but the cube has {expected} dimensions")]
    DimensionalityMismatch {
        /// Dimensionality of the cube
        expected: usize,
        /// Length of the tuple that was passed
        actual: usize,
    },

    /// A dimension index past the last dimension
    #[error("Dimension index {index} is out of range for a cube with {dimensionality} dimensions")]
    DimensionOutOfRange {
        /// Requested dimension
        index: usize,
        /// Dimensionality of the cube
        dimensionality: usize,
    },

    /// Caps or limits that cannot describe a cube
    #[error("Invalid cube definition: {0}")]
    InvalidCube(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A header key or value that would not round-trip
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// JSON output failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file is not valid YAML for [`crate::core::Config`]
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A workload task panicked or was cancelled
    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for cube operations
pub type Result<T> = std::result::Result<T, CubeError>;

impl CubeError {
    /// Creates a new dimensionality mismatch error
    pub fn dimensionality(expected: usize, actual: usize) -> Self {
        Self::DimensionalityMismatch { expected, actual }
    }

    /// Creates a new invalid cube definition error
    pub fn invalid_cube<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCube(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new header error
    pub fn header<S: Into<String>>(msg: S) -> Self {
        Self::InvalidHeader(msg.into())
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::DimensionalityMismatch { .. } | Self::DimensionOutOfRange { .. } => "contract",
            Self::InvalidCube(_) | Self::Config(_) | Self::Yaml(_) => "config",
            Self::InvalidHeader(_) => "validation",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
        }
    }
}
