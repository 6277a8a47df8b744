//! metricube - concurrent multidimensional metric cube.
//!
//! A telemetry SDK keeps one pre-aggregated series per distinct combination
//! of dimension values. metricube is the in-memory index for those series: a
//! thread-safe N-dimensional cube that creates series lazily, bounds
//! cardinality per dimension, and coordinates callers racing to create the
//! same series.
//!
//! # Features
//!
//! - **Lazy creation**: points are built by a caller-supplied factory on first lookup
//! - **Bounded cardinality**: per-dimension caps plus a total points limit
//! - **Single creation**: racing callers share one factory invocation, with timeouts
//! - **Fine-grained locking**: contention is scoped to a single node
//!
//! # Architecture
//!
//! - `cube`: the cube engine and its result model
//! - `headers`: `key=value` header list helpers used by the SDK
//! - `workload`: concurrent workload driver used by the CLI
//! - `core`: configuration and errors
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```
//! use metricube_lib::cube::MultidimensionalCube;
//! use std::time::Duration;
//!
//! let cube = MultidimensionalCube::new(vec![10, 10]).unwrap();
//! let result = cube
//!     .get_or_create_point(&["GET", "200"], || 0u64, Duration::from_millis(50))
//!     .unwrap();
//! assert!(result.is_point_created_new());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod core;
pub mod cube;
pub mod headers;
pub mod workload;

// Re-export core types for convenience
pub use crate::core::{Config, CubeError, Result};
pub use crate::cube::{MultidimensionalCube, PointResult, ResultCodes};
