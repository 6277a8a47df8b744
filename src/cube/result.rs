//! Outcome of a single lookup-or-create call against the cube.

use serde::Serialize;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Flag-set view of a [`PointResult`], matching the codes reported by
/// telemetry SDKs for multidimensional point lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(transparent)]
pub struct ResultCodes(u8);

impl ResultCodes {
    /// No outcome recorded
    pub const NONE: Self = Self(0);
    /// A new point was created for the tuple
    pub const SUCCESS_NEW_POINT_CREATED: Self = Self(1);
    /// The tuple was already bound to a point
    pub const SUCCESS_EXISTING_POINT_RETRIEVED: Self = Self(2);
    /// A node at some level reached its cardinality cap
    pub const FAILURE_SUBDIMENSIONS_COUNT_LIMIT_REACHED: Self = Self(16);
    /// The cube reached its total points limit
    pub const FAILURE_TOTAL_POINTS_COUNT_LIMIT_REACHED: Self = Self(32);
    /// The point factory failed
    pub const FAILURE_POINT_INITIALIZATION_ERROR: Self = Self(64);
    /// Gave up waiting for a concurrent creator
    pub const FAILURE_ASYNC_TIMEOUT_REACHED: Self = Self(128);

    /// Raw flag bits
    #[inline(always)]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every flag in `other` is also set in `self`
    #[inline(always)]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if either success flag is set
    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 & (Self::SUCCESS_NEW_POINT_CREATED.0 | Self::SUCCESS_EXISTING_POINT_RETRIEVED.0) != 0
    }
}

impl BitOr for ResultCodes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResultCodes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ResultCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ResultCodes, &str); 6] = [
            (ResultCodes::SUCCESS_NEW_POINT_CREATED, "new_point_created"),
            (ResultCodes::SUCCESS_EXISTING_POINT_RETRIEVED, "existing_point_retrieved"),
            (
                ResultCodes::FAILURE_SUBDIMENSIONS_COUNT_LIMIT_REACHED,
                "subdimensions_count_limit_reached",
            ),
            (
                ResultCodes::FAILURE_TOTAL_POINTS_COUNT_LIMIT_REACHED,
                "total_points_count_limit_reached",
            ),
            (ResultCodes::FAILURE_POINT_INITIALIZATION_ERROR, "point_initialization_error"),
            (ResultCodes::FAILURE_ASYNC_TIMEOUT_REACHED, "async_timeout_reached"),
        ];

        let mut first = true;
        for (code, name) in NAMES {
            if self.contains(code) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }

        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Outcome of [`MultidimensionalCube::get_or_create_point`].
///
/// Exactly one variant applies, so success and failure can never be mixed.
/// `TimedOut` only describes a creation whose outcome was still unknown when
/// the caller stopped waiting; it is never combined with a confirmed point.
///
/// [`MultidimensionalCube::get_or_create_point`]: super::MultidimensionalCube::get_or_create_point
#[derive(Debug)]
pub enum PointResult<P> {
    /// This call ran the factory and bound the new point
    Created(Arc<P>),
    /// The tuple was already bound, possibly by a concurrent creator
    Existing(Arc<P>),
    /// The node at `coordinate_index` is full and the key is new
    CardinalityExceeded {
        /// Position in the tuple of the rejected value
        coordinate_index: usize,
    },
    /// The cube holds as many points as it is allowed to
    TotalPointsLimitReached,
    /// The factory failed; the tuple stays unbound and may be retried
    InitializationFailed {
        /// The factory's error message
        reason: Arc<str>,
    },
    /// A concurrent creator did not finish within the caller's timeout
    TimedOut,
}

impl<P> Clone for PointResult<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Created(point) => Self::Created(Arc::clone(point)),
            Self::Existing(point) => Self::Existing(Arc::clone(point)),
            Self::CardinalityExceeded { coordinate_index } => Self::CardinalityExceeded {
                coordinate_index: *coordinate_index,
            },
            Self::TotalPointsLimitReached => Self::TotalPointsLimitReached,
            Self::InitializationFailed { reason } => Self::InitializationFailed {
                reason: Arc::clone(reason),
            },
            Self::TimedOut => Self::TimedOut,
        }
    }
}

impl<P> PointResult<P> {
    /// The bound point, present iff the call succeeded
    #[inline]
    pub fn point(&self) -> Option<&Arc<P>> {
        match self {
            Self::Created(point) | Self::Existing(point) => Some(point),
            _ => None,
        }
    }

    /// Consume the result and return the bound point
    #[inline]
    pub fn into_point(self) -> Option<Arc<P>> {
        match self {
            Self::Created(point) | Self::Existing(point) => Some(point),
            _ => None,
        }
    }

    /// True when a point was returned
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Existing(_))
    }

    /// True only for the call that ran the factory
    #[inline]
    pub fn is_point_created_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// True for outcomes the caller should retry later
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut | Self::InitializationFailed { .. })
    }

    /// Level whose cap rejected the tuple; `None` when no coordinate is at fault
    #[inline]
    pub fn failure_coordinate_index(&self) -> Option<usize> {
        match self {
            Self::CardinalityExceeded { coordinate_index } => Some(*coordinate_index),
            _ => None,
        }
    }

    /// The single flag describing this outcome
    pub fn result_code(&self) -> ResultCodes {
        match self {
            Self::Created(_) => ResultCodes::SUCCESS_NEW_POINT_CREATED,
            Self::Existing(_) => ResultCodes::SUCCESS_EXISTING_POINT_RETRIEVED,
            Self::CardinalityExceeded { .. } => {
                ResultCodes::FAILURE_SUBDIMENSIONS_COUNT_LIMIT_REACHED
            },
            Self::TotalPointsLimitReached => ResultCodes::FAILURE_TOTAL_POINTS_COUNT_LIMIT_REACHED,
            Self::InitializationFailed { .. } => ResultCodes::FAILURE_POINT_INITIALIZATION_ERROR,
            Self::TimedOut => ResultCodes::FAILURE_ASYNC_TIMEOUT_REACHED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_variants() {
        let created = PointResult::Created(Arc::new(7u32));
        assert!(created.is_success());
        assert!(created.is_point_created_new());
        assert_eq!(created.result_code(), ResultCodes::SUCCESS_NEW_POINT_CREATED);
        assert_eq!(created.failure_coordinate_index(), None);
        assert_eq!(created.point().map(|p| **p), Some(7));

        let existing = PointResult::Existing(Arc::new(7u32));
        assert!(existing.is_success());
        assert!(!existing.is_point_created_new());
        assert!(existing.result_code().is_success());
    }

    #[test]
    fn test_cardinality_failure_names_coordinate() {
        let result: PointResult<u32> = PointResult::CardinalityExceeded { coordinate_index: 1 };
        assert!(!result.is_success());
        assert!(!result.is_retryable());
        assert!(result.point().is_none());
        assert_eq!(result.failure_coordinate_index(), Some(1));
        assert_eq!(
            result.result_code(),
            ResultCodes::FAILURE_SUBDIMENSIONS_COUNT_LIMIT_REACHED
        );
    }

    #[test]
    fn test_timeout_is_never_a_success() {
        let result: PointResult<u32> = PointResult::TimedOut;
        assert!(!result.is_success());
        assert!(result.is_retryable());
        assert!(!result.result_code().is_success());
        assert!(result.into_point().is_none());
    }

    #[test]
    fn test_codes_are_distinct_bits() {
        let all = [
            ResultCodes::SUCCESS_NEW_POINT_CREATED,
            ResultCodes::SUCCESS_EXISTING_POINT_RETRIEVED,
            ResultCodes::FAILURE_SUBDIMENSIONS_COUNT_LIMIT_REACHED,
            ResultCodes::FAILURE_TOTAL_POINTS_COUNT_LIMIT_REACHED,
            ResultCodes::FAILURE_POINT_INITIALIZATION_ERROR,
            ResultCodes::FAILURE_ASYNC_TIMEOUT_REACHED,
        ];

        let mut combined = ResultCodes::NONE;
        for code in all {
            assert_eq!(code.bits().count_ones(), 1);
            assert!(!combined.contains(code));
            combined |= code;
        }
        assert_eq!(combined.bits(), 1 | 2 | 16 | 32 | 64 | 128);
    }

    #[test]
    fn test_codes_display() {
        assert_eq!(ResultCodes::NONE.to_string(), "none");
        assert_eq!(
            (ResultCodes::SUCCESS_NEW_POINT_CREATED | ResultCodes::FAILURE_ASYNC_TIMEOUT_REACHED)
                .to_string(),
            "new_point_created|async_timeout_reached"
        );
    }
}
