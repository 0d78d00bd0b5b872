//! Segbuf error types.

use std::error::Error;
use std::fmt;

use crate::handle::Segment;

/// Coarse classification of a [`SegbufError`].
///
/// Every error in this crate is a contract violation by the caller or a
/// failure to acquire physical memory. None of them are transient, so
/// nothing inside the crate retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A value passed in was out of range (zero length, bad element size).
    InvalidArgument,
    /// The call was well-formed but not valid for the handle's state
    /// (freed segment, view from another manager).
    InvalidOperation,
    /// The buffer manager has already been disposed.
    UseAfterDispose,
    /// Physical storage could not be acquired.
    AllocationFailed,
}

/// Errors that can occur during allocator and buffer manager operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegbufError {
    /// Allocation lengths must be strictly positive.
    InvalidLength {
        /// The rejected length.
        len: usize,
    },
    /// The segment was freed, or never belonged to this allocator.
    StaleSegment {
        /// The offending handle.
        segment: Segment,
    },
    /// A view was used against a manager other than the one that created it.
    ForeignView {
        /// Instance id of the manager that created the view.
        view_owner: u64,
        /// Instance id of the manager the view was used against.
        manager: u64,
    },
    /// A view element type does not match the manager's slot width.
    ElementSizeMismatch {
        /// Slot width configured on the manager, in bytes.
        expected: usize,
        /// `size_of` the requested element type.
        actual: usize,
    },
    /// An index fell outside the segment or the physical store.
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of addressable elements.
        len: usize,
    },
    /// The buffer configuration failed validation.
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The buffer manager was used after `dispose()`.
    UseAfterDispose,
    /// Growing the physical store failed; existing storage is untouched.
    GrowthFailed {
        /// Slot count that was being reserved.
        requested_slots: usize,
    },
    /// An offset or byte size computation overflowed `usize`.
    CapacityOverflow,
}

impl SegbufError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLength { .. }
            | Self::ElementSizeMismatch { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::InvalidConfig { .. } => ErrorKind::InvalidArgument,
            Self::StaleSegment { .. } | Self::ForeignView { .. } => ErrorKind::InvalidOperation,
            Self::UseAfterDispose => ErrorKind::UseAfterDispose,
            Self::GrowthFailed { .. } | Self::CapacityOverflow => ErrorKind::AllocationFailed,
        }
    }
}

impl fmt::Display for SegbufError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { len } => {
                write!(f, "invalid allocation length {len}: must be positive")
            }
            Self::StaleSegment { segment } => {
                write!(f, "segment {segment} is not live in this allocator")
            }
            Self::ForeignView {
                view_owner,
                manager,
            } => {
                write!(
                    f,
                    "view created by manager {view_owner} used against manager {manager}"
                )
            }
            Self::ElementSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "element size mismatch: slots are {expected} bytes, type is {actual} bytes"
                )
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid buffer config: {reason}"),
            Self::UseAfterDispose => write!(f, "buffer manager used after dispose"),
            Self::GrowthFailed { requested_slots } => {
                write!(f, "failed to grow physical storage to {requested_slots} slots")
            }
            Self::CapacityOverflow => write!(f, "capacity computation overflowed"),
        }
    }
}

impl Error for SegbufError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            SegbufError::InvalidLength { len: 0 }.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            SegbufError::StaleSegment {
                segment: Segment::new(0, 1)
            }
            .kind(),
            ErrorKind::InvalidOperation
        );
        assert_eq!(SegbufError::UseAfterDispose.kind(), ErrorKind::UseAfterDispose);
        assert_eq!(
            SegbufError::GrowthFailed { requested_slots: 8 }.kind(),
            ErrorKind::AllocationFailed
        );
    }

    #[test]
    fn display_mentions_values() {
        let msg = SegbufError::IndexOutOfBounds { index: 9, len: 4 }.to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains('4'));
    }
}
