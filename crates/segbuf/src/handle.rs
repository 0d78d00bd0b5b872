//! Segment handles and relocation descriptors.
//!
//! A [`Segment`] is a generational index into the allocator's slot table.
//! It never stores an offset: the offset lives in the slot and is rewritten
//! by defragmentation, so the handle itself stays valid across moves. Freeing
//! a segment bumps its slot generation, which turns every outstanding copy of
//! the handle into a detectably stale one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to one contiguous, fixed-length range in the allocator.
///
/// Handles are `Copy` and cheap to store in consumer tables. Resolve the
/// current offset with [`SegmentAllocator::offset`](crate::SegmentAllocator::offset)
/// or the matching [`BufferManager`](crate::BufferManager) accessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    /// Index into the allocator's slot table.
    pub(crate) index: u32,
    /// Generation of the slot when this handle was issued.
    pub(crate) generation: u32,
}

impl Segment {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index backing this handle.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation this handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Segment(idx={}, gen={})", self.index, self.generation)
    }
}

/// One data move performed by defragmentation.
///
/// Offsets and length are in element slots. `new_offset <= old_offset`
/// always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Relocation {
    /// The segment that moved.
    pub segment: Segment,
    /// Offset before the move.
    pub old_offset: usize,
    /// Offset after the move.
    pub new_offset: usize,
    /// Length of the moved range.
    pub len: usize,
}

impl fmt::Display for Relocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{} len={}",
            self.segment, self.old_offset, self.new_offset, self.len
        )
    }
}

/// Read-only snapshot of one allocator record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordInfo {
    /// First slot covered by the record.
    pub offset: usize,
    /// Number of slots covered.
    pub len: usize,
    /// Owning segment, or `None` for a free record.
    pub segment: Option<Segment>,
}

impl RecordInfo {
    /// Whether this record is free.
    pub fn is_free(&self) -> bool {
        self.segment.is_none()
    }

    /// One past the last slot covered.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Counter for unique [`ManagerId`] allocation.
static MANAGER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a [`BufferManager`](crate::BufferManager).
///
/// Views carry the id of the manager that created them, so a view handed to
/// a different manager is rejected instead of silently reading unrelated
/// storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u64);

impl ManagerId {
    /// Allocate a fresh id never returned before in this process.
    pub fn next() -> Self {
        Self(MANAGER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_accessors() {
        let s = Segment::new(3, 7);
        assert_eq!(s.index(), 3);
        assert_eq!(s.generation(), 7);
        assert_eq!(s.to_string(), "Segment(idx=3, gen=7)");
    }

    #[test]
    fn record_info_end_and_free() {
        let free = RecordInfo {
            offset: 4,
            len: 6,
            segment: None,
        };
        assert!(free.is_free());
        assert_eq!(free.end(), 10);
    }

    #[test]
    fn manager_ids_are_unique() {
        let a = ManagerId::next();
        let b = ManagerId::next();
        assert_ne!(a, b);
    }
}
