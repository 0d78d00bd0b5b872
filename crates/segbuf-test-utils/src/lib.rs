//! Test utilities for segbuf development.
//!
//! Provides invariant checkers for [`SegmentAllocator`] and
//! [`BufferManager`], a [`MoveLog`] that records relocations, and a seeded
//! [`OpDriver`] that runs random allocate/free/defragment sequences while
//! verifying that segment contents survive every move.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod driver;

use std::cell::RefCell;
use std::rc::Rc;

use segbuf::{BufferManager, Relocation, SegmentAllocator};
use smallvec::SmallVec;

pub use driver::{Op, OpDriver};

/// Check the record partition invariants of an allocator.
///
/// Returns a description of the first violation found.
pub fn check_allocator(alloc: &SegmentAllocator) -> Result<(), String> {
    let mut cursor = 0usize;
    let mut prev_free = false;
    let mut in_use = 0usize;
    let mut live = 0usize;
    for rec in alloc.records() {
        if rec.offset != cursor {
            return Err(format!(
                "record at {} does not start at cursor {cursor}",
                rec.offset
            ));
        }
        if rec.len == 0 {
            return Err(format!("empty record at {}", rec.offset));
        }
        if prev_free && rec.is_free() {
            return Err(format!("adjacent free records ending at {}", rec.offset));
        }
        if let Some(seg) = rec.segment {
            if alloc.offset(seg) != Ok(rec.offset) || alloc.len(seg) != Ok(rec.len) {
                return Err(format!("{seg} disagrees with its record at {}", rec.offset));
            }
            in_use += rec.len;
            live += 1;
        }
        prev_free = rec.is_free();
        cursor = rec.end();
    }
    if cursor != alloc.high_water_mark() {
        return Err(format!(
            "records end at {cursor}, high-water mark is {}",
            alloc.high_water_mark()
        ));
    }
    if in_use != alloc.in_use_len() {
        return Err(format!(
            "in-use records sum to {in_use}, allocator reports {}",
            alloc.in_use_len()
        ));
    }
    if live != alloc.live_count() {
        return Err(format!(
            "{live} in-use records, allocator reports {} live segments",
            alloc.live_count()
        ));
    }
    Ok(())
}

/// Check allocator invariants plus capacity and mask consistency.
pub fn check_manager(mgr: &BufferManager) -> Result<(), String> {
    let alloc = mgr.allocator().map_err(|e| e.to_string())?;
    check_allocator(alloc)?;
    if mgr.capacity() < alloc.high_water_mark() {
        return Err(format!(
            "capacity {} below high-water mark {}",
            mgr.capacity(),
            alloc.high_water_mark()
        ));
    }
    let mask = mgr.in_use_mask().map_err(|e| e.to_string())?;
    if mask.len() != mgr.capacity() {
        return Err(format!(
            "mask has {} entries for capacity {}",
            mask.len(),
            mgr.capacity()
        ));
    }
    let mut expected = vec![false; mask.len()];
    for (_, offset, len) in alloc.segments() {
        expected[offset..offset + len].fill(true);
    }
    if let Some(i) = mask.iter().zip(&expected).position(|(a, b)| a != b) {
        return Err(format!(
            "mask[{i}] is {}, expected {}",
            mask[i], expected[i]
        ));
    }
    Ok(())
}

/// Shared recorder for relocations.
///
/// Clone it into as many listeners as needed; every clone appends to the
/// same log.
#[derive(Clone, Default)]
pub struct MoveLog {
    moves: Rc<RefCell<SmallVec<[Relocation; 8]>>>,
}

impl MoveLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener closure that appends to this log.
    pub fn listener(&self) -> impl FnMut(&Relocation) + 'static {
        let moves = Rc::clone(&self.moves);
        move |r: &Relocation| moves.borrow_mut().push(*r)
    }

    /// Moves as `(old_offset, new_offset, len)` triples, in arrival order.
    pub fn triples(&self) -> Vec<(usize, usize, usize)> {
        self.moves
            .borrow()
            .iter()
            .map(|r| (r.old_offset, r.new_offset, r.len))
            .collect()
    }

    /// All recorded relocations.
    pub fn relocations(&self) -> Vec<Relocation> {
        self.moves.borrow().to_vec()
    }

    pub fn len(&self) -> usize {
        self.moves.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.moves.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segbuf::BufferConfig;

    #[test]
    fn fresh_allocator_passes() {
        assert_eq!(check_allocator(&SegmentAllocator::new()), Ok(()));
    }

    #[test]
    fn fragmented_manager_passes() {
        let mut mgr =
            BufferManager::new(BufferConfig::default().with_initial_capacity(8)).unwrap();
        let a = mgr.allocate(3).unwrap();
        let _b = mgr.allocate(3).unwrap();
        mgr.free(a).unwrap();
        assert_eq!(check_manager(&mgr), Ok(()));
    }

    #[test]
    fn move_log_clones_share_storage() {
        let log = MoveLog::new();
        let mut alloc = SegmentAllocator::new();
        let a = alloc.allocate(2).unwrap();
        let b = alloc.allocate(2).unwrap();
        alloc.free(a).unwrap();
        let mut global = log.listener();
        alloc.set_on_relocate(b, log.listener()).unwrap();
        alloc.defragment(|r| global(r));
        assert_eq!(log.triples(), vec![(2, 0, 2), (2, 0, 2)]);
        log.clear();
        assert!(log.is_empty());
    }
}
