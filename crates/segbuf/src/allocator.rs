//! Logical segment allocator with coalescing and compaction.
//!
//! [`SegmentAllocator`] is pure bookkeeping over an unbounded offset space.
//! It holds an offset-ordered record list that exactly partitions
//! `[0, high_water_mark)` into free and in-use ranges, plus a generational
//! slot table that backs the [`Segment`] handles given to callers. No element
//! data lives here; [`BufferManager`](crate::BufferManager) mirrors every
//! reported move onto physical storage.

use log::{debug, trace};

use crate::error::SegbufError;
use crate::handle::{RecordInfo, Relocation, Segment};
use crate::listener::RelocationTable;

/// One contiguous range in the offset space.
#[derive(Clone, Copy, Debug)]
struct Record {
    offset: usize,
    len: usize,
    /// Slot index of the owning segment, `None` when free.
    owner: Option<u32>,
}

/// Slot table entry backing a [`Segment`] handle.
#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: u32,
    offset: usize,
    len: usize,
    live: bool,
}

/// First-fit segment allocator over an abstract offset space.
///
/// Invariants, restored before every public method returns:
/// - records are sorted by offset and cover `[0, high_water_mark)` with no
///   gaps and no overlaps;
/// - no two adjacent records are both free;
/// - every in-use record is owned by exactly one live slot, and that slot
///   stores the record's offset and length.
#[derive(Default)]
pub struct SegmentAllocator {
    records: Vec<Record>,
    slots: Vec<Slot>,
    /// Dead slot indices available for reuse. Slots whose generation is
    /// exhausted are retired instead and never reissued.
    free_slots: Vec<u32>,
    live_count: usize,
    high_water_mark: usize,
    in_use_len: usize,
    listeners: RelocationTable,
}

impl SegmentAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a segment of `len` slots.
    ///
    /// The lowest free record that is large enough is used, split when it is
    /// larger than `len`. Otherwise the segment is bump-allocated at the
    /// high-water mark. Never relocates existing segments.
    pub fn allocate(&mut self, len: usize) -> Result<Segment, SegbufError> {
        if len == 0 {
            return Err(SegbufError::InvalidLength { len });
        }

        let fit = self.first_fit(len);
        let offset = match fit {
            Some(i) => self.records[i].offset,
            None => self.high_water_mark,
        };
        let end = offset
            .checked_add(len)
            .ok_or(SegbufError::CapacityOverflow)?;
        let segment = self.claim_slot(offset, len)?;

        let record_index = match fit {
            Some(i) => {
                let rec = self.records[i];
                if rec.len > len {
                    self.records[i].len = len;
                    self.records.insert(
                        i + 1,
                        Record {
                            offset: end,
                            len: rec.len - len,
                            owner: None,
                        },
                    );
                }
                i
            }
            None => {
                self.records.push(Record {
                    offset,
                    len,
                    owner: None,
                });
                self.high_water_mark = end;
                self.records.len() - 1
            }
        };
        self.records[record_index].owner = Some(segment.index);
        self.in_use_len += len;
        trace!("allocate {segment} at {offset} len={len}");
        Ok(segment)
    }

    /// Release a segment and coalesce it with free neighbours.
    ///
    /// The high-water mark is never lowered here, even when the freed range
    /// reaches the top; see [`reclaim_tail`](Self::reclaim_tail).
    pub fn free(&mut self, segment: Segment) -> Result<(), SegbufError> {
        let (offset, len) = {
            let slot = self.slot(segment)?;
            (slot.offset, slot.len)
        };
        let mut i = self.record_index(offset);
        self.records[i].owner = None;

        if i + 1 < self.records.len() && self.records[i + 1].owner.is_none() {
            self.records[i].len += self.records[i + 1].len;
            self.records.remove(i + 1);
        }
        if i > 0 && self.records[i - 1].owner.is_none() {
            self.records[i - 1].len += self.records[i].len;
            self.records.remove(i);
            i -= 1;
        }

        let slot = &mut self.slots[segment.index as usize];
        slot.live = false;
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free_slots.push(segment.index);
            }
            None => debug!("retiring slot {} at generation limit", segment.index),
        }
        self.live_count -= 1;
        self.listeners.remove(segment);
        self.in_use_len -= len;
        trace!(
            "free {segment} at {offset} len={len}, free record now [{}, {})",
            self.records[i].offset,
            self.records[i].offset + self.records[i].len
        );
        Ok(())
    }

    /// Compact every in-use record toward offset 0.
    ///
    /// Records keep their relative order. For each record whose offset
    /// changes, the segment's own listener fires first, then `on_move`.
    /// Moves are reported in ascending order of new offset, and each move's
    /// target is at or below its source, so replaying them in order as
    /// forward copies on a flat buffer never clobbers unmoved data.
    ///
    /// Afterwards at most one free record remains, covering
    /// `[in_use_len, high_water_mark)`. The high-water mark is unchanged.
    /// Returns the number of moves reported.
    pub fn defragment<F>(&mut self, mut on_move: F) -> usize
    where
        F: FnMut(&Relocation),
    {
        let mut compacted = Vec::with_capacity(self.live_count() + 1);
        let mut cursor = 0usize;
        let mut moves = 0usize;

        for rec in std::mem::take(&mut self.records) {
            let Some(owner) = rec.owner else { continue };
            if rec.offset != cursor {
                let slot = &mut self.slots[owner as usize];
                slot.offset = cursor;
                let relocation = Relocation {
                    segment: Segment::new(owner, slot.generation),
                    old_offset: rec.offset,
                    new_offset: cursor,
                    len: rec.len,
                };
                self.listeners.notify(&relocation);
                on_move(&relocation);
                moves += 1;
            }
            compacted.push(Record {
                offset: cursor,
                len: rec.len,
                owner: Some(owner),
            });
            cursor += rec.len;
        }

        if cursor < self.high_water_mark {
            compacted.push(Record {
                offset: cursor,
                len: self.high_water_mark - cursor,
                owner: None,
            });
        }
        self.records = compacted;
        debug!(
            "defragment: {moves} moves, in_use={}, high_water_mark={}",
            self.in_use_len, self.high_water_mark
        );
        moves
    }

    /// Length of the free record ending at the high-water mark, 0 if the top
    /// record is in use.
    pub fn trailing_free_len(&self) -> usize {
        match self.records.last() {
            Some(rec) if rec.owner.is_none() => rec.len,
            _ => 0,
        }
    }

    /// Drop a trailing free record and lower the high-water mark to match.
    ///
    /// Returns the number of slots reclaimed (0 if the top record is in use).
    pub fn reclaim_tail(&mut self) -> usize {
        match self.records.last() {
            Some(rec) if rec.owner.is_none() => {
                let len = rec.len;
                self.records.pop();
                self.high_water_mark -= len;
                debug!(
                    "reclaim_tail: {len} slots, high_water_mark={}",
                    self.high_water_mark
                );
                len
            }
            _ => 0,
        }
    }

    /// Register (or replace) the relocation listener for a live segment.
    pub fn set_on_relocate<F>(&mut self, segment: Segment, listener: F) -> Result<(), SegbufError>
    where
        F: FnMut(&Relocation) + 'static,
    {
        self.slot(segment)?;
        self.listeners.insert(segment, Box::new(listener));
        Ok(())
    }

    /// Remove the relocation listener for a live segment.
    ///
    /// Returns whether a listener was registered.
    pub fn clear_on_relocate(&mut self, segment: Segment) -> Result<bool, SegbufError> {
        self.slot(segment)?;
        Ok(self.listeners.remove(segment))
    }

    /// Current offset of a live segment.
    pub fn offset(&self, segment: Segment) -> Result<usize, SegbufError> {
        self.slot(segment).map(|s| s.offset)
    }

    /// Length of a live segment.
    pub fn len(&self, segment: Segment) -> Result<usize, SegbufError> {
        self.slot(segment).map(|s| s.len)
    }

    /// Whether `segment` is a live handle issued by this allocator.
    pub fn is_live(&self, segment: Segment) -> bool {
        self.slot(segment).is_ok()
    }

    /// Whether `len` slots could be allocated without the high-water mark
    /// passing `limit`.
    pub fn fits_within(&self, len: usize, limit: usize) -> bool {
        if len == 0 {
            return false;
        }
        self.first_fit(len).is_some()
            || self
                .high_water_mark
                .checked_add(len)
                .is_some_and(|end| end <= limit)
    }

    /// Whether `len` slots would fit within `limit` once
    /// [`defragment`](Self::defragment) has run.
    ///
    /// Compaction leaves all free space below the high-water mark in one
    /// record and does not move the high-water mark.
    pub fn fits_after_defragment(&self, len: usize, limit: usize) -> bool {
        len != 0
            && (self.high_water_mark - self.in_use_len >= len || self.fits_within(len, limit))
    }

    /// Smallest offset above which nothing has been allocated.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Total length of all live segments.
    pub fn in_use_len(&self) -> usize {
        self.in_use_len
    }

    /// Number of live segments.
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Number of free records below the high-water mark.
    pub fn free_record_count(&self) -> usize {
        self.records.iter().filter(|r| r.owner.is_none()).count()
    }

    /// Length of the largest free record, 0 if there is none.
    pub fn largest_free(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.owner.is_none())
            .map(|r| r.len)
            .max()
            .unwrap_or(0)
    }

    /// Whether there are no live segments.
    pub fn is_empty(&self) -> bool {
        self.in_use_len == 0
    }

    /// Iterate over all records in ascending offset order.
    pub fn records(&self) -> impl Iterator<Item = RecordInfo> + '_ {
        self.records.iter().map(|r| RecordInfo {
            offset: r.offset,
            len: r.len,
            segment: r
                .owner
                .map(|idx| Segment::new(idx, self.slots[idx as usize].generation)),
        })
    }

    /// Iterate over live segments in ascending offset order.
    pub fn segments(&self) -> impl Iterator<Item = (Segment, usize, usize)> + '_ {
        self.records().filter_map(|r| r.segment.map(|s| (s, r.offset, r.len)))
    }

    fn first_fit(&self, len: usize) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.owner.is_none() && r.len >= len)
    }

    fn slot(&self, segment: Segment) -> Result<&Slot, SegbufError> {
        match self.slots.get(segment.index as usize) {
            Some(slot) if slot.live && slot.generation == segment.generation => Ok(slot),
            _ => Err(SegbufError::StaleSegment { segment }),
        }
    }

    fn claim_slot(&mut self, offset: usize, len: usize) -> Result<Segment, SegbufError> {
        let segment = if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.offset = offset;
            slot.len = len;
            slot.live = true;
            Segment::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len())
                .map_err(|_| SegbufError::CapacityOverflow)?;
            self.slots.push(Slot {
                generation: 0,
                offset,
                len,
                live: true,
            });
            Segment::new(index, 0)
        };
        self.live_count += 1;
        Ok(segment)
    }

    fn record_index(&self, offset: usize) -> usize {
        self.records
            .binary_search_by_key(&offset, |r| r.offset)
            .expect("live slot offset always starts a record")
    }
}
