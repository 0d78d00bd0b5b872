//! Buffer manager: growable physical storage driven by a segment allocator.
//!
//! [`BufferManager`] owns one [`PhysicalStore`] and one [`SegmentAllocator`]
//! and keeps them in lockstep. Allocation first tries the current capacity,
//! then compacts (mirroring every reported move onto the store), then grows
//! the store according to the configured [`GrowthPolicy`](crate::GrowthPolicy).
//! A per-slot in-use mask tracks which physical slots belong to a live
//! segment.
//!
//! # Lifecycle
//!
//! ```text
//! Active ──dispose()──▶ Disposed (terminal)
//! ```
//!
//! Every operation on a disposed manager, including a second `dispose()`,
//! fails with [`SegbufError::UseAfterDispose`].

use bytemuck::Pod;
use log::{debug, trace};

use crate::allocator::SegmentAllocator;
use crate::config::BufferConfig;
use crate::error::SegbufError;
use crate::handle::{ManagerId, Relocation, Segment};
use crate::storage::{PhysicalStore, ReservedStore};
use crate::view::View;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ManagerState {
    Active,
    Disposed,
}

/// Point-in-time counters for a [`BufferManager`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Physical capacity in slots.
    pub capacity: usize,
    /// Allocator high-water mark in slots.
    pub high_water_mark: usize,
    /// Slots owned by live segments.
    pub in_use: usize,
    /// Free records below the high-water mark.
    pub free_records: usize,
    /// Number of live segments.
    pub live_segments: usize,
    /// Times the physical store has grown.
    pub growths: u64,
    /// Times the allocator has been compacted.
    pub defragmentations: u64,
    /// Total segment moves performed by compaction.
    pub moves: u64,
}

/// Storage and mask acquired for a resize that has not been applied yet.
struct PendingResize {
    store: ReservedStore,
    mask: Vec<bool>,
}

/// Owner of a growable contiguous slot store and the segments carved from it.
///
/// Not thread-safe: every method runs to completion on the calling thread
/// and callers sharing a manager across threads must serialise access
/// themselves.
pub struct BufferManager {
    id: ManagerId,
    config: BufferConfig,
    allocator: SegmentAllocator,
    storage: PhysicalStore,
    /// `mask[i]` is true iff slot `i` lies inside a live segment.
    mask: Vec<bool>,
    state: ManagerState,
    growths: u64,
    defragmentations: u64,
    moves: u64,
}

impl BufferManager {
    /// Create an active manager with `config.initial_capacity` zeroed slots.
    pub fn new(config: BufferConfig) -> Result<Self, SegbufError> {
        config.validate()?;
        let storage = PhysicalStore::new(config.element_size, config.initial_capacity)?;
        let mask = vec![false; config.initial_capacity];
        let id = ManagerId::next();
        debug!(
            "manager {id}: {} slots x {} bytes",
            config.initial_capacity, config.element_size
        );
        Ok(Self {
            id,
            config,
            allocator: SegmentAllocator::new(),
            storage,
            mask,
            state: ManagerState::Active,
            growths: 0,
            defragmentations: 0,
            moves: 0,
        })
    }

    /// Create a typed view over this manager's storage.
    ///
    /// `size_of::<T>()` must equal the configured element size.
    pub fn create_view<T: Pod>(&self) -> Result<View<T>, SegbufError> {
        self.ensure_active()?;
        let actual = std::mem::size_of::<T>();
        if actual != self.config.element_size {
            return Err(SegbufError::ElementSizeMismatch {
                expected: self.config.element_size,
                actual,
            });
        }
        Ok(View::new(self.id))
    }

    /// Allocate a zeroed segment of `len` slots.
    ///
    /// When the request does not fit in the current capacity the manager
    /// compacts first, and grows the store only if compaction was not enough.
    /// Relocation listeners fire for every segment moved on the way.
    ///
    /// Any growth is sized and reserved before compaction starts, so a
    /// request that fails leaves every segment where it was.
    pub fn allocate(&mut self, len: usize) -> Result<Segment, SegbufError> {
        self.ensure_active()?;
        if len == 0 {
            return Err(SegbufError::InvalidLength { len });
        }

        let capacity = self.storage.capacity();
        if !self.allocator.fits_within(len, capacity) {
            let growth = if self.allocator.fits_after_defragment(len, capacity) {
                None
            } else {
                Some(self.prepare_growth(len)?)
            };
            self.compact()?;
            if let Some(pending) = growth {
                let target = pending.store.capacity();
                self.apply_resize(pending)?;
                self.growths += 1;
                debug!("manager {}: grow {capacity} -> {target} slots", self.id);
            }
        }

        let segment = self.allocator.allocate(len)?;
        let offset = self.allocator.offset(segment)?;
        self.storage.zero(offset, len)?;
        self.mask[offset..offset + len].fill(true);
        trace!("manager {}: allocate {segment} at {offset} len={len}", self.id);
        Ok(segment)
    }

    /// Release a segment. Physical capacity is not reduced.
    pub fn free(&mut self, segment: Segment) -> Result<(), SegbufError> {
        self.ensure_active()?;
        let (offset, len) = self.segment_range(segment)?;
        self.allocator.free(segment)?;
        self.mask[offset..offset + len].fill(false);
        trace!("manager {}: free {segment}", self.id);
        Ok(())
    }

    /// Compact all live segments toward slot 0, moving their data.
    ///
    /// Returns the number of segments moved.
    pub fn defragment(&mut self) -> Result<usize, SegbufError> {
        self.ensure_active()?;
        self.compact()
    }

    /// Drop trailing free space and shrink the store to match, never below
    /// the configured initial capacity.
    ///
    /// Only space above the last live segment is released, so call
    /// [`defragment`](Self::defragment) first to reclaim interior holes.
    /// Returns the number of slots released.
    pub fn shrink_to_fit(&mut self) -> Result<usize, SegbufError> {
        self.ensure_active()?;
        let current = self.storage.capacity();
        let target = (self.allocator.high_water_mark() - self.allocator.trailing_free_len())
            .max(self.config.initial_capacity);
        if target >= current {
            self.allocator.reclaim_tail();
            return Ok(0);
        }
        let pending = self.prepare_resize(target)?;
        self.apply_resize(pending)?;
        self.allocator.reclaim_tail();
        debug!("manager {}: shrink {current} -> {target} slots", self.id);
        Ok(current - target)
    }

    /// Register (or replace) the relocation listener for `segment`.
    pub fn set_on_relocate<F>(&mut self, segment: Segment, listener: F) -> Result<(), SegbufError>
    where
        F: FnMut(&Relocation) + 'static,
    {
        self.ensure_active()?;
        self.allocator.set_on_relocate(segment, listener)
    }

    /// Remove the relocation listener for `segment`.
    pub fn clear_on_relocate(&mut self, segment: Segment) -> Result<bool, SegbufError> {
        self.ensure_active()?;
        self.allocator.clear_on_relocate(segment)
    }

    /// Current offset of a live segment.
    pub fn offset(&self, segment: Segment) -> Result<usize, SegbufError> {
        self.segment_range(segment).map(|(offset, _)| offset)
    }

    /// Length of a live segment.
    pub fn len(&self, segment: Segment) -> Result<usize, SegbufError> {
        self.segment_range(segment).map(|(_, len)| len)
    }

    /// Per-slot allocation state, exactly `capacity()` long.
    pub fn in_use_mask(&self) -> Result<&[bool], SegbufError> {
        self.ensure_active()?;
        Ok(&self.mask)
    }

    /// The underlying segment allocator, for inspection.
    pub fn allocator(&self) -> Result<&SegmentAllocator, SegbufError> {
        self.ensure_active()?;
        Ok(&self.allocator)
    }

    /// Snapshot of the manager's counters.
    pub fn stats(&self) -> Result<BufferStats, SegbufError> {
        self.ensure_active()?;
        Ok(BufferStats {
            capacity: self.storage.capacity(),
            high_water_mark: self.allocator.high_water_mark(),
            in_use: self.allocator.in_use_len(),
            free_records: self.allocator.free_record_count(),
            live_segments: self.allocator.live_count(),
            growths: self.growths,
            defragmentations: self.defragmentations,
            moves: self.moves,
        })
    }

    /// Release all physical storage and invalidate every segment and view.
    pub fn dispose(&mut self) -> Result<(), SegbufError> {
        self.ensure_active()?;
        self.storage.release();
        self.mask = Vec::new();
        self.allocator = SegmentAllocator::new();
        self.state = ManagerState::Disposed;
        debug!("manager {}: disposed", self.id);
        Ok(())
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.state == ManagerState::Disposed
    }

    /// Unique id of this manager instance.
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Physical capacity in slots (0 once disposed).
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Slot width in bytes.
    pub fn element_size(&self) -> usize {
        self.config.element_size
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Memory usage of the physical store and mask in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.storage.memory_bytes() + self.mask.capacity()
    }

    pub(crate) fn segment_range(&self, segment: Segment) -> Result<(usize, usize), SegbufError> {
        self.ensure_active()?;
        Ok((self.allocator.offset(segment)?, self.allocator.len(segment)?))
    }

    pub(crate) fn slot_bytes(
        &self,
        owner: ManagerId,
        offset: usize,
        len: usize,
    ) -> Result<&[u8], SegbufError> {
        self.check_view(owner)?;
        self.storage.bytes(offset, len)
    }

    pub(crate) fn slot_bytes_mut(
        &mut self,
        owner: ManagerId,
        offset: usize,
        len: usize,
    ) -> Result<&mut [u8], SegbufError> {
        self.check_view(owner)?;
        self.storage.bytes_mut(offset, len)
    }

    fn check_view(&self, owner: ManagerId) -> Result<(), SegbufError> {
        self.ensure_active()?;
        if owner != self.id {
            return Err(SegbufError::ForeignView {
                view_owner: owner.get(),
                manager: self.id.get(),
            });
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), SegbufError> {
        match self.state {
            ManagerState::Active => Ok(()),
            ManagerState::Disposed => Err(SegbufError::UseAfterDispose),
        }
    }

    /// Defragment the allocator and replay each move on the store, in the
    /// order reported.
    fn compact(&mut self) -> Result<usize, SegbufError> {
        let storage = &mut self.storage;
        let mut copy_result = Ok(());
        let moves = self.allocator.defragment(|r| {
            if copy_result.is_ok() {
                copy_result = storage.move_slots(r.old_offset, r.new_offset, r.len);
            }
        });
        copy_result?;
        self.rebuild_mask();
        self.defragmentations += 1;
        self.moves += moves as u64;
        debug!("manager {}: defragment moved {moves} segments", self.id);
        Ok(moves)
    }

    /// Reserve a store large enough to bump-allocate `len` slots at the
    /// high-water mark.
    fn prepare_growth(&self, len: usize) -> Result<PendingResize, SegbufError> {
        let required = self
            .allocator
            .high_water_mark()
            .checked_add(len)
            .ok_or(SegbufError::CapacityOverflow)?;
        let target = self
            .config
            .growth
            .next_capacity(self.storage.capacity(), required)
            .ok_or(SegbufError::CapacityOverflow)?;
        self.prepare_resize(target)
    }

    fn prepare_resize(&self, capacity: usize) -> Result<PendingResize, SegbufError> {
        let mut mask = Vec::new();
        mask.try_reserve_exact(capacity)
            .map_err(|_| SegbufError::GrowthFailed {
                requested_slots: capacity,
            })?;
        let store = self.storage.reserve(capacity)?;
        Ok(PendingResize { store, mask })
    }

    /// Swap in a reserved store carrying every live segment, and a mask
    /// rebuilt from the current layout.
    fn apply_resize(&mut self, pending: PendingResize) -> Result<(), SegbufError> {
        let PendingResize { store, mut mask } = pending;
        let capacity = store.capacity();
        self.storage.install(
            store,
            self.allocator.segments().map(|(_, offset, len)| (offset, len)),
        )?;
        mask.resize(capacity, false);
        self.mask = mask;
        self.rebuild_mask();
        Ok(())
    }

    fn rebuild_mask(&mut self) {
        self.mask.fill(false);
        for (_, offset, len) in self.allocator.segments() {
            self.mask[offset..offset + len].fill(true);
        }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        if self.state == ManagerState::Active && self.allocator.live_count() > 0 {
            debug!(
                "manager {}: dropped without dispose, {} live segments",
                self.id,
                self.allocator.live_count()
            );
        }
    }
}
