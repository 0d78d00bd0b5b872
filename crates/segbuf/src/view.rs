//! Typed views over a buffer manager's physical storage.
//!
//! A [`View`] is a non-owning token. It records which manager created it and
//! the element type, and nothing else: every access goes back through the
//! manager and re-resolves the segment's current offset against the current
//! backing store. Growth and defragmentation therefore never invalidate a
//! view, and a view can never outlive the storage it reads.
//!
//! Several views of different element types may alias the same storage.
//! Which type a given segment holds is the caller's business.

use std::fmt;
use std::marker::PhantomData;

use bytemuck::Pod;

use crate::error::SegbufError;
use crate::handle::{ManagerId, Segment};
use crate::manager::BufferManager;

/// Typed accessor over a [`BufferManager`]'s slots.
///
/// Created by [`BufferManager::create_view`]. `T` has exactly the manager's
/// slot width.
pub struct View<T> {
    owner: ManagerId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for View<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for View<T> {}

impl<T> fmt::Debug for View<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("owner", &self.owner)
            .field("element", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Pod> View<T> {
    pub(crate) fn new(owner: ManagerId) -> Self {
        Self {
            owner,
            _marker: PhantomData,
        }
    }

    /// Id of the manager this view belongs to.
    pub fn owner(&self) -> ManagerId {
        self.owner
    }

    /// Read element `index` of `segment`.
    pub fn get(
        &self,
        manager: &BufferManager,
        segment: Segment,
        index: usize,
    ) -> Result<T, SegbufError> {
        let offset = self.element_offset(manager, segment, index)?;
        self.get_at(manager, offset)
    }

    /// Write element `index` of `segment`.
    pub fn set(
        &self,
        manager: &mut BufferManager,
        segment: Segment,
        index: usize,
        value: T,
    ) -> Result<(), SegbufError> {
        let offset = self.element_offset(manager, segment, index)?;
        self.set_at(manager, offset, value)
    }

    /// Read the slot at raw logical `offset`.
    pub fn get_at(&self, manager: &BufferManager, offset: usize) -> Result<T, SegbufError> {
        let bytes = manager.slot_bytes(self.owner, offset, 1)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Write the slot at raw logical `offset`.
    pub fn set_at(
        &self,
        manager: &mut BufferManager,
        offset: usize,
        value: T,
    ) -> Result<(), SegbufError> {
        let bytes = manager.slot_bytes_mut(self.owner, offset, 1)?;
        bytes.copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Copy every element of `segment` out.
    pub fn read(&self, manager: &BufferManager, segment: Segment) -> Result<Vec<T>, SegbufError> {
        let (offset, len) = manager.segment_range(segment)?;
        let bytes = manager.slot_bytes(self.owner, offset, len)?;
        Ok(bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Overwrite `segment` with `values`, which must match its length.
    pub fn write(
        &self,
        manager: &mut BufferManager,
        segment: Segment,
        values: &[T],
    ) -> Result<(), SegbufError> {
        let (offset, len) = manager.segment_range(segment)?;
        if values.len() != len {
            return Err(SegbufError::IndexOutOfBounds {
                index: values.len(),
                len,
            });
        }
        let bytes = manager.slot_bytes_mut(self.owner, offset, len)?;
        bytes.copy_from_slice(bytemuck::cast_slice(values));
        Ok(())
    }

    /// Set every element of `segment` to `value`.
    pub fn fill(
        &self,
        manager: &mut BufferManager,
        segment: Segment,
        value: T,
    ) -> Result<(), SegbufError> {
        let (offset, len) = manager.segment_range(segment)?;
        let bytes = manager.slot_bytes_mut(self.owner, offset, len)?;
        let one = bytemuck::bytes_of(&value);
        for chunk in bytes.chunks_exact_mut(one.len()) {
            chunk.copy_from_slice(one);
        }
        Ok(())
    }

    fn element_offset(
        &self,
        manager: &BufferManager,
        segment: Segment,
        index: usize,
    ) -> Result<usize, SegbufError> {
        let (offset, len) = manager.segment_range(segment)?;
        if index >= len {
            return Err(SegbufError::IndexOutOfBounds { index, len });
        }
        Ok(offset + index)
    }
}
