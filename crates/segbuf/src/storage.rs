//! Growable contiguous physical storage.
//!
//! A [`PhysicalStore`] is a zero-initialised byte buffer divided into
//! fixed-width element slots. It knows nothing about segments; the buffer
//! manager tells it which ranges are live when growing, and which ranges to
//! move during defragmentation.

use log::{debug, warn};

use crate::error::SegbufError;

/// Byte storage for `capacity` slots of `element_size` bytes each.
pub struct PhysicalStore {
    /// Backing bytes, always `capacity * element_size` long.
    data: Vec<u8>,
    element_size: usize,
    capacity: usize,
    /// Makes every reservation fail, to exercise recovery paths.
    #[cfg(test)]
    pub(crate) fail_reservations: bool,
}

/// A zeroed buffer acquired ahead of a resize, not yet holding any data.
#[derive(Debug)]
pub struct ReservedStore {
    data: Vec<u8>,
    capacity: usize,
}

impl ReservedStore {
    /// Capacity in slots the store will have once installed.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl PhysicalStore {
    /// Reserve a zeroed store of `capacity` slots.
    pub fn new(element_size: usize, capacity: usize) -> Result<Self, SegbufError> {
        let data = Self::zeroed(element_size, capacity)?;
        Ok(Self {
            data,
            element_size,
            capacity,
            #[cfg(test)]
            fail_reservations: false,
        })
    }

    /// Acquire a zeroed buffer of `new_capacity` slots without touching the
    /// current one.
    /// Pair with [`install`](Self::install) to complete the resize.
    pub fn reserve(&self, new_capacity: usize) -> Result<ReservedStore, SegbufError> {
        #[cfg(test)]
        if self.fail_reservations {
            return Err(SegbufError::GrowthFailed {
                requested_slots: new_capacity,
            });
        }
        match Self::zeroed(self.element_size, new_capacity) {
            Ok(data) => Ok(ReservedStore {
                data,
                capacity: new_capacity,
            }),
            Err(e) => {
                warn!(
                    "reserving {new_capacity} slots (currently {}) failed: {e}",
                    self.capacity
                );
                Err(e)
            }
        }
    }

    /// Copy the live `(offset, len)` ranges into `reserved` and swap it in.
    ///
    /// Ranges are copied into the reserved buffer, so an error leaves this
    /// store unchanged.
    pub fn install<I>(&mut self, reserved: ReservedStore, live: I) -> Result<(), SegbufError>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let ReservedStore {
            data: mut next,
            capacity: new_capacity,
        } = reserved;
        for (offset, len) in live {
            let range = self.byte_range(offset, len)?;
            if range.end > next.len() {
                return Err(SegbufError::IndexOutOfBounds {
                    index: offset + len,
                    len: new_capacity,
                });
            }
            next[range.clone()].copy_from_slice(&self.data[range]);
        }
        debug!(
            "resize: {} -> {new_capacity} slots ({} bytes)",
            self.capacity,
            next.len()
        );
        self.data = next;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Move `len` slots from `from` to `to`. Ranges may overlap.
    pub fn move_slots(&mut self, from: usize, to: usize, len: usize) -> Result<(), SegbufError> {
        let src = self.byte_range(from, len)?;
        let dst = self.byte_range(to, len)?;
        self.data.copy_within(src, dst.start);
        Ok(())
    }

    /// Zero `len` slots starting at `offset`.
    pub fn zero(&mut self, offset: usize, len: usize) -> Result<(), SegbufError> {
        let range = self.byte_range(offset, len)?;
        self.data[range].fill(0);
        Ok(())
    }

    /// Bytes of `len` slots starting at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], SegbufError> {
        let range = self.byte_range(offset, len)?;
        Ok(&self.data[range])
    }

    /// Mutable bytes of `len` slots starting at `offset`.
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], SegbufError> {
        let range = self.byte_range(offset, len)?;
        Ok(&mut self.data[range])
    }

    /// Release the backing buffer. Capacity drops to zero.
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.capacity = 0;
    }

    /// Capacity in slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Memory usage of the backing buffer in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.data.capacity()
    }

    fn byte_range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>, SegbufError> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.capacity)
            .ok_or(SegbufError::IndexOutOfBounds {
                index: offset.saturating_add(len),
                len: self.capacity,
            })?;
        Ok(offset * self.element_size..end * self.element_size)
    }

    fn zeroed(element_size: usize, capacity: usize) -> Result<Vec<u8>, SegbufError> {
        let bytes = capacity
            .checked_mul(element_size)
            .ok_or(SegbufError::CapacityOverflow)?;
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| SegbufError::GrowthFailed {
                requested_slots: capacity,
            })?;
        data.resize(bytes, 0);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_is_zeroed() {
        let store = PhysicalStore::new(4, 8).unwrap();
        assert_eq!(store.capacity(), 8);
        assert!(store.bytes(0, 8).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn move_slots_copies_forward() {
        let mut store = PhysicalStore::new(2, 8).unwrap();
        store.bytes_mut(4, 2).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        store.move_slots(4, 1, 2).unwrap();
        assert_eq!(store.bytes(1, 2).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn overlapping_move_is_safe() {
        let mut store = PhysicalStore::new(1, 6).unwrap();
        store.bytes_mut(2, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        store.move_slots(2, 0, 4).unwrap();
        assert_eq!(store.bytes(0, 4).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn install_keeps_only_live_ranges() {
        let mut store = PhysicalStore::new(1, 4).unwrap();
        store.bytes_mut(0, 4).unwrap().copy_from_slice(&[9, 8, 7, 6]);
        let reserved = store.reserve(8).unwrap();
        store.install(reserved, [(1, 2)]).unwrap();
        assert_eq!(store.capacity(), 8);
        assert_eq!(store.bytes(0, 8).unwrap(), &[0, 8, 7, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn out_of_range_access_is_error() {
        let store = PhysicalStore::new(4, 4).unwrap();
        assert!(matches!(
            store.bytes(3, 2),
            Err(SegbufError::IndexOutOfBounds { .. })
        ));
        assert!(store.bytes(usize::MAX, 2).is_err());
    }

    #[test]
    fn failed_reservation_leaves_store_untouched() {
        let mut store = PhysicalStore::new(4, 4).unwrap();
        store.bytes_mut(0, 1).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        let err = store.reserve(usize::MAX / 4).unwrap_err();
        assert!(matches!(err, SegbufError::GrowthFailed { .. }));
        assert_eq!(store.capacity(), 4);
        assert_eq!(store.bytes(0, 1).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn reservation_does_not_touch_store() {
        let mut store = PhysicalStore::new(2, 4).unwrap();
        store.bytes_mut(1, 1).unwrap().copy_from_slice(&[7, 7]);
        let reserved = store.reserve(6).unwrap();
        assert_eq!(reserved.capacity(), 6);
        assert_eq!(store.capacity(), 4);

        store.install(reserved, [(1, 1)]).unwrap();
        assert_eq!(store.capacity(), 6);
        assert_eq!(store.bytes(0, 3).unwrap(), &[0, 0, 7, 7, 0, 0]);
    }

    #[test]
    fn install_rejects_range_past_new_capacity() {
        let mut store = PhysicalStore::new(1, 8).unwrap();
        let reserved = store.reserve(4).unwrap();
        assert!(matches!(
            store.install(reserved, [(2, 4)]),
            Err(SegbufError::IndexOutOfBounds { .. })
        ));
        assert_eq!(store.capacity(), 8);
    }

    #[test]
    fn release_drops_capacity() {
        let mut store = PhysicalStore::new(4, 16).unwrap();
        store.release();
        assert_eq!(store.capacity(), 0);
        assert_eq!(store.memory_bytes(), 0);
    }
}
