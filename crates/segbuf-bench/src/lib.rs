//! Benchmark profiles for the segbuf allocator.
//!
//! - [`bone_profile`]: 64-byte slots (one 4x4 `f32` matrix), sized for a
//!   few hundred skeletons of 64 bones each.
//! - [`fragmented_manager`]: a manager with every other segment freed, so
//!   the next oversized request has to compact.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use segbuf::{BufferConfig, BufferManager, Segment};

/// Bones per simulated skeleton.
pub const BONES_PER_SKELETON: usize = 64;

/// Config for 4x4 `f32` transform slots, 256 skeletons up front.
pub fn bone_profile() -> BufferConfig {
    BufferConfig::for_element::<[f32; 16]>().with_initial_capacity(256 * BONES_PER_SKELETON)
}

/// Build a `u32`-slot manager holding `count` segments of `len` slots,
/// with every other segment freed. Returns the manager and the survivors.
pub fn fragmented_manager(count: usize, len: usize) -> (BufferManager, Vec<Segment>) {
    let config = BufferConfig::default().with_initial_capacity(count * len);
    let mut mgr = BufferManager::new(config).expect("bench config is valid");
    let segs: Vec<Segment> = (0..count)
        .map(|_| mgr.allocate(len).expect("fits initial capacity"))
        .collect();
    let mut survivors = Vec::with_capacity(count / 2);
    for (i, seg) in segs.into_iter().enumerate() {
        if i % 2 == 0 {
            mgr.free(seg).expect("segment is live");
        } else {
            survivors.push(seg);
        }
    }
    (mgr, survivors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragmented_manager_has_alternating_holes() {
        let (mgr, survivors) = fragmented_manager(10, 4);
        assert_eq!(survivors.len(), 5);
        let stats = mgr.stats().unwrap();
        assert_eq!(stats.free_records, 5);
        assert_eq!(stats.in_use, 20);
    }

    #[test]
    fn bone_profile_is_valid() {
        let config = bone_profile();
        assert_eq!(config.element_size, 64);
        assert!(config.validate().is_ok());
    }
}
