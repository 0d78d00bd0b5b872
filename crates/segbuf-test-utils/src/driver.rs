//! Seeded random operation driver.
//!
//! [`OpDriver`] plays the role of a consumer: it allocates segments, fills
//! each with a recognisable pattern, keeps a shadow copy of every segment's
//! offset that is only updated from relocation callbacks, and frees or
//! compacts at random. [`OpDriver::verify`] checks that the shadow offsets
//! and the stored patterns still match the manager.

use std::cell::Cell;
use std::rc::Rc;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use segbuf::{BufferManager, Segment, SegbufError, View};

/// One operation performed by [`OpDriver::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Allocate { segment: Segment, len: usize },
    Free { segment: Segment },
    Defragment { moves: usize },
}

struct Tracked {
    segment: Segment,
    len: usize,
    tag: u32,
    /// Offset as seen by the consumer, updated only by the listener.
    shadow: Rc<Cell<usize>>,
}

/// Random consumer of a `u32`-slot [`BufferManager`].
pub struct OpDriver {
    rng: ChaCha8Rng,
    max_len: usize,
    view: View<u32>,
    live: Vec<Tracked>,
    next_tag: u32,
}

impl OpDriver {
    /// Create a driver for `mgr`, which must use 4-byte slots.
    ///
    /// Allocation lengths are drawn uniformly from `1..=max_len`.
    pub fn new(mgr: &BufferManager, seed: u64, max_len: usize) -> Result<Self, SegbufError> {
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            max_len: max_len.max(1),
            view: mgr.create_view::<u32>()?,
            live: Vec::new(),
            next_tag: 1,
        })
    }

    /// Perform one random operation.
    pub fn step(&mut self, mgr: &mut BufferManager) -> Result<Op, SegbufError> {
        // 45% allocate, 45% free, 10% defragment.
        let roll = self.rng.next_u32() % 20;
        if roll >= 18 {
            let moves = mgr.defragment()?;
            return Ok(Op::Defragment { moves });
        }
        if roll >= 9 && !self.live.is_empty() {
            let pick = self.rng.next_u32() as usize % self.live.len();
            let tracked = self.live.swap_remove(pick);
            mgr.free(tracked.segment)?;
            return Ok(Op::Free {
                segment: tracked.segment,
            });
        }
        let len = 1 + self.rng.next_u32() as usize % self.max_len;
        let segment = self.allocate(mgr, len)?;
        Ok(Op::Allocate { segment, len })
    }

    /// Allocate a tracked segment of `len` slots and fill its pattern.
    pub fn allocate(&mut self, mgr: &mut BufferManager, len: usize) -> Result<Segment, SegbufError> {
        let segment = mgr.allocate(len)?;
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);

        let shadow = Rc::new(Cell::new(mgr.offset(segment)?));
        let s = Rc::clone(&shadow);
        mgr.set_on_relocate(segment, move |r| {
            debug_assert_eq!(s.get(), r.old_offset);
            s.set(r.new_offset)
        })?;

        let pattern: Vec<u32> = (0..len as u32).map(|i| pattern_word(tag, i)).collect();
        self.view.write(mgr, segment, &pattern)?;
        self.live.push(Tracked {
            segment,
            len,
            tag,
            shadow,
        });
        Ok(segment)
    }

    /// Check shadow offsets, lengths and stored patterns of every live
    /// segment against the manager.
    pub fn verify(&self, mgr: &BufferManager) -> Result<(), String> {
        for t in &self.live {
            let offset = mgr.offset(t.segment).map_err(|e| e.to_string())?;
            if offset != t.shadow.get() {
                return Err(format!(
                    "{} at {offset}, consumer believes {}",
                    t.segment,
                    t.shadow.get()
                ));
            }
            let len = mgr.len(t.segment).map_err(|e| e.to_string())?;
            if len != t.len {
                return Err(format!("{} length {len}, expected {}", t.segment, t.len));
            }
            let data = self.view.read(mgr, t.segment).map_err(|e| e.to_string())?;
            for (i, &word) in data.iter().enumerate() {
                if word != pattern_word(t.tag, i as u32) {
                    return Err(format!("{} corrupted at element {i}", t.segment));
                }
            }
        }
        Ok(())
    }

    /// Free every tracked segment.
    pub fn free_all(&mut self, mgr: &mut BufferManager) -> Result<(), SegbufError> {
        for t in self.live.drain(..) {
            mgr.free(t.segment)?;
        }
        Ok(())
    }

    /// Number of live tracked segments.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Total slots held by tracked segments.
    pub fn live_len(&self) -> usize {
        self.live.iter().map(|t| t.len).sum()
    }
}

fn pattern_word(tag: u32, index: u32) -> u32 {
    tag.wrapping_mul(0x9E37_79B9) ^ index
}
