//! Per-segment relocation listeners.
//!
//! Listeners live in their own table rather than on the allocator records,
//! so the record list stays plain data and can be split, merged and
//! reordered freely.

use indexmap::IndexMap;

use crate::handle::{Relocation, Segment};

/// Callback invoked when a segment's data moves.
pub type RelocationListener = Box<dyn FnMut(&Relocation)>;

/// Maps live segments to their relocation listener.
#[derive(Default)]
pub struct RelocationTable {
    listeners: IndexMap<Segment, RelocationListener>,
}

impl RelocationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the listener for `segment`.
    ///
    /// Returns `true` if a previous listener was replaced.
    pub fn insert(&mut self, segment: Segment, listener: RelocationListener) -> bool {
        self.listeners.insert(segment, listener).is_some()
    }

    /// Drop the listener for `segment`, if any.
    pub fn remove(&mut self, segment: Segment) -> bool {
        self.listeners.swap_remove(&segment).is_some()
    }

    /// Invoke the listener registered for `relocation.segment`.
    pub fn notify(&mut self, relocation: &Relocation) {
        if let Some(listener) = self.listeners.get_mut(&relocation.segment) {
            listener(relocation);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn reloc(segment: Segment) -> Relocation {
        Relocation {
            segment,
            old_offset: 10,
            new_offset: 2,
            len: 4,
        }
    }

    #[test]
    fn notify_reaches_only_matching_segment() {
        let mut table = RelocationTable::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let a = Segment::new(0, 1);
        let b = Segment::new(1, 1);
        table.insert(a, Box::new(move |_| h.set(h.get() + 1)));

        table.notify(&reloc(b));
        assert_eq!(hits.get(), 0);
        table.notify(&reloc(a));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn stale_generation_does_not_match() {
        let mut table = RelocationTable::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        table.insert(Segment::new(0, 1), Box::new(move |_| h.set(h.get() + 1)));
        table.notify(&reloc(Segment::new(0, 2)));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn insert_replaces_and_remove_drops() {
        let mut table = RelocationTable::new();
        let s = Segment::new(4, 0);
        assert!(!table.insert(s, Box::new(|_| {})));
        assert!(table.insert(s, Box::new(|_| {})));
        assert_eq!(table.len(), 1);
        assert!(table.remove(s));
        assert!(!table.remove(s));
        assert!(table.is_empty());
    }
}
