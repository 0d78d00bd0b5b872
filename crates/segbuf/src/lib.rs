//! Growable segmented buffer allocation with online defragmentation.
//!
//! Backs dense per-element data with one contiguous store whose final size
//! is unknown up front, and which compacts itself instead of growing without
//! bound.
//!
//! # Architecture
//!
//! ```text
//! BufferManager (orchestrator, Active → Disposed)
//! ├── SegmentAllocator (offset-ordered free/in-use records)
//! │   ├── slot table → generational Segment handles
//! │   └── RelocationTable (Segment → listener)
//! ├── PhysicalStore (Vec<u8>, capacity × element_size, resized atomically)
//! ├── in-use mask (one bool per slot)
//! └── View<T> tokens (resolve through the manager on every access)
//! ```
//!
//! # Allocation path
//!
//! 1. First-fit into a free record, or bump at the high-water mark, if that
//!    stays within physical capacity.
//! 2. Otherwise compact: every live segment slides toward slot 0, each move
//!    is replayed on the store and reported to the segment's listener.
//! 3. Otherwise grow the store per [`GrowthPolicy`] and bump-allocate.
//!
//! # Safety
//!
//! No `unsafe`. Element punning between views goes through
//! [`bytemuck::Pod`], which makes any bit pattern a valid element.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod handle;
pub mod listener;
pub mod manager;
pub mod storage;
pub mod view;

// Public re-exports for the primary API surface.
pub use allocator::SegmentAllocator;
pub use config::{BufferConfig, GrowthPolicy};
pub use error::{ErrorKind, SegbufError};
pub use handle::{ManagerId, RecordInfo, Relocation, Segment};
pub use listener::RelocationListener;
pub use manager::{BufferManager, BufferStats};
pub use view::View;
