//! Allocation Module
//!
//! Variable-length value slots for list and set maps.
//!
//! ## Responsibilities
//! - Carve slots from value buffers that grow by doubling
//! - Reuse released slots through a size-classed pool
//! - Persist the pool between sessions
//!
//! Lookup in the pool is O(log n) by size class rather than a general
//! best-fit search; fragmentation is accepted in exchange for O(1) release
//! and a bounded free list.

mod allocator;
mod pool;
mod slot;

pub use allocator::{AllocatorSettings, Cursor, SlotAllocator};
pub use pool::FreeSlotPool;
pub use slot::Slot;
