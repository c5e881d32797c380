//! Slot handle

use serde::{Deserialize, Serialize};

/// A run of `size` words at `offset` inside value buffer `buffer`
///
/// Slots are plain values; the allocator owns the memory they describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub buffer: u32,
    pub offset: u64,
    pub size: u64,
}

impl Slot {
    pub fn new(buffer: u32, offset: u64, size: u64) -> Self {
        Self {
            buffer,
            offset,
            size,
        }
    }

    /// Word index of position `i` inside the owning buffer
    #[inline]
    pub fn word(&self, i: u64) -> usize {
        (self.offset + i) as usize
    }
}
