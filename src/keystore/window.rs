//! Key Window
//!
//! One contiguous span of the key space backed by a single word buffer.
//!
//! ```text
//! ┌──────────┬─────────────────┬─────────────────┬─────┐
//! │ count(1) │ node 0          │ node 1          │ ... │
//! │          │ [active][words] │ [active][words] │     │
//! └──────────┴─────────────────┴─────────────────┴─────┘
//! ```

use std::cell::Cell;
use std::path::Path;

use crate::error::Result;
use crate::storage::WordBuffer;

/// A window of `span` nodes plus its active-key counter
#[derive(Debug)]
pub struct KeyWindow {
    id: u64,
    buffer: WordBuffer,
    /// Cached copy of word 0, read on first use
    active: Cell<Option<u64>>,
    /// Counter changed since the last sync
    dirty: bool,
}

impl KeyWindow {
    /// Word holding the active-key count
    pub const COUNT_WORD: usize = 0;

    pub fn new(id: u64, buffer: WordBuffer) -> Self {
        Self {
            id,
            buffer,
            active: Cell::new(None),
            dirty: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn words(&self) -> usize {
        self.buffer.len()
    }

    pub fn path(&self) -> Option<&Path> {
        self.buffer.path()
    }

    /// Number of active nodes in this window
    pub fn active_count(&self) -> u64 {
        match self.active.get() {
            Some(count) => count,
            None => {
                let count = u64::try_from(self.buffer.get(Self::COUNT_WORD)).unwrap_or(0);
                self.active.set(Some(count));
                count
            }
        }
    }

    #[inline]
    pub fn word(&self, index: usize) -> i64 {
        self.buffer.get(index)
    }

    #[inline]
    pub fn set_word(&mut self, index: usize, value: i64) {
        self.buffer.set(index, value);
    }

    /// Whether the node starting at `base` is active
    #[inline]
    pub fn is_active(&self, base: usize) -> bool {
        self.buffer.get(base) != 0
    }

    /// Toggle the active bit of a node; false when nothing changed
    pub fn set_active(&mut self, base: usize, active: bool) -> bool {
        if self.is_active(base) == active {
            return false;
        }

        let count = self.active_count();
        self.buffer.set(base, i64::from(active));
        self.active.set(Some(if active {
            count + 1
        } else {
            count.saturating_sub(1)
        }));
        self.dirty = true;
        true
    }

    /// Write the cached counter back into word 0
    pub fn write_count(&mut self) {
        if self.dirty {
            let count = self.active_count();
            self.buffer.set(Self::COUNT_WORD, count as i64);
            self.dirty = false;
        }
    }

    /// Write the counter back and flush the mapping
    pub fn sync(&mut self) -> Result<()> {
        self.write_count();
        self.buffer.flush()
    }
}
