//! Slot Allocator
//!
//! Carves slots out of growable value buffers and reuses released ones.

use std::collections::BTreeMap;
use std::fs;

use crate::constants::NULL;
use crate::error::{DenseError, Result};
use crate::storage::{MapDir, WordBuffer};

use super::{FreeSlotPool, Slot};

/// Sizing knobs of an allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorSettings {
    /// Size of buffer 1 (in words)
    pub initial_words: u64,
    /// Cap on the doubling growth (in words)
    pub max_words: u64,
    /// Slots kept by the free-slot pool
    pub free_slot_capacity: usize,
}

/// Append position: next free word of the newest buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub buffer: u32,
    pub offset: u64,
}

/// Arena of value buffers owned by one map
///
/// Buffer `n` (1-based) holds `initial × 2^(n-1)` words, capped at
/// `max_words`, so the buffer count stays logarithmic in the data size.
#[derive(Debug)]
pub struct SlotAllocator {
    buffers: BTreeMap<u32, WordBuffer>,
    cursor: Cursor,
    settings: AllocatorSettings,
    pool: FreeSlotPool,
    dir: Option<MapDir>,
}

impl SlotAllocator {
    pub fn in_memory(settings: AllocatorSettings) -> Self {
        Self {
            buffers: BTreeMap::new(),
            cursor: Cursor::default(),
            settings,
            pool: FreeSlotPool::new(settings.free_slot_capacity),
            dir: None,
        }
    }

    /// Open the buffers of a map directory
    ///
    /// `cursor` is the append position saved at the last commit. Without it
    /// the newest buffer is treated as full.
    pub fn open(
        settings: AllocatorSettings,
        dir: Option<MapDir>,
        cursor: Option<Cursor>,
    ) -> Result<Self> {
        let mut alloc = Self::in_memory(settings);
        let Some(dir) = dir else {
            return Ok(alloc);
        };

        for id in dir.buffer_ids()? {
            let buffer = WordBuffer::open(&dir.buffer_path(id))?;
            alloc.buffers.insert(id, buffer);
        }

        alloc.cursor = match (cursor, alloc.buffers.iter().next_back()) {
            (Some(saved), Some((&last, _))) if saved.buffer == last => saved,
            (_, Some((&last, buffer))) => Cursor {
                buffer: last,
                offset: buffer.len() as u64,
            },
            (_, None) => Cursor::default(),
        };
        alloc.pool = FreeSlotPool::load(&dir.released_path(), settings.free_slot_capacity);
        alloc.dir = Some(dir);
        Ok(alloc)
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn pool(&self) -> &FreeSlotPool {
        &self.pool
    }

    /// Total words across all value buffers
    pub fn total_words(&self) -> u64 {
        self.buffers.values().map(|b| b.len() as u64).sum()
    }

    /// Size of buffer `index` under the doubling schedule
    pub fn growth_words(&self, index: u32) -> u64 {
        let shift = index.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        self.settings
            .initial_words
            .saturating_mul(factor)
            .min(self.settings.max_words)
    }

    /// Hand out a slot of at least `min_size` words
    ///
    /// Order of preference: smallest released slot that fits, the tail of
    /// the newest buffer, a fresh buffer.
    pub fn allocate(&mut self, min_size: u64) -> Result<Slot> {
        let min_size = min_size.max(1);

        if let Some(slot) = self.pool.take(min_size) {
            return Ok(slot);
        }

        if let Some(buffer) = self.buffers.get(&self.cursor.buffer) {
            let free = (buffer.len() as u64).saturating_sub(self.cursor.offset);
            if free >= min_size {
                let slot = Slot::new(self.cursor.buffer, self.cursor.offset, min_size);
                self.cursor.offset += min_size;
                return Ok(slot);
            }
        }

        let id = self.buffers.keys().next_back().map_or(1, |last| last + 1);
        let words = self.growth_words(id).max(min_size);
        let buffer = match &self.dir {
            Some(dir) => WordBuffer::create(&dir.buffer_path(id), words as usize)?,
            None => WordBuffer::heap(words as usize),
        };
        tracing::debug!(buffer = id, words, "created value buffer");

        self.buffers.insert(id, buffer);
        self.cursor = Cursor {
            buffer: id,
            offset: min_size,
        };
        Ok(Slot::new(id, 0, min_size))
    }

    /// Give a slot back to the pool
    pub fn release(&mut self, slot: Slot) {
        self.pool.release(slot);
    }

    /// Word `i` of a slot (NULL if the buffer is gone)
    pub fn read(&self, slot: Slot, i: u64) -> i64 {
        debug_assert!(i < slot.size);
        self.buffers
            .get(&slot.buffer)
            .map_or(NULL, |b| b.get(slot.word(i)))
    }

    /// First `len` words of a slot
    pub fn read_slot(&self, slot: Slot, len: u64) -> Vec<i64> {
        let len = len.min(slot.size) as usize;
        self.buffers
            .get(&slot.buffer)
            .map_or_else(Vec::new, |b| b.read_range(slot.word(0), len))
    }

    pub fn write(&mut self, slot: Slot, i: u64, value: i64) -> Result<()> {
        debug_assert!(i < slot.size);
        self.buffer_mut(slot)?.set(slot.word(i), value);
        Ok(())
    }

    /// Write `values` starting at word `start` of a slot
    pub fn write_slot(&mut self, slot: Slot, start: u64, values: &[i64]) -> Result<()> {
        debug_assert!(start + values.len() as u64 <= slot.size);
        self.buffer_mut(slot)?.write_range(slot.word(start), values);
        Ok(())
    }

    /// Set words `from..to` of a slot to `value`
    pub fn fill(&mut self, slot: Slot, from: u64, to: u64, value: i64) -> Result<()> {
        if from >= to {
            return Ok(());
        }
        self.buffer_mut(slot)?
            .fill(slot.word(from)..slot.word(to), value);
        Ok(())
    }

    /// Copy the first `len` words of `from` into `to`
    pub fn copy(&mut self, from: Slot, to: Slot, len: u64) -> Result<()> {
        let len = len.min(from.size).min(to.size);
        if from.buffer == to.buffer {
            let start = from.word(0);
            self.buffer_mut(to)?
                .copy_within(start..start + len as usize, to.word(0));
        } else {
            let words = self.read_slot(from, len);
            self.write_slot(to, 0, &words)?;
        }
        Ok(())
    }

    /// Flush mapped buffers
    pub fn sync(&mut self) -> Result<()> {
        for buffer in self.buffers.values() {
            buffer.flush()?;
        }
        Ok(())
    }

    /// Flush and persist the free-slot pool
    pub fn close(&mut self) -> Result<()> {
        self.sync()?;
        if let Some(dir) = &self.dir {
            self.pool.save(&dir.released_path())?;
        }
        Ok(())
    }

    /// Drop every buffer (and its file) and forget released slots
    pub fn clear(&mut self) -> Result<()> {
        let buffers = std::mem::take(&mut self.buffers);
        for buffer in buffers.into_values() {
            let path = buffer.path().map(|p| p.to_path_buf());
            drop(buffer);
            if let Some(path) = path {
                fs::remove_file(path)?;
            }
        }
        self.cursor = Cursor::default();
        self.pool.clear();
        if let Some(dir) = &self.dir {
            let released = dir.released_path();
            if released.exists() {
                fs::remove_file(released)?;
            }
        }
        Ok(())
    }

    fn buffer_mut(&mut self, slot: Slot) -> Result<&mut WordBuffer> {
        self.buffers.get_mut(&slot.buffer).ok_or_else(|| {
            DenseError::Corruption(format!("slot refers to missing value buffer {}", slot.buffer))
        })
    }
}
