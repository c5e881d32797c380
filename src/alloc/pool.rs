//! Free-Slot Pool
//!
//! Size-classed cache of released slots.
//!
//! ## Snapshot Format
//! ```text
//! ┌───────────┬──────────┬──────────┬────────────────────────┐
//! │ Magic (4) │ CRC (4)  │ Len (8)  │ bincode(Vec<Slot>)     │
//! └───────────┴──────────┴──────────┴────────────────────────┘
//! ```
//! Written on close, read back (and deleted) on the next open. Losing it
//! only means released space is not reused.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{DenseError, Result};

use super::Slot;

/// Magic bytes identifying a released-slot snapshot
const MAGIC: &[u8; 4] = b"DKFS";

/// Magic (4) + CRC (4) + payload length (8)
const HEADER_SIZE: usize = 16;

/// Released slots grouped by exact size
#[derive(Debug, Clone)]
pub struct FreeSlotPool {
    buckets: BTreeMap<u64, Vec<Slot>>,
    len: usize,
    capacity: usize,
}

impl FreeSlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            buckets: BTreeMap::new(),
            len: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots cached for an exact size
    pub fn count_of(&self, size: u64) -> usize {
        self.buckets.get(&size).map_or(0, Vec::len)
    }

    /// Take a slot from the smallest size class that fits `min_size`
    pub fn take(&mut self, min_size: u64) -> Option<Slot> {
        let (&size, bucket) = self.buckets.range_mut(min_size..).next()?;
        let slot = bucket.pop();
        if bucket.is_empty() {
            self.buckets.remove(&size);
        }
        if slot.is_some() {
            self.len -= 1;
        }
        slot
    }

    /// Cache a released slot; false when it was dropped instead
    ///
    /// Slots under two words are never cached. A full pool evicts its whole
    /// smallest size class, unless the incoming slot belongs to that class.
    pub fn release(&mut self, slot: Slot) -> bool {
        if slot.size < 2 || self.capacity == 0 {
            return false;
        }

        if self.len >= self.capacity {
            let Some(&smallest) = self.buckets.keys().next() else {
                return false;
            };
            if smallest == slot.size {
                return false;
            }
            if let Some(evicted) = self.buckets.remove(&smallest) {
                tracing::debug!(size = smallest, slots = evicted.len(), "evicted free-slot class");
                self.len -= evicted.len();
            }
        }

        self.buckets.entry(slot.size).or_default().push(slot);
        self.len += 1;
        true
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }

    /// Every cached slot, smallest class first
    pub fn slots(&self) -> impl Iterator<Item = &Slot> + '_ {
        self.buckets.values().flatten()
    }

    /// Write the snapshot blob
    pub fn save(&self, path: &Path) -> Result<()> {
        let slots: Vec<Slot> = self.slots().copied().collect();
        let payload = bincode::serialize(&slots)?;

        let mut blob = Vec::with_capacity(HEADER_SIZE + payload.len());
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        blob.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        blob.extend_from_slice(&payload);

        fs::write(path, blob)?;
        tracing::debug!(path = %path.display(), slots = slots.len(), "saved free-slot pool");
        Ok(())
    }

    /// Reload a snapshot, deleting it afterwards
    ///
    /// A missing or unreadable snapshot yields an empty pool.
    pub fn load(path: &Path, capacity: usize) -> Self {
        let mut pool = Self::new(capacity);
        if !path.exists() {
            return pool;
        }

        match Self::read_snapshot(path) {
            Ok(slots) => {
                for slot in slots {
                    pool.release(slot);
                }
                if let Err(e) = fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %e, "could not delete free-slot snapshot");
                }
                tracing::debug!(path = %path.display(), slots = pool.len(), "reloaded free-slot pool");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable free-slot snapshot");
            }
        }
        pool
    }

    fn read_snapshot(path: &Path) -> Result<Vec<Slot>> {
        let blob = fs::read(path)?;
        if blob.len() < HEADER_SIZE || &blob[0..4] != MAGIC {
            return Err(DenseError::Corruption("bad free-slot snapshot header".to_string()));
        }

        let mut crc = [0u8; 4];
        crc.copy_from_slice(&blob[4..8]);
        let mut len = [0u8; 8];
        len.copy_from_slice(&blob[8..16]);

        let payload = &blob[HEADER_SIZE..];
        if u64::from_le_bytes(len) != payload.len() as u64 {
            return Err(DenseError::Corruption("truncated free-slot snapshot".to_string()));
        }
        if crc32fast::hash(payload) != u32::from_le_bytes(crc) {
            return Err(DenseError::Corruption("free-slot snapshot checksum mismatch".to_string()));
        }

        Ok(bincode::deserialize(payload)?)
    }
}
