//! Dynamic List Map
//!
//! A variable-length array per key, stored in a value slot that is
//! reallocated with a growth factor of 2.
//!
//! ## Header Layout
//! ```text
//! [active][length][slot size][slot buffer][slot offset]
//! ```
//! The slot fields are meaningful only while the node is active and the
//! slot size is non-zero.

use std::collections::BTreeSet;

use crate::alloc::{Slot, SlotAllocator};
use crate::constants::{MAX_KEY, NULL};
use crate::error::{DenseError, Result};
use crate::index::{IndexKind, SecondaryIndex};
use crate::keystore::{KeyIter, KeyStore, NodeRef};
use crate::query::{key_range, value_range, KeySeq};
use crate::storage::MapDir;

use super::{KeyMap, KeyReserver, MapCore, MapKind, MapMeta, MapOptions, MapSettings, MapStats};

const LENGTH: usize = 1;
const SLOT_SIZE: usize = 2;
const SLOT_BUFFER: usize = 3;
const SLOT_OFFSET: usize = 4;

/// Words per list node, including the active word
pub(crate) const HEADER_WORDS: usize = 5;

/// Decoded list header
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub node: NodeRef,
    pub len: u64,
    pub slot: Option<Slot>,
}

pub(crate) fn read_header(keys: &KeyStore, node: NodeRef) -> Header {
    let len = keys.word(node, LENGTH).max(0) as u64;
    let size = keys.word(node, SLOT_SIZE).max(0) as u64;
    let slot = (size > 0).then(|| {
        Slot::new(
            keys.word(node, SLOT_BUFFER) as u32,
            keys.word(node, SLOT_OFFSET) as u64,
            size,
        )
    });
    Header { node, len, slot }
}

pub(crate) fn write_header(keys: &mut KeyStore, node: NodeRef, len: u64, slot: Option<Slot>) {
    let (size, buffer, offset) = match slot {
        Some(s) => (s.size as i64, i64::from(s.buffer), s.offset as i64),
        None => (0, 0, 0),
    };
    keys.set_word(node, LENGTH, len as i64);
    keys.set_word(node, SLOT_SIZE, size);
    keys.set_word(node, SLOT_BUFFER, buffer);
    keys.set_word(node, SLOT_OFFSET, offset);
}

/// Map storing a variable-length array of values per key
#[derive(Debug)]
pub struct ListMap {
    pub(crate) core: MapCore,
    pub(crate) alloc: SlotAllocator,
    minimum: u64,
    max_len: u64,
    index: Option<Box<SecondaryIndex>>,
}

impl ListMap {
    pub(crate) fn open(
        name: &str,
        meta: MapMeta,
        settings: &MapSettings,
        dir: Option<MapDir>,
    ) -> Result<Self> {
        let alloc = SlotAllocator::open(settings.alloc, dir.clone(), meta.cursor)?;
        let index = match meta.index {
            Some(kind) => Some(Box::new(SecondaryIndex::open(
                kind,
                name,
                settings,
                dir.as_ref().map(|d| d.child(SecondaryIndex::DIR)),
            )?)),
            None => None,
        };
        let core = MapCore::open(name, meta, HEADER_WORDS, settings, dir)?;
        Ok(Self {
            core,
            alloc,
            minimum: settings.list_minimum_slot.max(1),
            max_len: settings.alloc.max_words.max(1),
            index,
        })
    }

    /// Heap-backed map outside any database
    pub fn in_memory(name: &str, settings: &MapSettings) -> Result<Self> {
        let meta = MapMeta::new(&MapOptions::list(), settings.list_window_keys);
        Self::open(name, meta, settings, None)
    }

    pub fn core(&self) -> &MapCore {
        &self.core
    }

    pub fn allocator(&self) -> &SlotAllocator {
        &self.alloc
    }

    pub fn index_kind(&self) -> Option<IndexKind> {
        self.index.as_ref().map(|ix| ix.kind())
    }

    /// Store `value` at position `index`, returning the previous value
    ///
    /// Positions past the current length are filled with NULL placeholders.
    /// A list holds at most one value buffer of words.
    pub fn put(&mut self, key: i64, index: u64, value: i64) -> Result<i64> {
        let key_u = MapCore::check_key(key)?;
        MapCore::check_value(value)?;
        if index >= self.max_len {
            return Err(DenseError::IndexOutOfRange {
                index: usize::try_from(index).unwrap_or(usize::MAX),
                width: usize::try_from(self.max_len).unwrap_or(usize::MAX),
            });
        }

        let (node, _) = self.core.activate(key_u)?;
        let header = read_header(self.core.keys(), node);
        let new_len = header.len.max(index + 1);

        let (old, slot) = match header.slot {
            Some(slot) if index < slot.size => {
                let old = if index < header.len {
                    self.alloc.read(slot, index)
                } else {
                    self.alloc.fill(slot, header.len, index, NULL)?;
                    NULL
                };
                self.alloc.write(slot, index, value)?;
                (old, slot)
            }
            Some(old_slot) => {
                let grown = (new_len * 2).min(self.max_len).max(new_len);
                let slot = self.alloc.allocate(self.minimum.max(grown))?;
                self.alloc.copy(old_slot, slot, header.len)?;
                self.alloc.fill(slot, header.len, index, NULL)?;
                self.alloc.write(slot, index, value)?;
                self.alloc.release(old_slot);
                tracing::trace!(key, from = old_slot.size, to = slot.size, "reallocated list");
                (NULL, slot)
            }
            None => {
                let slot = self.alloc.allocate(self.minimum.max(index + 1))?;
                self.alloc.fill(slot, 0, index, NULL)?;
                self.alloc.write(slot, index, value)?;
                (NULL, slot)
            }
        };
        write_header(self.core.keys_mut(), node, new_len, Some(slot));

        if self.index.is_some() {
            let retained = old != NULL && self.stored_words(key_u).contains(&old);
            if let Some(ix) = self.index.as_mut() {
                ix.replace(key, old, value, retained)?;
            }
        }
        Ok(old)
    }

    /// Value at position `index`, NULL when absent
    pub fn get(&self, key: i64, index: u64) -> i64 {
        match self.header(key) {
            Some(Header {
                len,
                slot: Some(slot),
                ..
            }) if index < len => self.alloc.read(slot, index),
            _ => NULL,
        }
    }

    /// Append a value, returning the new length
    pub fn push(&mut self, key: i64, value: i64) -> Result<u64> {
        MapCore::check_member(value)?;
        let len = self.len(key);
        self.put(key, len, value)?;
        Ok(len + 1)
    }

    /// Remove and return the last value
    ///
    /// Trailing NULL placeholders are dropped along with it, so a list of
    /// placeholders only pops as None. The slot shrinks once it is at most a
    /// quarter full; an emptied list keeps its key but gives its slot back.
    pub fn pop(&mut self, key: i64) -> Result<Option<i64>> {
        let Some(header) = self.header(key) else {
            return Ok(None);
        };
        let Some(slot) = header.slot.filter(|_| header.len > 0) else {
            return Ok(None);
        };

        let last = (0..header.len)
            .rev()
            .map(|i| (i, self.alloc.read(slot, i)))
            .find(|&(_, value)| value != NULL);
        let (new_len, value) = match last {
            Some((i, value)) => (i, Some(value)),
            None => (0, None),
        };

        let slot = if new_len == 0 {
            self.alloc.release(slot);
            None
        } else if new_len * 4 <= slot.size && slot.size > self.minimum {
            let smaller = self.alloc.allocate(self.minimum.max(new_len * 2))?;
            self.alloc.copy(slot, smaller, new_len)?;
            self.alloc.release(slot);
            Some(smaller)
        } else {
            Some(slot)
        };
        write_header(self.core.keys_mut(), header.node, new_len, slot);

        if let Some(value) = value.filter(|_| self.index.is_some()) {
            let retained = self.raw_values(key).contains(&value);
            if let Some(ix) = self.index.as_mut() {
                ix.replace(key, value, NULL, retained)?;
            }
        }
        Ok(value)
    }

    /// Stored length, placeholders included
    pub fn len(&self, key: i64) -> u64 {
        self.header(key).map_or(0, |h| h.len)
    }

    pub fn is_empty(&self, key: i64) -> bool {
        self.len(key) == 0
    }

    /// Stored values in slot order, skipping NULL placeholders
    pub fn values(&self, key: i64) -> ListValues<'_> {
        match self.header(key) {
            Some(Header {
                len,
                slot: Some(slot),
                ..
            }) => ListValues {
                alloc: &self.alloc,
                slot: Some(slot),
                pos: 0,
                len,
            },
            _ => ListValues {
                alloc: &self.alloc,
                slot: None,
                pos: 0,
                len: 0,
            },
        }
    }

    /// Stored words including placeholders
    pub fn raw_values(&self, key: i64) -> Vec<i64> {
        u64::try_from(key)
            .ok()
            .map(|k| self.stored_words(k))
            .unwrap_or_default()
    }

    /// Replace the whole list of `key`
    pub fn set_values(&mut self, key: i64, values: &[i64]) -> Result<()> {
        let key_u = MapCore::check_key(key)?;
        for value in values {
            MapCore::check_value(*value)?;
        }

        let old = self.stored_words(key_u);
        let capacity = values.len() as u64 * 2;
        self.rewrite(key_u, values, capacity)?;

        if let Some(ix) = self.index.as_mut() {
            for value in old.into_iter().filter(|v| *v != NULL) {
                ix.index(key, value, NULL)?;
            }
            for value in values.iter().copied().filter(|v| *v != NULL) {
                ix.index(key, NULL, value)?;
            }
        }
        Ok(())
    }

    /// Append `values` under a freshly reserved key
    pub fn insert(&mut self, values: &[i64]) -> Result<i64> {
        let key = self.core.reserver().reserve();
        self.set_values(key, values)?;
        Ok(key)
    }

    /// Rebuild the secondary index from every stored value
    pub fn add_index(&mut self, kind: IndexKind) -> Result<()> {
        let root = self.core.dir().map(|d| d.child(SecondaryIndex::DIR));
        if let Some(mut old) = self.index.take() {
            old.clear()?;
        }
        let mut index = SecondaryIndex::create(kind, self.core.name(), self.core.settings(), root)?;

        let mut indexed = 0u64;
        for key in self.core.keys().keys(0, MAX_KEY as u64) {
            for value in self.stored_words(key).into_iter().filter(|v| *v != NULL) {
                index.index(key as i64, NULL, value)?;
                indexed += 1;
            }
        }

        self.index = Some(Box::new(index));
        self.core.meta_mut().index = Some(kind);
        self.core.save_meta()?;
        tracing::info!(map = self.core.name(), index = kind.name(), values = indexed, "rebuilt index");
        Ok(())
    }

    pub fn drop_index(&mut self) -> Result<()> {
        if let Some(mut index) = self.index.take() {
            index.destroy()?;
            self.core.meta_mut().index = None;
            self.core.save_meta()?;
            tracing::info!(map = self.core.name(), "dropped index");
        }
        Ok(())
    }

    // =========================================================================
    // Crate Internals (set maps)
    // =========================================================================

    pub(crate) fn stored_keys(&self, lo: u64, hi: u64) -> KeyIter<'_> {
        self.core.keys().keys(lo, hi)
    }

    /// Words of an active key's slot, in order
    pub(crate) fn stored_words(&self, key: u64) -> Vec<i64> {
        let Some(node) = self.core.keys().find_active(key) else {
            return Vec::new();
        };
        let header = read_header(self.core.keys(), node);
        header
            .slot
            .map(|slot| self.alloc.read_slot(slot, header.len))
            .unwrap_or_default()
    }

    /// Active key's slot and length
    pub(crate) fn stored_slot(&self, key: u64) -> Option<(Slot, u64)> {
        let node = self.core.keys().find_active(key)?;
        let header = read_header(self.core.keys(), node);
        header.slot.map(|slot| (slot, header.len))
    }

    /// Replace the words of `key` with a freshly allocated slot
    ///
    /// The old slot is released before the new one is taken, so a rewrite of
    /// similar size reuses it. An empty `words` leaves the key active with no
    /// slot.
    pub(crate) fn rewrite(&mut self, key: u64, words: &[i64], capacity: u64) -> Result<()> {
        let (node, _) = self.core.activate(key)?;
        let header = read_header(self.core.keys(), node);
        if let Some(old) = header.slot {
            self.alloc.release(old);
        }

        let slot = if words.is_empty() {
            None
        } else {
            let size = self.minimum.max(capacity).max(words.len() as u64);
            let slot = self.alloc.allocate(size)?;
            self.alloc.write_slot(slot, 0, words)?;
            Some(slot)
        };
        write_header(self.core.keys_mut(), node, words.len() as u64, slot);
        Ok(())
    }

    /// Release the slot of `key` and deactivate it
    pub(crate) fn discard(&mut self, key: u64) -> bool {
        let Some(node) = self.core.keys().find_active(key) else {
            return false;
        };
        let header = read_header(self.core.keys(), node);
        if let Some(slot) = header.slot {
            self.alloc.release(slot);
        }
        write_header(self.core.keys_mut(), node, 0, None);
        self.core.deactivate(node)
    }

    /// Record the allocator cursor in the metadata, then commit
    pub(crate) fn commit_storage(&mut self) -> Result<()> {
        self.core.meta_mut().cursor = Some(self.alloc.cursor());
        self.core.flush();
        self.alloc.sync()?;
        self.core.commit()
    }

    pub(crate) fn clear_storage(&mut self) -> Result<()> {
        self.alloc.clear()?;
        self.core.clear()
    }

    pub(crate) fn storage_stats(&self) -> MapStats {
        MapStats {
            value_buffers: self.alloc.buffer_count(),
            value_words: self.alloc.total_words(),
            free_slots: self.alloc.pool().len(),
            ..self.core.stats()
        }
    }

    fn header(&self, key: i64) -> Option<Header> {
        let key = u64::try_from(key).ok()?;
        let node = self.core.keys().find_active(key)?;
        Some(read_header(self.core.keys(), node))
    }
}

/// Keys whose list holds at least one value accepted by `keep`
fn scan<'a, F>(list: &'a ListMap, keep: F) -> KeySeq<'a>
where
    F: Fn(i64) -> bool + 'a,
{
    KeySeq::new(list.stored_keys(0, MAX_KEY as u64).filter_map(move |key| {
        list.stored_words(key)
            .into_iter()
            .any(|v| v != NULL && keep(v))
            .then_some(key as i64)
    }))
}

impl KeyMap for ListMap {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn kind(&self) -> MapKind {
        MapKind::List
    }

    fn contains_key(&mut self, key: i64) -> Result<bool> {
        Ok(self.header(key).is_some())
    }

    fn key_count(&mut self) -> Result<u64> {
        Ok(self.core.keys().key_count())
    }

    fn keys(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>> {
        let Some((lo, hi)) = key_range(lo, hi) else {
            return Ok(KeySeq::empty());
        };
        Ok(KeySeq::new(self.stored_keys(lo, hi).map(|k| k as i64)))
    }

    fn remove(&mut self, key: i64) -> Result<bool> {
        let Ok(key_u) = u64::try_from(key) else {
            return Ok(false);
        };
        let old = match self.index {
            Some(_) => self.stored_words(key_u),
            None => Vec::new(),
        };
        if !self.discard(key_u) {
            return Ok(false);
        }
        if let Some(ix) = self.index.as_mut() {
            for value in old.into_iter().filter(|v| *v != NULL) {
                ix.index(key, value, NULL)?;
            }
        }
        Ok(true)
    }

    fn query(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>> {
        let Some((lo, hi)) = value_range(lo, hi) else {
            return Ok(KeySeq::empty());
        };
        if self.index.is_none() {
            return Ok(scan(self, move |v| v >= lo && v <= hi));
        }
        match self.index.as_mut() {
            Some(ix) => ix.keys_for_range(lo, hi),
            None => Ok(KeySeq::empty()),
        }
    }

    fn union_query(&mut self, values: &[i64]) -> Result<KeySeq<'_>> {
        if self.index.is_none() {
            let wanted: BTreeSet<i64> = values.iter().copied().filter(|v| *v != NULL).collect();
            return Ok(scan(self, move |v| wanted.contains(&v)));
        }
        match self.index.as_mut() {
            Some(ix) => ix.keys_for_set(values),
            None => Ok(KeySeq::empty()),
        }
    }

    fn next_key(&self) -> i64 {
        self.core.next_key()
    }

    fn key_reserver(&self) -> KeyReserver {
        self.core.reserver()
    }

    fn flush(&mut self) -> Result<()> {
        self.core.flush();
        if let Some(ix) = self.index.as_mut() {
            ix.flush()?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.commit_storage()?;
        if let Some(ix) = self.index.as_mut() {
            ix.commit()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.clear_storage()?;
        if let Some(ix) = self.index.as_mut() {
            ix.clear()?;
        }
        tracing::info!(map = self.core.name(), "cleared map");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.commit()?;
        self.alloc.close()?;
        if let Some(ix) = self.index.as_mut() {
            ix.close()?;
        }
        Ok(())
    }

    fn stats(&self) -> MapStats {
        self.storage_stats()
    }
}

/// Lazy sequence of the values of one list
#[derive(Debug)]
pub struct ListValues<'a> {
    alloc: &'a SlotAllocator,
    slot: Option<Slot>,
    pos: u64,
    len: u64,
}

impl Iterator for ListValues<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let slot = self.slot?;
        while self.pos < self.len {
            let value = self.alloc.read(slot, self.pos);
            self.pos += 1;
            if value != NULL {
                return Some(value);
            }
        }
        None
    }
}
