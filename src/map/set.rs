//! Batched Set Map
//!
//! Sorted `(value, attribute)` pairs per key, stored in a list slot and
//! updated through a write-back delta cache.
//!
//! ## Merge
//! The stored pairs and a key's sorted deltas are walked together. On a
//! value collision the delta wins; members whose resolved attribute is
//! absent are dropped. The result goes into a fresh slot sized for the old
//! pairs plus the deltas, and the old slot is released. Reads merge the
//! key they touch first.

use std::collections::BTreeSet;

use crate::alloc::{Slot, SlotAllocator};
use crate::constants::{MAX_KEY, NULL};
use crate::error::{DenseError, Result};
use crate::keystore::KeyIter;
use crate::query::{key_range, value_range, KeySeq};
use crate::storage::MapDir;

use super::{
    Delta, DeltaOp, KeyMap, KeyReserver, ListMap, MapCore, MapKind, MapMeta, MapOptions,
    MapSettings, MapStats, SetCache, SetKind,
};

/// Map storing a sorted set (or multiset) of values per key
#[derive(Debug)]
pub struct SetMap {
    list: ListMap,
    set_kind: SetKind,
    cache: SetCache,
}

impl SetMap {
    pub(crate) fn open(
        name: &str,
        meta: MapMeta,
        settings: &MapSettings,
        dir: Option<MapDir>,
    ) -> Result<Self> {
        let set_kind = meta.set_kind;
        let list = ListMap::open(name, meta, settings, dir)?;
        let cache = SetCache::new(
            settings.set_cache_capacity,
            settings.set_cache_depth,
            settings.set_cache_chain,
        );
        Ok(Self {
            list,
            set_kind,
            cache,
        })
    }

    /// Heap-backed map outside any database
    pub fn in_memory(name: &str, set_kind: SetKind, settings: &MapSettings) -> Result<Self> {
        let meta = MapMeta::new(&MapOptions::set(set_kind), settings.set_window_keys);
        Self::open(name, meta, settings, None)
    }

    pub fn core(&self) -> &MapCore {
        self.list.core()
    }

    pub fn set_kind(&self) -> SetKind {
        self.set_kind
    }

    /// Write a member with an attribute interpreted by the set kind
    ///
    /// A NULL attribute deletes the member. Plain sets ignore the attribute,
    /// multisets add it to the count, attributed sets replace the tag.
    pub fn put(&mut self, key: i64, value: i64, attribute: i64) -> Result<()> {
        let op = match (self.set_kind, attribute) {
            (_, NULL) => DeltaOp::Delete,
            (SetKind::Plain, _) => DeltaOp::Assign(1),
            (SetKind::Multi, delta) => DeltaOp::add(delta),
            (SetKind::Attributed, tag) => {
                MapCore::check_value(tag)?;
                DeltaOp::Assign(tag)
            }
        };
        self.record(key, value, op)
    }

    /// Add a member (one more occurrence for multisets)
    pub fn add(&mut self, key: i64, value: i64) -> Result<()> {
        self.put(key, value, 1)
    }

    /// Add a member carrying `attribute`
    pub fn add_with(&mut self, key: i64, value: i64, attribute: i64) -> Result<()> {
        self.put(key, value, attribute)
    }

    /// Change the occurrence count of a multiset member by `delta`
    pub fn add_count(&mut self, key: i64, value: i64, delta: i64) -> Result<()> {
        if self.set_kind != SetKind::Multi {
            return Err(DenseError::Unsupported(format!(
                "counted insert into {} set '{}'",
                self.set_kind.name(),
                self.core().name()
            )));
        }
        self.put(key, value, delta)
    }

    pub fn remove_value(&mut self, key: i64, value: i64) -> Result<()> {
        self.record(key, value, DeltaOp::Delete)
    }

    pub fn contains(&mut self, key: i64, value: i64) -> Result<bool> {
        Ok(self.attribute(key, value)?.is_some())
    }

    /// Attribute of a member, None when absent
    pub fn attribute(&mut self, key: i64, value: i64) -> Result<Option<i64>> {
        let Ok(key) = u64::try_from(key) else {
            return Ok(None);
        };
        self.merge(key)?;
        let Some((slot, len)) = self.list.stored_slot(key) else {
            return Ok(None);
        };

        let alloc = &self.list.alloc;
        let (mut lo, mut hi) = (0, len / 2);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let probe = alloc.read(slot, mid * 2);
            match probe.cmp(&value) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Some(alloc.read(slot, mid * 2 + 1))),
            }
        }
        Ok(None)
    }

    /// Members and attributes of `key`, ascending by value
    pub fn entries(&mut self, key: i64) -> Result<SetEntries<'_>> {
        let Ok(key) = u64::try_from(key) else {
            return Ok(SetEntries::empty(&self.list.alloc));
        };
        self.merge(key)?;
        Ok(self.stored_entries(key))
    }

    /// Members of `key`, ascending
    pub fn values(&mut self, key: i64) -> Result<impl Iterator<Item = i64> + '_> {
        Ok(self.entries(key)?.map(|(value, _)| value))
    }

    /// Number of members of `key`
    pub fn len(&mut self, key: i64) -> Result<u64> {
        let Ok(key_u) = u64::try_from(key) else {
            return Ok(0);
        };
        self.merge(key_u)?;
        Ok(self.list.len(key) / 2)
    }

    pub fn is_empty(&mut self, key: i64) -> Result<bool> {
        Ok(self.len(key)? == 0)
    }

    /// Merge the pending deltas of one key; false when there were none
    pub fn merge(&mut self, key: u64) -> Result<bool> {
        match self.cache.take(key) {
            Some(deltas) => {
                self.apply(key, &deltas)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Merge every pending key, returning how many were merged
    pub fn merge_all(&mut self) -> Result<usize> {
        let spills = self.cache.drain();
        let merged = spills.len();
        for (key, deltas) in spills {
            self.apply(key, &deltas)?;
        }
        if merged > 0 {
            tracing::debug!(map = self.core().name(), keys = merged, "merged set cache");
        }
        Ok(merged)
    }

    /// Keys with deltas not yet merged
    pub fn pending_keys(&self) -> usize {
        self.cache.len()
    }

    /// Unmerged deltas of `key`
    pub fn pending(&self, key: u64) -> Option<&[Delta]> {
        self.cache.pending(key)
    }

    // =========================================================================
    // Crate Internals (index partitions)
    // =========================================================================

    pub(crate) fn stored_keys(&self, lo: u64, hi: u64) -> KeyIter<'_> {
        self.list.stored_keys(lo, hi)
    }

    /// Persisted pairs of `key`, ignoring the cache
    pub(crate) fn stored_entries(&self, key: u64) -> SetEntries<'_> {
        match self.list.stored_slot(key) {
            Some((slot, len)) => SetEntries {
                alloc: &self.list.alloc,
                slot: Some(slot),
                pos: 0,
                len,
            },
            None => SetEntries::empty(&self.list.alloc),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn record(&mut self, key: i64, value: i64, op: DeltaOp) -> Result<()> {
        let key = MapCore::check_key(key)?;
        MapCore::check_member(value)?;

        self.list.core.observe(key);
        let spills = self.cache.record(key, Delta::new(value, op));
        for (key, deltas) in spills {
            self.apply(key, &deltas)?;
        }
        Ok(())
    }

    fn apply(&mut self, key: u64, deltas: &[Delta]) -> Result<()> {
        if deltas.is_empty() {
            return Ok(());
        }

        let stored = self.list.stored_words(key);
        let merged = merge_entries(&stored, deltas, self.set_kind);
        if merged.is_empty() {
            self.list.discard(key);
            return Ok(());
        }

        let capacity = (stored.len() + deltas.len() * 2) as u64;
        self.list.rewrite(key, &merged, capacity)
    }
}

/// Merge sorted pairs with sorted deltas into flattened sorted pairs
fn merge_entries(stored: &[i64], deltas: &[Delta], kind: SetKind) -> Vec<i64> {
    let mut out = Vec::with_capacity(stored.len() + deltas.len() * 2);
    let mut pairs = stored.chunks_exact(2).map(|p| (p[0], p[1])).peekable();
    let mut deltas = deltas.iter().peekable();

    loop {
        let (value, attribute) = match (pairs.peek().copied(), deltas.peek().copied()) {
            (None, None) => break,
            (Some(pair), None) => {
                pairs.next();
                (pair.0, Some(pair.1))
            }
            (None, Some(delta)) => {
                deltas.next();
                (delta.value, resolve(None, delta.op, kind))
            }
            (Some(pair), Some(delta)) => {
                if pair.0 < delta.value {
                    pairs.next();
                    (pair.0, Some(pair.1))
                } else if delta.value < pair.0 {
                    deltas.next();
                    (delta.value, resolve(None, delta.op, kind))
                } else {
                    pairs.next();
                    deltas.next();
                    (delta.value, resolve(Some(pair.1), delta.op, kind))
                }
            }
        };
        if let Some(attribute) = attribute {
            out.push(value);
            out.push(attribute);
        }
    }
    out
}

/// Attribute after applying `op`; None drops the member
fn resolve(current: Option<i64>, op: DeltaOp, kind: SetKind) -> Option<i64> {
    match op {
        DeltaOp::Delete => None,
        DeltaOp::Assign(NULL) => None,
        DeltaOp::Assign(x) if kind == SetKind::Multi && x <= 0 => None,
        DeltaOp::Assign(x) => Some(x),
        DeltaOp::Add { .. } => {
            let count = op.count(current.unwrap_or(0));
            (count > 0).then_some(count)
        }
    }
}

/// Keys holding at least one member accepted by `keep`
fn scan<'a, F>(set: &'a SetMap, keep: F) -> KeySeq<'a>
where
    F: Fn(i64) -> bool + 'a,
{
    KeySeq::new(set.stored_keys(0, MAX_KEY as u64).filter_map(move |key| {
        set.stored_entries(key)
            .any(|(value, _)| keep(value))
            .then_some(key as i64)
    }))
}

impl KeyMap for SetMap {
    fn name(&self) -> &str {
        self.core().name()
    }

    fn kind(&self) -> MapKind {
        MapKind::Set
    }

    fn contains_key(&mut self, key: i64) -> Result<bool> {
        let Ok(key_u) = u64::try_from(key) else {
            return Ok(false);
        };
        self.merge(key_u)?;
        self.list.contains_key(key)
    }

    fn key_count(&mut self) -> Result<u64> {
        self.merge_all()?;
        self.list.key_count()
    }

    fn keys(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>> {
        self.merge_all()?;
        let Some((lo, hi)) = key_range(lo, hi) else {
            return Ok(KeySeq::empty());
        };
        Ok(KeySeq::new(self.stored_keys(lo, hi).map(|k| k as i64)))
    }

    fn remove(&mut self, key: i64) -> Result<bool> {
        let Ok(key_u) = u64::try_from(key) else {
            return Ok(false);
        };
        let pending = self.cache.take(key_u).is_some();
        Ok(self.list.discard(key_u) || pending)
    }

    fn query(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>> {
        self.merge_all()?;
        let Some((lo, hi)) = value_range(lo, hi) else {
            return Ok(KeySeq::empty());
        };
        Ok(scan(self, move |v| v >= lo && v <= hi))
    }

    fn union_query(&mut self, values: &[i64]) -> Result<KeySeq<'_>> {
        self.merge_all()?;
        let wanted: BTreeSet<i64> = values.iter().copied().filter(|v| *v != NULL).collect();
        Ok(scan(self, move |v| wanted.contains(&v)))
    }

    fn next_key(&self) -> i64 {
        self.core().next_key()
    }

    fn key_reserver(&self) -> KeyReserver {
        self.core().reserver()
    }

    fn flush(&mut self) -> Result<()> {
        self.merge_all()?;
        self.list.flush()
    }

    fn commit(&mut self) -> Result<()> {
        self.merge_all()?;
        self.list.commit()
    }

    fn clear(&mut self) -> Result<()> {
        self.cache.clear();
        self.list.clear()
    }

    fn close(&mut self) -> Result<()> {
        self.merge_all()?;
        self.list.close()
    }

    fn stats(&self) -> MapStats {
        MapStats {
            pending_set_keys: self.cache.len(),
            ..self.list.stats()
        }
    }
}

/// Lazy sequence of the `(value, attribute)` pairs of one key
#[derive(Debug)]
pub struct SetEntries<'a> {
    alloc: &'a SlotAllocator,
    slot: Option<Slot>,
    pos: u64,
    len: u64,
}

impl<'a> SetEntries<'a> {
    fn empty(alloc: &'a SlotAllocator) -> Self {
        Self {
            alloc,
            slot: None,
            pos: 0,
            len: 0,
        }
    }
}

impl Iterator for SetEntries<'_> {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<(i64, i64)> {
        let slot = self.slot?;
        if self.pos + 1 >= self.len {
            return None;
        }
        let pair = (self.alloc.read(slot, self.pos), self.alloc.read(slot, self.pos + 1));
        self.pos += 2;
        Some(pair)
    }
}
