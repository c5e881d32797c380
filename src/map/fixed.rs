//! Fixed-Node Map
//!
//! A constant number of values stored directly in each key's node.

use std::collections::BTreeSet;

use crate::constants::{MAX_KEY, NULL};
use crate::error::{DenseError, Result};
use crate::index::{IndexKind, SecondaryIndex};
use crate::keystore::{KeyIter, NodeRef};
use crate::query::{key_range, value_range, KeySeq};
use crate::storage::MapDir;

use super::{KeyMap, KeyReserver, MapCore, MapKind, MapMeta, MapOptions, MapSettings, MapStats};

/// Map storing `width` values per key in the node itself
///
/// Node layout: `[active][v0][v1]...[v(width-1)]`. A node that becomes
/// active is reset to NULL payload; removal only clears the active word.
#[derive(Debug)]
pub struct FixedNodeMap {
    core: MapCore,
    width: usize,
    index: Option<Box<SecondaryIndex>>,
}

impl FixedNodeMap {
    pub(crate) fn open(
        name: &str,
        meta: MapMeta,
        settings: &MapSettings,
        dir: Option<MapDir>,
    ) -> Result<Self> {
        let width = meta.values.max(1);
        let index = match meta.index {
            Some(kind) => Some(Box::new(SecondaryIndex::open(
                kind,
                name,
                settings,
                dir.as_ref().map(|d| d.child(SecondaryIndex::DIR)),
            )?)),
            None => None,
        };
        let core = MapCore::open(name, meta, width + 1, settings, dir)?;
        Ok(Self { core, width, index })
    }

    /// Heap-backed map outside any database
    pub fn in_memory(name: &str, width: usize, settings: &MapSettings) -> Result<Self> {
        let meta = MapMeta::new(&MapOptions::fixed(width), settings.fixed_window_keys);
        Self::open(name, meta, settings, None)
    }

    pub fn core(&self) -> &MapCore {
        &self.core
    }

    /// Values per key
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn index_kind(&self) -> Option<IndexKind> {
        self.index.as_ref().map(|ix| ix.kind())
    }

    /// Store `value` at position `index` of `key`, returning the previous value
    pub fn put(&mut self, key: i64, index: usize, value: i64) -> Result<i64> {
        let key_u = MapCore::check_key(key)?;
        self.check_index(index)?;
        MapCore::check_value(value)?;

        let (node, created) = self.core.activate(key_u)?;
        if created {
            for offset in 1..=self.width {
                self.core.keys_mut().set_word(node, offset, NULL);
            }
        }

        let old = self.core.keys().word(node, index + 1);
        self.core.keys_mut().set_word(node, index + 1, value);

        if let Some(ix) = self.index.as_mut() {
            let retained = old != NULL && self.core.keys().payload(node).contains(&old);
            ix.replace(key, old, value, retained)?;
        }
        Ok(old)
    }

    /// Value at position `index` of `key`, NULL when absent
    pub fn get(&self, key: i64, index: usize) -> Result<i64> {
        self.check_index(index)?;
        Ok(self
            .active_node(key)
            .map_or(NULL, |node| self.core.keys().word(node, index + 1)))
    }

    /// Store the first value of `key`
    pub fn set(&mut self, key: i64, value: i64) -> Result<i64> {
        self.put(key, 0, value)
    }

    /// First value of `key`, NULL when absent
    pub fn value(&self, key: i64) -> i64 {
        self.active_node(key)
            .map_or(NULL, |node| self.core.keys().word(node, 1))
    }

    /// All values of `key`
    pub fn values(&self, key: i64) -> Option<Vec<i64>> {
        self.active_node(key)
            .map(|node| self.core.keys().payload(node))
    }

    /// Store a whole node at once
    pub fn put_all(&mut self, key: i64, values: &[i64]) -> Result<()> {
        if values.len() != self.width {
            return Err(DenseError::IndexOutOfRange {
                index: values.len(),
                width: self.width,
            });
        }
        for (index, value) in values.iter().enumerate() {
            self.put(key, index, *value)?;
        }
        Ok(())
    }

    /// Append `values` under a freshly reserved key
    pub fn insert(&mut self, values: &[i64]) -> Result<i64> {
        let key = self.core.reserver().reserve();
        self.put_all(key, values)?;
        Ok(key)
    }

    pub(crate) fn stored_keys(&self, lo: u64, hi: u64) -> KeyIter<'_> {
        self.core.keys().keys(lo, hi)
    }

    /// Unchecked read used by index partitions
    pub(crate) fn stored_value(&self, key: u64, index: usize) -> i64 {
        self.core
            .keys()
            .find_active(key)
            .map_or(NULL, |node| self.core.keys().word(node, index + 1))
    }

    /// Rebuild the secondary index from every stored value
    pub fn add_index(&mut self, kind: IndexKind) -> Result<()> {
        let root = self.core.dir().map(|d| d.child(SecondaryIndex::DIR));
        if let Some(mut old) = self.index.take() {
            old.clear()?;
        }
        let mut index = SecondaryIndex::create(kind, self.core.name(), self.core.settings(), root)?;

        let mut indexed = 0u64;
        let keys = self.core.keys();
        for key in keys.keys(0, MAX_KEY as u64) {
            let Some(node) = keys.find(key) else { continue };
            for value in keys.payload(node) {
                if value != NULL {
                    index.index(key as i64, NULL, value)?;
                    indexed += 1;
                }
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
    // Private Helpers
    // =========================================================================

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.width {
            return Err(DenseError::IndexOutOfRange {
                index,
                width: self.width,
            });
        }
        Ok(())
    }

    fn active_node(&self, key: i64) -> Option<NodeRef> {
        let key = u64::try_from(key).ok()?;
        self.core.keys().find_active(key)
    }
}

/// Keys whose node holds at least one value accepted by `keep`
fn scan<'a, F>(core: &'a MapCore, keep: F) -> KeySeq<'a>
where
    F: Fn(i64) -> bool + 'a,
{
    let keys = core.keys();
    KeySeq::new(keys.keys(0, MAX_KEY as u64).filter_map(move |key| {
        let node = keys.find(key)?;
        keys.payload(node)
            .into_iter()
            .any(|v| v != NULL && keep(v))
            .then_some(key as i64)
    }))
}

impl KeyMap for FixedNodeMap {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn kind(&self) -> MapKind {
        MapKind::Fixed
    }

    fn contains_key(&mut self, key: i64) -> Result<bool> {
        Ok(self.active_node(key).is_some())
    }

    fn key_count(&mut self) -> Result<u64> {
        Ok(self.core.keys().key_count())
    }

    fn keys(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>> {
        let Some((lo, hi)) = key_range(lo, hi) else {
            return Ok(KeySeq::empty());
        };
        Ok(KeySeq::new(self.core.keys().keys(lo, hi).map(|k| k as i64)))
    }

    fn remove(&mut self, key: i64) -> Result<bool> {
        let Some(node) = self.active_node(key) else {
            return Ok(false);
        };
        if let Some(ix) = self.index.as_mut() {
            for value in self.core.keys().payload(node) {
                if value != NULL {
                    ix.index(key, value, NULL)?;
                }
            }
        }
        Ok(self.core.deactivate(node))
    }

    fn query(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>> {
        let Some((lo, hi)) = value_range(lo, hi) else {
            return Ok(KeySeq::empty());
        };
        let Self { core, index, .. } = self;
        match index {
            Some(ix) => ix.keys_for_range(lo, hi),
            None => Ok(scan(core, move |v| v >= lo && v <= hi)),
        }
    }

    fn union_query(&mut self, values: &[i64]) -> Result<KeySeq<'_>> {
        let Self { core, index, .. } = self;
        match index {
            Some(ix) => ix.keys_for_set(values),
            None => {
                let wanted: BTreeSet<i64> = values.iter().copied().filter(|v| *v != NULL).collect();
                Ok(scan(core, move |v| wanted.contains(&v)))
            }
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
        self.core.flush();
        self.core.commit()?;
        if let Some(ix) = self.index.as_mut() {
            ix.commit()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.core.clear()?;
        if let Some(ix) = self.index.as_mut() {
            ix.clear()?;
        }
        tracing::info!(map = self.core.name(), "cleared map");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.commit()?;
        if let Some(ix) = self.index.as_mut() {
            ix.close()?;
        }
        Ok(())
    }

    fn stats(&self) -> MapStats {
        self.core.stats()
    }
}
