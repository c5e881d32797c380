//! Shared map state
//!
//! Every strategy keeps its keys in a `KeyStore` and its shape in a
//! `MapMeta`; `MapCore` bundles them with the largest-key cache.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::constants::{is_reserved, NULL};
use crate::error::{DenseError, Result};
use crate::keystore::{KeyStore, NodeRef};
use crate::storage::MapDir;

use super::{MapMeta, MapSettings, MapStats};

/// Hands out distinct keys across threads
///
/// The only synchronized structure in the engine: clones share one counter,
/// which never falls below one past the largest key written to the map.
#[derive(Debug, Clone)]
pub struct KeyReserver {
    next: Arc<Mutex<i64>>,
}

impl KeyReserver {
    pub fn new(next: i64) -> Self {
        Self {
            next: Arc::new(Mutex::new(next.max(0))),
        }
    }

    /// Reserve one key
    pub fn reserve(&self) -> i64 {
        let mut next = self.next.lock();
        let key = *next;
        *next += 1;
        key
    }

    /// Reserve `count` consecutive keys
    pub fn reserve_many(&self, count: u64) -> std::ops::Range<i64> {
        let mut next = self.next.lock();
        let start = *next;
        *next = start.saturating_add(count as i64);
        start..*next
    }

    /// The key the next `reserve` would return
    pub fn peek(&self) -> i64 {
        *self.next.lock()
    }

    /// Record a key written directly, so it is never handed out
    pub fn observe(&self, key: i64) {
        let mut next = self.next.lock();
        if key >= *next {
            *next = key.saturating_add(1);
        }
    }

    fn reset(&self) {
        *self.next.lock() = 0;
    }
}

/// Key store, metadata and bookkeeping of one map
#[derive(Debug)]
pub struct MapCore {
    name: String,
    keys: KeyStore,
    dir: Option<MapDir>,
    meta: MapMeta,
    settings: MapSettings,
    reserver: KeyReserver,
}

impl MapCore {
    pub(crate) fn open(
        name: &str,
        mut meta: MapMeta,
        node_size: usize,
        settings: &MapSettings,
        dir: Option<MapDir>,
    ) -> Result<Self> {
        let keys = KeyStore::open(node_size, meta.window_keys, dir.clone())?;

        meta.largest = match (meta.largest, keys.largest_key()) {
            (Some(saved), Some(found)) => Some(saved.max(found)),
            (saved, found) => saved.or(found),
        };
        let reserver = KeyReserver::new(meta.largest.map_or(0, |k| k as i64 + 1));

        Ok(Self {
            name: name.to_string(),
            keys,
            dir,
            meta,
            settings: *settings,
            reserver,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn keys_mut(&mut self) -> &mut KeyStore {
        &mut self.keys
    }

    pub fn dir(&self) -> Option<&MapDir> {
        self.dir.as_ref()
    }

    pub fn meta(&self) -> &MapMeta {
        &self.meta
    }

    pub(crate) fn meta_mut(&mut self) -> &mut MapMeta {
        &mut self.meta
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    /// Validate a key for storage
    pub fn check_key(key: i64) -> Result<u64> {
        u64::try_from(key).map_err(|_| DenseError::NegativeKey(key))
    }

    /// Validate a stored value; NULL is allowed and means "absent"
    pub fn check_value(value: i64) -> Result<()> {
        if is_reserved(value) {
            return Err(DenseError::ReservedValue(value));
        }
        Ok(())
    }

    /// Validate a member of a set or list, where NULL is not storable
    pub fn check_member(value: i64) -> Result<()> {
        if value == NULL || is_reserved(value) {
            return Err(DenseError::ReservedValue(value));
        }
        Ok(())
    }

    /// Resolve and activate the node of `key`; true when it was inactive
    pub fn activate(&mut self, key: u64) -> Result<(NodeRef, bool)> {
        let node = self.keys.ensure_node(key)?;
        let created = self.keys.set_active(node, true);
        if created {
            self.observe(key);
        }
        Ok((node, created))
    }

    /// Raise the largest-key mark to `key`
    pub fn observe(&mut self, key: u64) {
        self.meta.largest = Some(self.meta.largest.map_or(key, |k| k.max(key)));
        self.reserver.observe(key as i64);
    }

    pub fn deactivate(&mut self, node: NodeRef) -> bool {
        self.keys.set_active(node, false)
    }

    pub fn next_key(&self) -> i64 {
        self.meta.largest.map_or(0, |k| k as i64 + 1)
    }

    pub fn reserver(&self) -> KeyReserver {
        self.reserver.clone()
    }

    /// Write window counters into the buffers
    pub fn flush(&mut self) {
        self.keys.write_counts();
    }

    /// Sync windows and rewrite the metadata record
    pub fn commit(&mut self) -> Result<()> {
        self.keys.sync()?;
        self.save_meta()
    }

    pub fn save_meta(&self) -> Result<()> {
        if let Some(dir) = &self.dir {
            self.meta.save(&dir.meta_path())?;
        }
        Ok(())
    }

    /// Drop every key window and forget the largest key
    pub fn clear(&mut self) -> Result<()> {
        self.keys.clear()?;
        self.meta.largest = None;
        self.meta.cursor = None;
        self.reserver.reset();
        self.save_meta()
    }

    /// Key-store half of the map statistics
    pub fn stats(&self) -> MapStats {
        MapStats {
            keys: self.keys.key_count(),
            windows: self.keys.window_count(),
            ..MapStats::default()
        }
    }
}
