//! Map Module
//!
//! The three storage strategies built on the key store and the allocator.
//!
//! ## Responsibilities
//! - Fixed-node maps: a constant number of values stored in the node itself
//! - List maps: a variable-length array per key in a value slot
//! - Set maps: sorted (value, attribute) pairs with a write-back delta cache
//!
//! ## Node Layouts
//! ```text
//! fixed: [active][v0][v1]...[vN-1]
//! list:  [active][length][slot size][slot buffer][slot offset]
//! set:   same header as list; the slot holds sorted (value, attribute) pairs
//! ```

mod cache;
mod base;
mod fixed;
mod list;
mod meta;
mod set;

pub use self::cache::{Delta, DeltaOp, SetCache};
pub use self::base::{KeyReserver, MapCore};
pub use self::fixed::FixedNodeMap;
pub use self::list::{ListMap, ListValues};
pub use self::meta::MapMeta;
pub use self::set::{SetEntries, SetMap};

use std::fmt;

use crate::alloc::AllocatorSettings;
use crate::config::Config;
use crate::error::{DenseError, Result};
use crate::index::IndexKind;
use crate::query::KeySeq;
use crate::storage::MapDir;

// =============================================================================
// Kinds
// =============================================================================

/// Storage strategy of a map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapKind {
    Fixed,
    List,
    Set,
}

impl MapKind {
    pub fn name(self) -> &'static str {
        match self {
            MapKind::Fixed => "fixed",
            MapKind::List => "list",
            MapKind::Set => "set",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "fixed" => Ok(MapKind::Fixed),
            "list" => Ok(MapKind::List),
            "set" => Ok(MapKind::Set),
            other => Err(DenseError::Config(format!("unknown map kind '{}'", other))),
        }
    }
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Meaning of the attribute stored next to each set member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SetKind {
    /// Attribute is a presence marker
    #[default]
    Plain,
    /// Attribute is an occurrence count; writes add to it
    Multi,
    /// Attribute is an arbitrary tag; writes replace it
    Attributed,
}

impl SetKind {
    pub fn name(self) -> &'static str {
        match self {
            SetKind::Plain => "plain",
            SetKind::Multi => "multi",
            SetKind::Attributed => "attributed",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "plain" => Ok(SetKind::Plain),
            "multi" => Ok(SetKind::Multi),
            "attributed" => Ok(SetKind::Attributed),
            other => Err(DenseError::Config(format!("unknown set kind '{}'", other))),
        }
    }
}

// =============================================================================
// Options and Settings
// =============================================================================

/// Shape of a map, fixed when it is defined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapOptions {
    pub kind: MapKind,
    /// Values per key (fixed maps only)
    pub values: usize,
    /// Attribute meaning (set maps only)
    pub set_kind: SetKind,
    pub index: Option<IndexKind>,
    /// Override of the database-wide persistence flag
    pub persistent: Option<bool>,
}

impl MapOptions {
    /// Fixed-node map holding `values` words per key
    pub fn fixed(values: usize) -> Self {
        Self {
            kind: MapKind::Fixed,
            values,
            set_kind: SetKind::Plain,
            index: None,
            persistent: None,
        }
    }

    /// Fixed-node map with one value per key
    pub fn single() -> Self {
        Self::fixed(1)
    }

    pub fn list() -> Self {
        Self {
            kind: MapKind::List,
            ..Self::fixed(0)
        }
    }

    pub fn set(set_kind: SetKind) -> Self {
        Self {
            kind: MapKind::Set,
            set_kind,
            ..Self::fixed(0)
        }
    }

    pub fn with_index(mut self, kind: IndexKind) -> Self {
        self.index = Some(kind);
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = Some(persistent);
        self
    }
}

/// Database-wide knobs every map is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapSettings {
    pub fixed_window_keys: u64,
    pub list_window_keys: u64,
    pub set_window_keys: u64,
    pub alloc: AllocatorSettings,
    pub list_minimum_slot: u64,
    pub set_cache_capacity: usize,
    pub set_cache_depth: usize,
    pub set_cache_chain: usize,
}

impl MapSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fixed_window_keys: config.fixed_window_keys,
            list_window_keys: config.list_window_keys,
            set_window_keys: config.set_window_keys,
            alloc: AllocatorSettings {
                initial_words: config.initial_buffer_words,
                max_words: config.max_buffer_words,
                free_slot_capacity: config.free_slot_capacity,
            },
            list_minimum_slot: config.list_minimum_slot,
            set_cache_capacity: config.set_cache_capacity,
            set_cache_depth: config.set_cache_depth,
            set_cache_chain: config.set_cache_chain,
        }
    }

    /// Window span for a storage strategy
    pub fn window_keys(&self, kind: MapKind) -> u64 {
        match kind {
            MapKind::Fixed => self.fixed_window_keys,
            MapKind::List => self.list_window_keys,
            MapKind::Set => self.set_window_keys,
        }
    }
}

impl Default for MapSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Size and occupancy snapshot of one map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStats {
    pub keys: u64,
    pub windows: usize,
    pub value_buffers: usize,
    pub value_words: u64,
    pub free_slots: usize,
    pub pending_set_keys: usize,
}

// =============================================================================
// Capability Interface
// =============================================================================

/// Operations every storage strategy provides
///
/// Reads that may have to merge pending set deltas take `&mut self`.
pub trait KeyMap {
    fn name(&self) -> &str;

    fn kind(&self) -> MapKind;

    fn contains_key(&mut self, key: i64) -> Result<bool>;

    /// Number of active keys
    fn key_count(&mut self) -> Result<u64>;

    /// Active keys in `lo..=hi`, ascending
    fn keys(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>>;

    /// Drop a key and everything stored under it; false if it was absent
    fn remove(&mut self, key: i64) -> Result<bool>;

    /// Keys holding at least one value in `lo..=hi`
    fn query(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>>;

    /// Keys holding at least one of `values`
    fn union_query(&mut self, values: &[i64]) -> Result<KeySeq<'_>>;

    /// One past the largest key ever stored
    fn next_key(&self) -> i64;

    /// Thread-safe key reservation handle
    fn key_reserver(&self) -> KeyReserver;

    /// Bring in-memory state (counters, set deltas) into the buffers
    fn flush(&mut self) -> Result<()>;

    /// Flush, sync mapped files and rewrite the metadata record
    fn commit(&mut self) -> Result<()>;

    /// Delete all data of the map
    fn clear(&mut self) -> Result<()>;

    /// Commit and persist the free-slot pool
    fn close(&mut self) -> Result<()>;

    fn stats(&self) -> MapStats;
}

// =============================================================================
// Map
// =============================================================================

/// A map of any strategy, as held by the database registry
#[derive(Debug)]
pub enum Map {
    Fixed(FixedNodeMap),
    List(ListMap),
    Set(SetMap),
}

macro_rules! dispatch {
    ($map:expr, $inner:ident => $body:expr) => {
        match $map {
            Map::Fixed($inner) => $body,
            Map::List($inner) => $body,
            Map::Set($inner) => $body,
        }
    };
}

impl Map {
    /// Build a new map in `dir` (or on the heap) and record its metadata
    pub(crate) fn create(
        name: &str,
        options: &MapOptions,
        settings: &MapSettings,
        dir: Option<MapDir>,
    ) -> Result<Self> {
        if options.kind == MapKind::Fixed && options.values == 0 {
            return Err(DenseError::Config(format!(
                "fixed map '{}' needs at least one value per key",
                name
            )));
        }

        let meta = MapMeta::new(options, settings.window_keys(options.kind));
        let mut map = Self::from_meta(name, meta, settings, dir)?;
        if let Some(kind) = options.index {
            map.add_index(kind)?;
        }
        map.core().save_meta()?;

        tracing::info!(map = name, kind = %options.kind, "defined map");
        Ok(map)
    }

    /// Reopen a map from its metadata record
    pub(crate) fn open(name: &str, settings: &MapSettings, dir: MapDir) -> Result<Self> {
        let meta = MapMeta::load(&dir.meta_path())?;
        let map = Self::from_meta(name, meta, settings, Some(dir))?;
        tracing::info!(map = name, kind = %map.kind(), "opened map");
        Ok(map)
    }

    fn from_meta(
        name: &str,
        meta: MapMeta,
        settings: &MapSettings,
        dir: Option<MapDir>,
    ) -> Result<Self> {
        Ok(match meta.kind {
            MapKind::Fixed => Map::Fixed(FixedNodeMap::open(name, meta, settings, dir)?),
            MapKind::List => Map::List(ListMap::open(name, meta, settings, dir)?),
            MapKind::Set => Map::Set(SetMap::open(name, meta, settings, dir)?),
        })
    }

    pub(crate) fn core(&self) -> &MapCore {
        match self {
            Map::Fixed(m) => m.core(),
            Map::List(m) => m.core(),
            Map::Set(m) => m.core(),
        }
    }

    pub fn meta(&self) -> &MapMeta {
        self.core().meta()
    }

    pub fn index_kind(&self) -> Option<IndexKind> {
        match self {
            Map::Fixed(m) => m.index_kind(),
            Map::List(m) => m.index_kind(),
            Map::Set(_) => None,
        }
    }

    /// Build (or rebuild) a secondary index over the stored values
    pub fn add_index(&mut self, kind: IndexKind) -> Result<()> {
        match self {
            Map::Fixed(m) => m.add_index(kind),
            Map::List(m) => m.add_index(kind),
            Map::Set(m) => Err(DenseError::Unsupported(format!(
                "secondary index on set map '{}'",
                m.core().name()
            ))),
        }
    }

    pub fn drop_index(&mut self) -> Result<()> {
        match self {
            Map::Fixed(m) => m.drop_index(),
            Map::List(m) => m.drop_index(),
            Map::Set(_) => Ok(()),
        }
    }

    pub fn as_fixed(&mut self) -> Option<&mut FixedNodeMap> {
        match self {
            Map::Fixed(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&mut self) -> Option<&mut ListMap> {
        match self {
            Map::List(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_set(&mut self) -> Option<&mut SetMap> {
        match self {
            Map::Set(m) => Some(m),
            _ => None,
        }
    }
}

impl KeyMap for Map {
    fn name(&self) -> &str {
        dispatch!(self, m => m.name())
    }

    fn kind(&self) -> MapKind {
        dispatch!(self, m => m.kind())
    }

    fn contains_key(&mut self, key: i64) -> Result<bool> {
        dispatch!(self, m => m.contains_key(key))
    }

    fn key_count(&mut self) -> Result<u64> {
        dispatch!(self, m => m.key_count())
    }

    fn keys(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>> {
        dispatch!(self, m => m.keys(lo, hi))
    }

    fn remove(&mut self, key: i64) -> Result<bool> {
        dispatch!(self, m => m.remove(key))
    }

    fn query(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>> {
        dispatch!(self, m => m.query(lo, hi))
    }

    fn union_query(&mut self, values: &[i64]) -> Result<KeySeq<'_>> {
        dispatch!(self, m => m.union_query(values))
    }

    fn next_key(&self) -> i64 {
        dispatch!(self, m => m.next_key())
    }

    fn key_reserver(&self) -> KeyReserver {
        dispatch!(self, m => m.key_reserver())
    }

    fn flush(&mut self) -> Result<()> {
        dispatch!(self, m => m.flush())
    }

    fn commit(&mut self) -> Result<()> {
        dispatch!(self, m => m.commit())
    }

    fn clear(&mut self) -> Result<()> {
        dispatch!(self, m => m.clear())
    }

    fn close(&mut self) -> Result<()> {
        dispatch!(self, m => m.close())
    }

    fn stats(&self) -> MapStats {
        dispatch!(self, m => m.stats())
    }
}
