//! Configuration for densekv
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::props::{Properties, PropertyValue};

/// File holding the database-wide configuration inside `data_dir`
pub const DATABASE_PROPERTIES: &str = "database.properties";

/// Main configuration for a densekv database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all map directories
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── database.properties
    ///     └── {map}/            (one directory per map)
    pub data_dir: PathBuf,

    /// Back windows and value buffers with mapped files (false = heap only)
    pub persistent: bool,

    /// Expected number of maps, used to size the registry
    pub initial_map_capacity: usize,

    // -------------------------------------------------------------------------
    // Key Store Configuration
    // -------------------------------------------------------------------------
    /// Keys per window for fixed-node maps
    pub fixed_window_keys: u64,

    /// Keys per window for list maps
    pub list_window_keys: u64,

    /// Keys per window for set maps (and set-backed index partitions)
    pub set_window_keys: u64,

    // -------------------------------------------------------------------------
    // Value Buffer Configuration
    // -------------------------------------------------------------------------
    /// Size of the first value buffer of a map (in words)
    pub initial_buffer_words: u64,

    /// Upper bound for the doubling growth of value buffers (in words)
    pub max_buffer_words: u64,

    /// Maximum number of released slots cached for reuse
    pub free_slot_capacity: usize,

    /// Smallest slot handed to a list (in words)
    pub list_minimum_slot: u64,

    // -------------------------------------------------------------------------
    // Set Cache Configuration
    // -------------------------------------------------------------------------
    /// Number of buckets of the set delta cache
    pub set_cache_capacity: usize,

    /// Pending deltas per key before that key is merged
    pub set_cache_depth: usize,

    /// Keys chained in one bucket before the oldest is merged
    pub set_cache_chain: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./densekv_data"),
            persistent: true,
            initial_map_capacity: 16,
            fixed_window_keys: 64 * 1024,
            list_window_keys: 16 * 1024,
            set_window_keys: 16 * 1024,
            initial_buffer_words: 64 * 1024,
            max_buffer_words: 16 * 1024 * 1024, // 128 MB of words
            free_slot_capacity: 64 * 1024,
            list_minimum_slot: 4,
            set_cache_capacity: 4096,
            set_cache_depth: 64,
            set_cache_chain: 4,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Heap-only configuration; nothing touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            persistent: false,
            ..Self::default()
        }
    }

    /// Load `database.properties` from a data directory
    ///
    /// A missing or unreadable file is logged and yields the defaults,
    /// rooted at `data_dir`.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(DATABASE_PROPERTIES);
        let mut config = match Properties::load(&path) {
            Ok(props) => Self::from_properties(&props),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "falling back to default configuration");
                Self::default()
            }
        };
        config.data_dir = data_dir.to_path_buf();
        config
    }

    /// Persist the recognized keys as typed records
    pub fn save(&self) -> Result<()> {
        self.to_properties()
            .save(&self.data_dir.join(DATABASE_PROPERTIES))
    }

    /// Overlay recognized keys on top of the defaults
    pub fn from_properties(props: &Properties) -> Self {
        let mut config = Self::default();
        let long = |key: &str, current: u64| {
            props
                .get_long(key)
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(current)
        };

        config.persistent = props.get_bool("persistent").unwrap_or(config.persistent);
        config.initial_map_capacity =
            long("keystore.initial.capacity", config.initial_map_capacity as u64) as usize;
        config.fixed_window_keys = long("keystore.window.fixed", config.fixed_window_keys);
        config.list_window_keys = long("keystore.window.list", config.list_window_keys);
        config.set_window_keys = long("keystore.window.set", config.set_window_keys);
        config.initial_buffer_words = long("values.buffer.initial", config.initial_buffer_words);
        config.max_buffer_words = long("values.buffer.max", config.max_buffer_words);
        config.free_slot_capacity =
            long("values.released.capacity", config.free_slot_capacity as u64) as usize;
        config.list_minimum_slot = long("list.slot.minimum", config.list_minimum_slot);
        config.set_cache_capacity =
            long("setcache.capacity", config.set_cache_capacity as u64) as usize;
        config.set_cache_depth = long("setcache.depth", config.set_cache_depth as u64) as usize;
        config.set_cache_chain = long("setcache.chain", config.set_cache_chain as u64) as usize;
        config
    }

    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        let long = |v: u64| PropertyValue::Long(v as i64);

        props.set("persistent", PropertyValue::Bool(self.persistent));
        props.set("keystore.initial.capacity", long(self.initial_map_capacity as u64));
        props.set("keystore.window.fixed", long(self.fixed_window_keys));
        props.set("keystore.window.list", long(self.list_window_keys));
        props.set("keystore.window.set", long(self.set_window_keys));
        props.set("values.buffer.initial", long(self.initial_buffer_words));
        props.set("values.buffer.max", long(self.max_buffer_words));
        props.set("values.released.capacity", long(self.free_slot_capacity as u64));
        props.set("list.slot.minimum", long(self.list_minimum_slot));
        props.set("setcache.capacity", long(self.set_cache_capacity as u64));
        props.set("setcache.depth", long(self.set_cache_depth as u64));
        props.set("setcache.chain", long(self.set_cache_chain as u64));
        props
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Enable or disable file-backed storage
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.config.persistent = persistent;
        self
    }

    pub fn initial_map_capacity(mut self, count: usize) -> Self {
        self.config.initial_map_capacity = count;
        self
    }

    /// Set the window span of fixed-node maps (in keys)
    pub fn fixed_window_keys(mut self, keys: u64) -> Self {
        self.config.fixed_window_keys = keys.max(1);
        self
    }

    /// Set the window span of list maps (in keys)
    pub fn list_window_keys(mut self, keys: u64) -> Self {
        self.config.list_window_keys = keys.max(1);
        self
    }

    /// Set the window span of set maps (in keys)
    pub fn set_window_keys(mut self, keys: u64) -> Self {
        self.config.set_window_keys = keys.max(1);
        self
    }

    /// Set the first value buffer size (in words)
    pub fn initial_buffer_words(mut self, words: u64) -> Self {
        self.config.initial_buffer_words = words.max(1);
        self
    }

    /// Set the value buffer growth cap (in words)
    pub fn max_buffer_words(mut self, words: u64) -> Self {
        self.config.max_buffer_words = words.max(1);
        self
    }

    pub fn free_slot_capacity(mut self, count: usize) -> Self {
        self.config.free_slot_capacity = count;
        self
    }

    pub fn list_minimum_slot(mut self, words: u64) -> Self {
        self.config.list_minimum_slot = words.max(1);
        self
    }

    pub fn set_cache_capacity(mut self, buckets: usize) -> Self {
        self.config.set_cache_capacity = buckets.max(1);
        self
    }

    pub fn set_cache_depth(mut self, deltas: usize) -> Self {
        self.config.set_cache_depth = deltas.max(1);
        self
    }

    pub fn set_cache_chain(mut self, keys: usize) -> Self {
        self.config.set_cache_chain = keys.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
