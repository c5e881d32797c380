//! Database Module
//!
//! The context object that owns every map of one data directory.
//!
//! ## Responsibilities
//! - Define maps by name, rejecting conflicting redefinitions
//! - Load persisted maps lazily on first access and cache them
//! - Flush, commit and close all maps together

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use crate::config::{Config, DATABASE_PROPERTIES};
use crate::error::{DenseError, Result};
use crate::map::{FixedNodeMap, KeyMap, ListMap, Map, MapOptions, MapSettings, SetMap};
use crate::storage::MapDir;

/// An embedded densekv database
///
/// ## Ownership
///
/// Maps are owned by the registry and handed out as `&mut` borrows, so at
/// most one map is being written at a time. Nothing here is synchronized;
/// share keys across threads through `KeyMap::key_reserver` only.
#[derive(Debug)]
pub struct Database {
    /// Database configuration
    config: Config,

    /// Knobs every map is built with (derived from `config`)
    settings: MapSettings,

    /// Maps touched in this session, by name
    maps: HashMap<String, Map>,
}

impl Database {
    /// Open or create a database with the given config
    ///
    /// On startup:
    /// 1. Create the data directory (persistent mode)
    /// 2. Write `database.properties` if it is missing
    /// 3. Maps are loaded later, on first access
    pub fn open(config: Config) -> Result<Self> {
        if config.persistent {
            // Step 1: Create data directory if it doesn't exist
            fs::create_dir_all(&config.data_dir)?;

            // Step 2: Record the configuration the maps were built with
            if !config.data_dir.join(DATABASE_PROPERTIES).exists() {
                if let Err(e) = config.save() {
                    tracing::warn!(
                        data_dir = %config.data_dir.display(),
                        error = %e,
                        "could not record database configuration"
                    );
                }
            }
        }

        tracing::info!(
            data_dir = %config.data_dir.display(),
            persistent = config.persistent,
            "opened database"
        );

        Ok(Self {
            settings: MapSettings::from_config(&config),
            maps: HashMap::with_capacity(config.initial_map_capacity),
            config,
        })
    }

    /// Open a data directory using its recorded configuration
    pub fn open_dir(path: &Path) -> Result<Self> {
        Self::open(Config::load(path))
    }

    /// Heap-only database
    pub fn in_memory() -> Result<Self> {
        Self::open(Config::in_memory())
    }

    /// Define a map, or return the existing one with the same shape
    ///
    /// Redefining with a different kind, width, set kind or persistence
    /// fails with `MapRedefined`. Asking for a different index kind rebuilds
    /// the index; asking for none keeps the current one.
    pub fn define_map(&mut self, name: &str, options: MapOptions) -> Result<&mut Map> {
        validate_name(name)?;
        let persistent = options.persistent.unwrap_or(self.config.persistent);

        if !self.maps.contains_key(name) {
            let map = match self.load_map(name) {
                Ok(map) => map,
                Err(DenseError::MapNotFound(_)) => {
                    let dir = if persistent {
                        Some(MapDir::create(&self.config.data_dir.join(name))?)
                    } else {
                        None
                    };
                    Map::create(name, &options, &self.settings, dir)?
                }
                Err(e) => return Err(e),
            };
            self.maps.insert(name.to_string(), map);
        }

        let map = self
            .maps
            .get_mut(name)
            .ok_or_else(|| DenseError::MapNotFound(name.to_string()))?;

        if let Some(reason) = map.meta().conflicts_with(&options) {
            return Err(DenseError::MapRedefined {
                name: name.to_string(),
                reason,
            });
        }
        let stored = map.core().dir().is_some();
        if stored != persistent {
            return Err(DenseError::MapRedefined {
                name: name.to_string(),
                reason: format!("persistence is {}, not {}", stored, persistent),
            });
        }
        if let Some(kind) = options.index {
            if map.index_kind() != Some(kind) {
                map.add_index(kind)?;
            }
        }
        Ok(map)
    }

    /// Look a map up by name, loading it from disk on first access
    pub fn map(&mut self, name: &str) -> Result<&mut Map> {
        if !self.maps.contains_key(name) {
            let map = self.load_map(name)?;
            self.maps.insert(name.to_string(), map);
        }
        self.maps
            .get_mut(name)
            .ok_or_else(|| DenseError::MapNotFound(name.to_string()))
    }

    pub fn fixed_map(&mut self, name: &str) -> Result<&mut FixedNodeMap> {
        match self.map(name)? {
            Map::Fixed(map) => Ok(map),
            other => Err(wrong_kind(name, "fixed", other)),
        }
    }

    pub fn list_map(&mut self, name: &str) -> Result<&mut ListMap> {
        match self.map(name)? {
            Map::List(map) => Ok(map),
            other => Err(wrong_kind(name, "list", other)),
        }
    }

    pub fn set_map(&mut self, name: &str) -> Result<&mut SetMap> {
        match self.map(name)? {
            Map::Set(map) => Ok(map),
            other => Err(wrong_kind(name, "set", other)),
        }
    }

    /// Whether a map is loaded or stored under this name
    pub fn contains_map(&self, name: &str) -> bool {
        self.maps.contains_key(name) || self.stored_dir(name).is_some()
    }

    /// Names of loaded and stored maps, ascending
    pub fn map_names(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.maps.keys().cloned().collect();

        if self.config.persistent && self.config.data_dir.is_dir() {
            for entry in fs::read_dir(&self.config.data_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    if MapDir::at(&entry.path()).exists() {
                        names.insert(name.to_string());
                    }
                }
            }
        }

        Ok(names.into_iter().collect())
    }

    /// Delete a map and all of its files; false if there was none
    pub fn drop_map(&mut self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let loaded = self.maps.remove(name);
        let stored = self.stored_dir(name);
        if loaded.is_none() && stored.is_none() {
            return Ok(false);
        }

        drop(loaded);
        if let Some(dir) = stored {
            dir.remove()?;
        }
        tracing::info!(map = name, "dropped map");
        Ok(true)
    }

    /// Flush every loaded map
    pub fn flush(&mut self) -> Result<()> {
        for map in self.maps.values_mut() {
            map.flush()?;
        }
        Ok(())
    }

    /// Commit every loaded map
    pub fn commit(&mut self) -> Result<()> {
        for map in self.maps.values_mut() {
            map.commit()?;
        }
        Ok(())
    }

    /// Close the database gracefully
    ///
    /// Commits every map and persists their free-slot pools
    pub fn close(mut self) -> Result<()> {
        for (name, map) in self.maps.iter_mut() {
            map.close()?;
            tracing::debug!(map = %name, "closed map");
        }
        tracing::info!(maps = self.maps.len(), "closed database");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    /// Number of maps loaded in this session
    pub fn loaded_maps(&self) -> usize {
        self.maps.len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn stored_dir(&self, name: &str) -> Option<MapDir> {
        if !self.config.persistent {
            return None;
        }
        let dir = MapDir::at(&self.config.data_dir.join(name));
        dir.exists().then_some(dir)
    }

    fn load_map(&self, name: &str) -> Result<Map> {
        validate_name(name)?;
        match self.stored_dir(name) {
            Some(dir) => Map::open(name, &self.settings, dir),
            None => Err(DenseError::MapNotFound(name.to_string())),
        }
    }
}

/// Map names become directory names
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(DenseError::InvalidMapName(name.to_string()));
    }
    Ok(())
}

fn wrong_kind(name: &str, expected: &'static str, found: &Map) -> DenseError {
    DenseError::WrongMapKind {
        name: name.to_string(),
        expected,
        found: found.kind().name(),
    }
}
