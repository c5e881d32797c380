//! Map Directory
//!
//! On-disk layout of one persistent map.
//!
//! ## Responsibilities
//! - Create the window / value / released-slot subdirectories
//! - Discover existing window and buffer files on reopen
//! - Name files after their numeric ids

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Directory layout of a map
///
/// ```text
/// {root}/
///   ├── map.meta
///   ├── keys/window_{id}.dat
///   ├── values/buffer_{id}.dat
///   ├── released/slots.bin
///   └── index/{positive,negative}/   (same layout, per partition)
/// ```
#[derive(Debug, Clone)]
pub struct MapDir {
    root: PathBuf,
}

impl MapDir {
    const KEYS_DIR: &'static str = "keys";
    const VALUES_DIR: &'static str = "values";
    const RELEASED_DIR: &'static str = "released";
    const META_FILE: &'static str = "map.meta";
    const RELEASED_FILE: &'static str = "slots.bin";
    const WINDOW_PREFIX: &'static str = "window_";
    const BUFFER_PREFIX: &'static str = "buffer_";

    /// Open or create the directory tree rooted at `root`
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join(Self::KEYS_DIR))?;
        fs::create_dir_all(root.join(Self::VALUES_DIR))?;
        fs::create_dir_all(root.join(Self::RELEASED_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Handle to a layout without touching the filesystem
    pub fn at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a map has been defined here before
    pub fn exists(&self) -> bool {
        self.meta_path().is_file()
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(Self::META_FILE)
    }

    pub fn released_path(&self) -> PathBuf {
        self.root.join(Self::RELEASED_DIR).join(Self::RELEASED_FILE)
    }

    /// "keys/window_00000042.dat"
    pub fn window_path(&self, id: u64) -> PathBuf {
        self.root
            .join(Self::KEYS_DIR)
            .join(format!("{}{:08}.dat", Self::WINDOW_PREFIX, id))
    }

    /// "values/buffer_000007.dat"
    pub fn buffer_path(&self, id: u32) -> PathBuf {
        self.root
            .join(Self::VALUES_DIR)
            .join(format!("{}{:06}.dat", Self::BUFFER_PREFIX, id))
    }

    /// Layout of a nested map (index partitions)
    pub fn child(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Ids of all window files, ascending
    pub fn window_ids(&self) -> Result<Vec<u64>> {
        Self::scan_ids(&self.root.join(Self::KEYS_DIR), Self::WINDOW_PREFIX)
    }

    /// Ids of all value buffer files, ascending
    pub fn buffer_ids(&self) -> Result<Vec<u32>> {
        let ids = Self::scan_ids(&self.root.join(Self::VALUES_DIR), Self::BUFFER_PREFIX)?;
        Ok(ids.into_iter().filter_map(|id| u32::try_from(id).ok()).collect())
    }

    /// Delete the whole tree
    pub fn remove(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn scan_ids(dir: &Path, prefix: &str) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        if !dir.exists() {
            return Ok(ids);
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = Self::parse_id(&path, prefix) {
                    ids.push(id);
                }
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }

    /// "window_00000042.dat" → Some(42)
    fn parse_id(path: &Path, prefix: &str) -> Option<u64> {
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix(prefix)?;
        id_str.parse().ok()
    }
}
