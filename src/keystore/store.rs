//! Key Store
//!
//! Sparse, paged mapping from keys to fixed-size nodes.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;

use crate::error::{DenseError, Result};
use crate::storage::{MapDir, WordBuffer};

use super::KeyWindow;

/// Position of one key's node: owning window id + first word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef {
    window: u64,
    base: usize,
}

impl NodeRef {
    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn base(&self) -> usize {
        self.base
    }
}

/// Windows of one map, ordered by id
///
/// Windows are created on first write. A window holds `span` consecutive
/// keys; key `k` lives in window `k / span` at word `1 + (k % span) * node_size`.
#[derive(Debug)]
pub struct KeyStore {
    node_size: usize,
    span: u64,
    windows: BTreeMap<u64, KeyWindow>,
    dir: Option<MapDir>,
}

impl KeyStore {
    /// Heap-backed store
    pub fn in_memory(node_size: usize, span: u64) -> Self {
        Self {
            node_size: node_size.max(1),
            span: span.max(1),
            windows: BTreeMap::new(),
            dir: None,
        }
    }

    /// File-backed store; maps every window file already present
    pub fn open(node_size: usize, span: u64, dir: Option<MapDir>) -> Result<Self> {
        let mut store = Self::in_memory(node_size, span);
        let Some(dir) = dir else {
            return Ok(store);
        };

        let expected = store.window_words();
        for id in dir.window_ids()? {
            let buffer = WordBuffer::open(&dir.window_path(id))?;
            if buffer.len() != expected {
                return Err(DenseError::Corruption(format!(
                    "window {} holds {} words, expected {}",
                    id,
                    buffer.len(),
                    expected
                )));
            }
            store.windows.insert(id, KeyWindow::new(id, buffer));
        }

        tracing::debug!(
            root = %dir.root().display(),
            windows = store.windows.len(),
            "opened key store"
        );
        store.dir = Some(dir);
        Ok(store)
    }

    /// Words per node, including the active word
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Keys per window
    pub fn span(&self) -> u64 {
        self.span
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Total number of active keys
    pub fn key_count(&self) -> u64 {
        self.windows.values().map(KeyWindow::active_count).sum()
    }

    /// Window id and node base of a key
    pub fn locate(&self, key: u64) -> (u64, usize) {
        let id = key / self.span;
        let slot = (key % self.span) as usize;
        (id, 1 + slot * self.node_size)
    }

    /// Resolve the node of `key`, creating its window when asked to
    pub fn node_at(&mut self, key: u64, create: bool) -> Result<Option<NodeRef>> {
        if create {
            return self.ensure_node(key).map(Some);
        }
        Ok(self.find(key))
    }

    /// Resolve the node of `key`, creating its window on first use
    pub fn ensure_node(&mut self, key: u64) -> Result<NodeRef> {
        let (window, base) = self.locate(key);
        if !self.windows.contains_key(&window) {
            let created = self.create_window(window)?;
            self.windows.insert(window, created);
        }
        Ok(NodeRef { window, base })
    }

    /// Resolve the node of `key` without creating anything
    pub fn find(&self, key: u64) -> Option<NodeRef> {
        let (window, base) = self.locate(key);
        self.windows
            .contains_key(&window)
            .then_some(NodeRef { window, base })
    }

    /// Resolve the node of an active key
    pub fn find_active(&self, key: u64) -> Option<NodeRef> {
        self.find(key).filter(|node| self.is_active(*node))
    }

    pub fn contains(&self, key: u64) -> bool {
        self.find_active(key).is_some()
    }

    pub fn is_active(&self, node: NodeRef) -> bool {
        self.windows
            .get(&node.window)
            .is_some_and(|w| w.is_active(node.base))
    }

    /// Toggle a node's active bit; false for idempotent no-ops
    pub fn set_active(&mut self, node: NodeRef, active: bool) -> bool {
        match self.windows.get_mut(&node.window) {
            Some(window) => window.set_active(node.base, active),
            None => false,
        }
    }

    /// Read word `offset` of a node (offset 0 is the active word)
    pub fn word(&self, node: NodeRef, offset: usize) -> i64 {
        debug_assert!(offset < self.node_size);
        self.windows
            .get(&node.window)
            .map_or(0, |w| w.word(node.base + offset))
    }

    pub fn set_word(&mut self, node: NodeRef, offset: usize, value: i64) {
        debug_assert!(offset < self.node_size);
        if let Some(window) = self.windows.get_mut(&node.window) {
            window.set_word(node.base + offset, value);
        }
    }

    /// Payload words of a node (everything after the active word)
    pub fn payload(&self, node: NodeRef) -> Vec<i64> {
        (1..self.node_size).map(|i| self.word(node, i)).collect()
    }

    /// The first window with an id greater than `after` (or the first window)
    pub fn window_after(&self, after: Option<u64>) -> Option<&KeyWindow> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        self.windows
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(_, w)| w)
    }

    /// Active keys in `lo..=hi`, ascending
    pub fn keys(&self, lo: u64, hi: u64) -> KeyIter<'_> {
        let first = lo / self.span;
        KeyIter {
            windows: self.windows.range(first..),
            current: None,
            lo,
            hi,
            span: self.span,
            node_size: self.node_size,
            done: lo > hi,
        }
    }

    /// Largest active key, found by scanning the last populated window
    pub fn largest_key(&self) -> Option<u64> {
        for (id, window) in self.windows.iter().rev() {
            if window.active_count() == 0 {
                continue;
            }
            for slot in (0..self.span).rev() {
                if window.is_active(1 + slot as usize * self.node_size) {
                    return Some(id * self.span + slot);
                }
            }
        }
        None
    }

    /// Write cached window counters back into word 0
    pub fn write_counts(&mut self) {
        for window in self.windows.values_mut() {
            window.write_count();
        }
    }

    /// Write window counters back and flush mapped windows
    pub fn sync(&mut self) -> Result<()> {
        for window in self.windows.values_mut() {
            window.sync()?;
        }
        Ok(())
    }

    /// Drop every window (and its file)
    pub fn clear(&mut self) -> Result<()> {
        let windows = std::mem::take(&mut self.windows);
        for window in windows.into_values() {
            let path = window.path().map(|p| p.to_path_buf());
            drop(window);
            if let Some(path) = path {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn window_words(&self) -> usize {
        self.span as usize * self.node_size + 1
    }

    fn create_window(&self, id: u64) -> Result<KeyWindow> {
        let words = self.window_words();
        let buffer = match &self.dir {
            Some(dir) => WordBuffer::create(&dir.window_path(id), words)?,
            None => WordBuffer::heap(words),
        };
        tracing::debug!(window = id, words, "created key window");
        Ok(KeyWindow::new(id, buffer))
    }
}

/// Scan position inside one window
struct WindowCursor<'a> {
    window: &'a KeyWindow,
    slot: u64,
    end: u64,
    /// Active nodes of the window not yet seen
    remaining: u64,
}

/// Ascending iterator over the active keys of a range
///
/// Empty windows are skipped using their cached counter, and a window is
/// abandoned as soon as all of its active nodes have been produced.
pub struct KeyIter<'a> {
    windows: btree_map::Range<'a, u64, KeyWindow>,
    current: Option<WindowCursor<'a>>,
    lo: u64,
    hi: u64,
    span: u64,
    node_size: usize,
    done: bool,
}

impl<'a> Iterator for KeyIter<'a> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.done {
            return None;
        }

        loop {
            if let Some(cursor) = self.current.as_mut() {
                while cursor.remaining > 0 && cursor.slot < cursor.end {
                    let slot = cursor.slot;
                    cursor.slot += 1;
                    if cursor.window.is_active(1 + slot as usize * self.node_size) {
                        cursor.remaining -= 1;
                        return Some(cursor.window.id() * self.span + slot);
                    }
                }
                self.current = None;
            }

            let Some((&id, window)) = self.windows.next() else {
                self.done = true;
                return None;
            };
            if id > self.hi / self.span {
                self.done = true;
                return None;
            }

            let remaining = window.active_count();
            if remaining == 0 {
                continue;
            }

            let start = if id == self.lo / self.span {
                self.lo % self.span
            } else {
                0
            };
            let end = if id == self.hi / self.span {
                self.hi % self.span + 1
            } else {
                self.span
            };

            self.current = Some(WindowCursor {
                window,
                slot: start,
                end,
                remaining,
            });
        }
    }
}
