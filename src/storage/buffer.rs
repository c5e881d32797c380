//! Word Buffers
//!
//! Flat arrays of 64-bit words backing key windows and value buffers.
//! A buffer lives either on the heap (in-memory maps) or in a memory-mapped
//! file (persistent maps). Words are stored little-endian on disk.

use std::fs::OpenOptions;
use std::ops::Range;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{DenseError, Result};

/// Bytes per stored word
pub const WORD_BYTES: usize = 8;

/// A fixed-length array of words
pub enum WordBuffer {
    /// Volatile buffer of an in-memory map
    Heap(Vec<i64>),

    /// Read/write mapping of a window or value file
    Mapped { map: MmapMut, path: PathBuf },
}

impl std::fmt::Debug for WordBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WordBuffer::Heap(words) => f.debug_tuple("Heap").field(&words.len()).finish(),
            WordBuffer::Mapped { map, path } => f
                .debug_struct("Mapped")
                .field("path", path)
                .field("words", &(map.len() / WORD_BYTES))
                .finish(),
        }
    }
}

impl WordBuffer {
    /// Zero-filled heap buffer
    pub fn heap(words: usize) -> Self {
        WordBuffer::Heap(vec![0; words])
    }

    /// Create (or truncate) a zero-filled file of `words` words and map it
    pub fn create(path: &Path, words: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((words * WORD_BYTES) as u64)?;

        // Safety: the file was just created by us and is owned by this map
        // for as long as the mapping lives.
        let map = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(WordBuffer::Mapped {
            map,
            path: path.to_path_buf(),
        })
    }

    /// Map an existing word file
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len == 0 || len % WORD_BYTES as u64 != 0 {
            return Err(DenseError::Corruption(format!(
                "{} is {} bytes, not a whole number of words",
                path.display(),
                len
            )));
        }

        // Safety: map files are private to their owning map directory.
        let map = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(WordBuffer::Mapped {
            map,
            path: path.to_path_buf(),
        })
    }

    /// Length in words
    pub fn len(&self) -> usize {
        match self {
            WordBuffer::Heap(words) => words.len(),
            WordBuffer::Mapped { map, .. } => map.len() / WORD_BYTES,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            WordBuffer::Heap(_) => None,
            WordBuffer::Mapped { path, .. } => Some(path),
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> i64 {
        match self {
            WordBuffer::Heap(words) => words[index],
            WordBuffer::Mapped { map, .. } => {
                let start = index * WORD_BYTES;
                let mut bytes = [0u8; WORD_BYTES];
                bytes.copy_from_slice(&map[start..start + WORD_BYTES]);
                i64::from_le_bytes(bytes)
            }
        }
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: i64) {
        match self {
            WordBuffer::Heap(words) => words[index] = value,
            WordBuffer::Mapped { map, .. } => {
                let start = index * WORD_BYTES;
                map[start..start + WORD_BYTES].copy_from_slice(&value.to_le_bytes());
            }
        }
    }

    /// Set every word in `range` to `value`
    pub fn fill(&mut self, range: Range<usize>, value: i64) {
        match self {
            WordBuffer::Heap(words) => words[range].fill(value),
            WordBuffer::Mapped { .. } => {
                for index in range {
                    self.set(index, value);
                }
            }
        }
    }

    /// Copy words inside this buffer (overlapping ranges allowed)
    pub fn copy_within(&mut self, src: Range<usize>, dest: usize) {
        match self {
            WordBuffer::Heap(words) => words.copy_within(src, dest),
            WordBuffer::Mapped { map, .. } => map.copy_within(
                src.start * WORD_BYTES..src.end * WORD_BYTES,
                dest * WORD_BYTES,
            ),
        }
    }

    /// Copy `count` words starting at `start` into a vector
    pub fn read_range(&self, start: usize, count: usize) -> Vec<i64> {
        match self {
            WordBuffer::Heap(words) => words[start..start + count].to_vec(),
            WordBuffer::Mapped { .. } => (start..start + count).map(|i| self.get(i)).collect(),
        }
    }

    /// Write `values` starting at `start`
    pub fn write_range(&mut self, start: usize, values: &[i64]) {
        match self {
            WordBuffer::Heap(words) => words[start..start + values.len()].copy_from_slice(values),
            WordBuffer::Mapped { .. } => {
                for (offset, value) in values.iter().enumerate() {
                    self.set(start + offset, *value);
                }
            }
        }
    }

    /// Push dirty pages of a mapped buffer to its file
    pub fn flush(&self) -> Result<()> {
        if let WordBuffer::Mapped { map, .. } = self {
            map.flush()?;
        }
        Ok(())
    }
}
