//! Secondary Index
//!
//! Value → key mapping kept beside a host map.
//!
//! ## Partitions
//! ```text
//! value >= 0  ->  positive partition, keyed by value
//! value <  0  ->  negative partition, keyed by -value (created on first use)
//! ```
//! One-to-* indexes store the owner key in a single-value fixed map;
//! many-to-* indexes store owner keys as members of a set map (a multiset
//! for many-to-multimany, whose attribute counts occurrences).

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{is_reserved, NULL};
use crate::error::{DenseError, Result};
use crate::map::{FixedNodeMap, KeyMap, MapMeta, MapOptions, MapSettings, SetKind, SetMap};
use crate::query::{value_range, KeySeq};
use crate::storage::MapDir;

use super::IndexKind;

/// Which partitions exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Positive,
    PositiveAndNegative,
}

/// Lazy sequence of `(owner key, occurrences)` pairs
pub type CountSeq<'a> = Box<dyn Iterator<Item = (i64, i64)> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    Positive,
    Negative,
}

impl Sign {
    fn dir_name(self) -> &'static str {
        match self {
            Sign::Positive => "positive",
            Sign::Negative => "negative",
        }
    }

    /// Partition and partition key of a value
    fn split(value: i64) -> (Sign, i64) {
        if value >= 0 {
            (Sign::Positive, value)
        } else {
            (Sign::Negative, -value)
        }
    }
}

/// One half of an index
#[derive(Debug)]
enum Partition {
    Unique(FixedNodeMap),
    Keys(SetMap),
}

impl Partition {
    fn open(kind: IndexKind, name: &str, settings: &MapSettings, root: Option<&Path>) -> Result<Self> {
        let options = if kind.is_unique() {
            MapOptions::single()
        } else {
            MapOptions::set(kind.set_kind())
        };
        let dir = root.map(MapDir::create).transpose()?;

        let meta = match &dir {
            Some(d) if d.exists() => {
                let meta = MapMeta::load(&d.meta_path())?;
                if let Some(reason) = meta.conflicts_with(&options) {
                    return Err(DenseError::Corruption(format!(
                        "index partition '{}' {}",
                        name, reason
                    )));
                }
                meta
            }
            _ => MapMeta::new(&options, settings.window_keys(options.kind)),
        };

        let partition = if kind.is_unique() {
            Partition::Unique(FixedNodeMap::open(name, meta, settings, dir)?)
        } else {
            Partition::Keys(SetMap::open(name, meta, settings, dir)?)
        };
        partition.save_meta()?;
        Ok(partition)
    }

    fn save_meta(&self) -> Result<()> {
        match self {
            Partition::Unique(m) => m.core().save_meta(),
            Partition::Keys(m) => m.core().save_meta(),
        }
    }

    fn map_mut(&mut self) -> &mut dyn KeyMap {
        match self {
            Partition::Unique(m) => m,
            Partition::Keys(m) => m,
        }
    }

    fn insert(&mut self, slot: i64, owner: i64) -> Result<()> {
        match self {
            Partition::Unique(map) => map.set(slot, owner).map(|_| ()),
            Partition::Keys(set) => set.add(slot, owner),
        }
    }

    fn retract(&mut self, slot: i64, owner: i64) -> Result<()> {
        match self {
            Partition::Unique(map) => {
                if map.value(slot) == owner {
                    map.remove(slot)?;
                }
                Ok(())
            }
            Partition::Keys(set) => match set.set_kind() {
                SetKind::Multi => set.add_count(slot, owner, -1),
                _ => set.remove_value(slot, owner),
            },
        }
    }

    /// Merge pending set deltas so reads see every write
    fn prepare(&mut self) -> Result<()> {
        if let Partition::Keys(set) = self {
            set.merge_all()?;
        }
        Ok(())
    }

    /// Owner keys stored under partition keys `lo..=hi`
    fn owners(&self, lo: u64, hi: u64) -> Box<dyn Iterator<Item = i64> + '_> {
        match self {
            Partition::Unique(map) => Box::new(
                map.stored_keys(lo, hi)
                    .map(move |k| map.stored_value(k, 0))
                    .filter(|owner| *owner != NULL),
            ),
            Partition::Keys(set) => Box::new(
                set.stored_keys(lo, hi)
                    .flat_map(move |k| set.stored_entries(k).map(|(owner, _)| owner)),
            ),
        }
    }

    fn counts(&self, lo: u64, hi: u64) -> CountSeq<'_> {
        match self {
            Partition::Unique(map) => Box::new(
                map.stored_keys(lo, hi)
                    .map(move |k| (map.stored_value(k, 0), 1))
                    .filter(|(owner, _)| *owner != NULL),
            ),
            Partition::Keys(set) => Box::new(
                set.stored_keys(lo, hi)
                    .flat_map(move |k| set.stored_entries(k)),
            ),
        }
    }
}

/// Secondary index over the values of one host map
#[derive(Debug)]
pub struct SecondaryIndex {
    kind: IndexKind,
    name: String,
    settings: MapSettings,
    root: Option<PathBuf>,
    positive: Option<Partition>,
    negative: Option<Partition>,
}

impl SecondaryIndex {
    /// Directory of the index inside its host map
    pub const DIR: &'static str = "index";

    /// Open the partitions already present under `root`
    pub fn open(
        kind: IndexKind,
        host: &str,
        settings: &MapSettings,
        root: Option<PathBuf>,
    ) -> Result<Self> {
        let mut index = Self {
            kind,
            name: format!("{}.{}", host, Self::DIR),
            settings: *settings,
            root,
            positive: None,
            negative: None,
        };

        for sign in [Sign::Positive, Sign::Negative] {
            let present = index
                .partition_root(sign)
                .is_some_and(|dir| MapDir::at(&dir).exists());
            if present {
                let partition = index.open_partition(sign)?;
                *index.slot_mut(sign) = Some(partition);
            }
        }

        tracing::debug!(index = %index.name, kind = kind.name(), state = ?index.state(), "opened index");
        Ok(index)
    }

    /// Start an empty index, discarding anything stored under `root`
    pub fn create(
        kind: IndexKind,
        host: &str,
        settings: &MapSettings,
        root: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(root) = &root {
            if root.exists() {
                fs::remove_dir_all(root)?;
            }
        }
        Self::open(kind, host, settings, root)
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn state(&self) -> IndexState {
        match (&self.positive, &self.negative) {
            (None, None) => IndexState::Uninitialized,
            (_, None) => IndexState::Positive,
            (_, Some(_)) => IndexState::PositiveAndNegative,
        }
    }

    /// Move `key` from `old` to `new`; NULL on either side means none
    pub fn index(&mut self, key: i64, old: i64, new: i64) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if old != NULL {
            let (sign, slot) = Sign::split(old);
            if let Some(partition) = self.slot_mut(sign).as_mut() {
                partition.retract(slot, key)?;
            }
        }
        if new != NULL {
            let (sign, slot) = Sign::split(new);
            self.partition(sign)?.insert(slot, key)?;
        }
        Ok(())
    }

    /// Like `index`, for a host key that may still hold `old` elsewhere
    ///
    /// Only many-to-multimany indexes count occurrences; the others keep the
    /// key under `old` while any copy of it remains.
    pub fn replace(&mut self, key: i64, old: i64, new: i64, old_retained: bool) -> Result<()> {
        if old_retained && self.kind != IndexKind::ManyToMultiMany {
            return self.index(key, NULL, new);
        }
        self.index(key, old, new)
    }

    /// Owner keys of every value in `lo..=hi`
    ///
    /// A range straddling zero yields the negative branch first, ordered by
    /// absolute value, then the positive branch.
    pub fn keys_for_range(&mut self, lo: i64, hi: i64) -> Result<KeySeq<'_>> {
        let Some((lo, hi)) = value_range(lo, hi) else {
            return Ok(KeySeq::empty());
        };
        self.prepare()?;

        let negative = match (&self.negative, lo < 0) {
            (Some(p), true) => Some(p.owners(hi.min(-1).unsigned_abs(), lo.unsigned_abs())),
            _ => None,
        };
        let positive = match (&self.positive, hi >= 0) {
            (Some(p), true) => Some(p.owners(lo.max(0) as u64, hi as u64)),
            _ => None,
        };
        Ok(KeySeq::new(
            negative.into_iter().flatten().chain(positive.into_iter().flatten()),
        ))
    }

    /// Owner keys of each of `values`, in input order
    pub fn keys_for_set(&mut self, values: &[i64]) -> Result<KeySeq<'_>> {
        self.prepare()?;
        let values: Vec<i64> = values
            .iter()
            .copied()
            .filter(|v| *v != NULL && !is_reserved(*v))
            .collect();

        let this = &*self;
        Ok(KeySeq::new(values.into_iter().flat_map(move |value| {
            let (sign, slot) = Sign::split(value);
            let slot = slot as u64;
            this.slot_ref(sign)
                .map(|p| p.owners(slot, slot))
                .into_iter()
                .flatten()
        })))
    }

    /// `(owner key, occurrences)` for every value in `lo..=hi`
    pub fn counts_for_range(&mut self, lo: i64, hi: i64) -> Result<CountSeq<'_>> {
        if self.kind != IndexKind::ManyToMultiMany {
            return Err(DenseError::Unsupported(format!(
                "occurrence counts on {} index '{}'",
                self.kind, self.name
            )));
        }
        let Some((lo, hi)) = value_range(lo, hi) else {
            return Ok(Box::new(std::iter::empty()));
        };
        self.prepare()?;

        let negative = match (&self.negative, lo < 0) {
            (Some(p), true) => Some(p.counts(hi.min(-1).unsigned_abs(), lo.unsigned_abs())),
            _ => None,
        };
        let positive = match (&self.positive, hi >= 0) {
            (Some(p), true) => Some(p.counts(lo.max(0) as u64, hi as u64)),
            _ => None,
        };
        Ok(Box::new(
            negative.into_iter().flatten().chain(positive.into_iter().flatten()),
        ))
    }

    /// Bring every partition up to date for reading
    pub fn prepare(&mut self) -> Result<()> {
        for partition in self.partitions_mut() {
            partition.prepare()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        for partition in self.partitions_mut() {
            partition.map_mut().flush()?;
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        for partition in self.partitions_mut() {
            partition.map_mut().commit()?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        for partition in self.partitions_mut() {
            partition.map_mut().clear()?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        for partition in self.partitions_mut() {
            partition.map_mut().close()?;
        }
        Ok(())
    }

    /// Drop both partitions and delete their files
    pub fn destroy(&mut self) -> Result<()> {
        self.positive = None;
        self.negative = None;
        if let Some(root) = &self.root {
            if root.exists() {
                fs::remove_dir_all(root)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn partition_root(&self, sign: Sign) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(sign.dir_name()))
    }

    fn open_partition(&self, sign: Sign) -> Result<Partition> {
        let name = format!("{}.{}", self.name, sign.dir_name());
        let root = self.partition_root(sign);
        Partition::open(self.kind, &name, &self.settings, root.as_deref())
    }

    fn slot_ref(&self, sign: Sign) -> Option<&Partition> {
        match sign {
            Sign::Positive => self.positive.as_ref(),
            Sign::Negative => self.negative.as_ref(),
        }
    }

    fn slot_mut(&mut self, sign: Sign) -> &mut Option<Partition> {
        match sign {
            Sign::Positive => &mut self.positive,
            Sign::Negative => &mut self.negative,
        }
    }

    /// Partition for `sign`, created on first use
    fn partition(&mut self, sign: Sign) -> Result<&mut Partition> {
        if self.slot_ref(sign).is_none() {
            let partition = self.open_partition(sign)?;
            tracing::debug!(index = %self.name, partition = sign.dir_name(), "created index partition");
            *self.slot_mut(sign) = Some(partition);
        }
        match self.slot_mut(sign) {
            Some(partition) => Ok(partition),
            None => Err(DenseError::Corruption("index partition missing".to_string())),
        }
    }

    fn partitions_mut(&mut self) -> impl Iterator<Item = &mut Partition> {
        self.positive.iter_mut().chain(self.negative.iter_mut())
    }
}
