//! Set Delta Cache
//!
//! Write-back buffer of pending set mutations, direct-mapped by
//! `key % capacity` with a bounded chain of keys per bucket.
//!
//! ## Spill Rules
//! A key's deltas are handed back for merging when:
//! - the key holds `depth` distinct deltas
//! - its bucket already chains `chain` other keys (the oldest is spilled)
//! - the cache holds `capacity` keys (everything is spilled)

use std::collections::HashSet;

/// Pending change to one set member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOp {
    /// Replace the attribute
    Assign(i64),
    /// Multiset count becomes `max(count + delta, floor)`, absent counting as 0
    Add { delta: i64, floor: i64 },
    /// Drop the member
    Delete,
}

impl DeltaOp {
    /// A single count change
    pub fn add(delta: i64) -> DeltaOp {
        DeltaOp::Add { delta, floor: 0 }
    }

    /// Fold a later operation into this one
    ///
    /// Applying the folded op equals applying both in turn, including the
    /// drop of a member whose count falls to zero in between.
    pub fn then(self, later: DeltaOp) -> DeltaOp {
        match (self, later) {
            (_, DeltaOp::Delete) => DeltaOp::Delete,
            (_, DeltaOp::Assign(x)) => DeltaOp::Assign(x),
            (DeltaOp::Assign(x), DeltaOp::Add { delta, floor }) => {
                DeltaOp::Assign(x.max(0).saturating_add(delta).max(floor))
            }
            (DeltaOp::Add { delta: a, floor: f }, DeltaOp::Add { delta: b, floor: g }) => {
                DeltaOp::Add {
                    delta: a.saturating_add(b),
                    floor: f.saturating_add(b).max(g),
                }
            }
            (DeltaOp::Delete, DeltaOp::Add { delta, floor }) => DeltaOp::Assign(delta.max(floor)),
        }
    }

    /// Count after applying this op to `count`
    pub fn count(self, count: i64) -> i64 {
        match self {
            DeltaOp::Assign(x) => x.max(0),
            DeltaOp::Add { delta, floor } => count.max(0).saturating_add(delta).max(floor),
            DeltaOp::Delete => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    pub value: i64,
    pub op: DeltaOp,
}

impl Delta {
    pub fn new(value: i64, op: DeltaOp) -> Self {
        Self { value, op }
    }
}

/// Deltas of one key, sorted by value with one entry per value
#[derive(Debug)]
struct Pending {
    key: u64,
    deltas: Vec<Delta>,
}

impl Pending {
    fn record(&mut self, delta: Delta) {
        match self.deltas.binary_search_by_key(&delta.value, |d| d.value) {
            Ok(pos) => {
                let current = &mut self.deltas[pos];
                current.op = current.op.then(delta.op);
            }
            Err(pos) => self.deltas.insert(pos, delta),
        }
    }
}

/// Deltas handed back for merging
pub type Spill = (u64, Vec<Delta>);

#[derive(Debug)]
pub struct SetCache {
    buckets: Vec<Vec<Pending>>,
    capacity: usize,
    depth: usize,
    chain: usize,
    len: usize,
}

impl SetCache {
    pub fn new(capacity: usize, depth: usize, chain: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buckets: (0..capacity).map(|_| Vec::new()).collect(),
            capacity,
            depth: depth.max(1),
            chain: chain.max(1),
            len: 0,
        }
    }

    /// Number of keys with pending deltas
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer one delta, returning whatever must be merged now
    pub fn record(&mut self, key: u64, delta: Delta) -> Vec<Spill> {
        let mut spills = Vec::new();
        let bucket = self.bucket_of(key);

        if let Some(pos) = self.buckets[bucket].iter().position(|p| p.key == key) {
            let pending = &mut self.buckets[bucket][pos];
            pending.record(delta);
            if pending.deltas.len() >= self.depth {
                let full = self.buckets[bucket].remove(pos);
                self.len -= 1;
                spills.push((full.key, full.deltas));
            }
            return spills;
        }

        if self.len >= self.capacity {
            tracing::debug!(keys = self.len, "set cache full, spilling");
            spills.extend(self.drain());
        } else if self.buckets[bucket].len() >= self.chain {
            let oldest = self.buckets[bucket].remove(0);
            self.len -= 1;
            spills.push((oldest.key, oldest.deltas));
        }

        let mut pending = Pending {
            key,
            deltas: Vec::new(),
        };
        pending.record(delta);
        if self.depth <= 1 {
            spills.push((pending.key, pending.deltas));
        } else {
            self.buckets[bucket].push(pending);
            self.len += 1;
        }
        spills
    }

    /// Remove and return the deltas of `key`
    pub fn take(&mut self, key: u64) -> Option<Vec<Delta>> {
        let bucket = self.bucket_of(key);
        let pos = self.buckets[bucket].iter().position(|p| p.key == key)?;
        self.len -= 1;
        Some(self.buckets[bucket].remove(pos).deltas)
    }

    /// Pending deltas of `key`, sorted by value
    pub fn pending(&self, key: u64) -> Option<&[Delta]> {
        self.buckets[self.bucket_of(key)]
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.deltas.as_slice())
    }

    pub fn contains(&self, key: u64) -> bool {
        self.pending(key).is_some()
    }

    /// Keys with pending deltas
    pub fn keys(&self) -> HashSet<u64> {
        self.buckets.iter().flatten().map(|p| p.key).collect()
    }

    /// Remove and return everything, ordered by key
    pub fn drain(&mut self) -> Vec<Spill> {
        let mut all: Vec<Spill> = self
            .buckets
            .iter_mut()
            .flat_map(|b| b.drain(..))
            .map(|p| (p.key, p.deltas))
            .collect();
        all.sort_unstable_by_key(|(key, _)| *key);
        self.len = 0;
        all
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
    }

    fn bucket_of(&self, key: u64) -> usize {
        (key % self.capacity as u64) as usize
    }
}

