//! Query results
//!
//! Every key-producing query returns a `KeySeq`: a lazy, finite, one-pass
//! sequence. Order is whatever the producing path yields; callers that
//! need value order ask for it with `sorted()`.

use std::fmt;

use crate::constants::MIN_VALUE;

/// Lazy sequence of keys
pub struct KeySeq<'a> {
    inner: Box<dyn Iterator<Item = i64> + 'a>,
}

impl<'a> KeySeq<'a> {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = i64> + 'a,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Drain into an ascending vector
    pub fn sorted(self) -> Vec<i64> {
        let mut keys: Vec<i64> = self.collect();
        keys.sort_unstable();
        keys
    }

    /// Drain into an ascending vector without repeats
    pub fn sorted_unique(self) -> Vec<i64> {
        let mut keys = self.sorted();
        keys.dedup();
        keys
    }
}

impl Iterator for KeySeq<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        self.inner.next()
    }
}

impl fmt::Debug for KeySeq<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySeq { .. }")
    }
}

/// Clamp a value range to the usable values; None when it is empty
pub(crate) fn value_range(lo: i64, hi: i64) -> Option<(i64, i64)> {
    let lo = lo.max(MIN_VALUE);
    (lo <= hi).then_some((lo, hi))
}

/// Clamp a key range to the non-negative keys; None when it is empty
pub(crate) fn key_range(lo: i64, hi: i64) -> Option<(u64, u64)> {
    if hi < 0 {
        return None;
    }
    let lo = lo.max(0) as u64;
    let hi = hi as u64;
    (lo <= hi).then_some((lo, hi))
}
