//! Index Module
//!
//! Secondary indexes answering value-range and value-set queries.
//!
//! ## Responsibilities
//! - Keep a value → key mapping in step with every host write
//! - Split values by sign into a positive and a lazily created negative
//!   partition, both keyed by absolute value
//! - Rebuild from scratch when an index is added to a populated map

mod secondary;

pub use secondary::{IndexState, SecondaryIndex};

use std::fmt;

use crate::error::{DenseError, Result};
use crate::map::SetKind;

/// Cardinality of the value → key relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Each value belongs to at most one key
    OneToOne,
    /// A key holds many values, each value belongs to at most one key
    OneToMany,
    /// Many keys share one value
    ManyToOne,
    /// Many keys share many values
    ManyToMany,
    /// Like `ManyToMany`, counting how often each key holds a value
    ManyToMultiMany,
}

impl IndexKind {
    pub const ALL: [IndexKind; 5] = [
        IndexKind::OneToOne,
        IndexKind::OneToMany,
        IndexKind::ManyToOne,
        IndexKind::ManyToMany,
        IndexKind::ManyToMultiMany,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IndexKind::OneToOne => "one-to-one",
            IndexKind::OneToMany => "one-to-many",
            IndexKind::ManyToOne => "many-to-one",
            IndexKind::ManyToMany => "many-to-many",
            IndexKind::ManyToMultiMany => "many-to-multimany",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| DenseError::Config(format!("unknown index kind '{}'", name)))
    }

    /// Whether a value maps to a single owner key
    pub fn is_unique(self) -> bool {
        matches!(self, IndexKind::OneToOne | IndexKind::OneToMany)
    }

    /// Set kind of the partitions of a many-to-* index
    pub(crate) fn set_kind(self) -> SetKind {
        match self {
            IndexKind::ManyToMultiMany => SetKind::Multi,
            _ => SetKind::Plain,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
