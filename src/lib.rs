//! # densekv
//!
//! An embedded key-value engine addressed by dense, non-negative integer
//! keys, with:
//! - Paged key windows, memory-mapped in persistent mode
//! - Variable-length value slots with size-classed reuse
//! - Fixed-node, list and batched set maps
//! - Sign-partitioned secondary indexes for range and set queries
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                              │
//! │                (name → map registry)                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!        ┌──────────────┼──────────────┐
//!        ▼              ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌───────────┐     ┌───────────┐
//!  │   Fixed   │  │   List    │◄─│    Set    │     │ Secondary │
//!  │ Node Map  │  │    Map    │  │ (deltas)  │     │   Index   │
//!  └─────┬─────┘  └─────┬─────┘  └───────────┘     └─────┬─────┘
//!        │              │                                │
//!        ▼              ▼                      (fixed / set maps
//!  ┌───────────┐  ┌───────────┐                 per value sign)
//!  │ Key Store │  │   Slot    │
//!  │ (windows) │  │ Allocator │
//!  └───────────┘  └───────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod constants;
pub mod props;

pub mod storage;
pub mod keystore;
pub mod alloc;
pub mod map;
pub mod index;
pub mod query;
pub mod database;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DenseError, Result};
pub use config::Config;
pub use constants::{MAX_VALUE, MIN_VALUE, NULL};
pub use database::Database;
pub use index::IndexKind;
pub use map::{
    FixedNodeMap, KeyMap, KeyReserver, ListMap, Map, MapKind, MapOptions, MapStats, SetKind,
    SetMap,
};
pub use query::KeySeq;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of densekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
