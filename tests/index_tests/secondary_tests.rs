//! Tests for SecondaryIndex
//!
//! These tests verify:
//! - Values are split into positive and negative partitions by sign
//! - Range queries covering both signs yield the negative branch first
//! - One-to-* indexes keep a single owner per value
//! - Occurrence counts of many-to-multimany indexes
//! - Index state transitions and persistence next to the host map

use densekv::config::Config;
use densekv::index::{IndexState, SecondaryIndex};
use densekv::map::MapSettings;
use densekv::{Database, DenseError, IndexKind, KeyMap, MapOptions, NULL};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn settings() -> MapSettings {
    MapSettings::from_config(
        &Config::builder()
            .fixed_window_keys(16)
            .set_window_keys(16)
            .initial_buffer_words(256)
            .build(),
    )
}

fn index(kind: IndexKind) -> SecondaryIndex {
    SecondaryIndex::open(kind, "host", &settings(), None).unwrap()
}

// =============================================================================
// Partition Tests
// =============================================================================

#[test]
fn test_empty_index_is_uninitialized() {
    let mut ix = index(IndexKind::ManyToMany);
    assert_eq!(ix.state(), IndexState::Uninitialized);
    assert_eq!(ix.keys_for_range(i64::MIN, i64::MAX).unwrap().count(), 0);
}

#[test]
fn test_positive_value_creates_one_partition() {
    let mut ix = index(IndexKind::ManyToMany);
    ix.index(1, NULL, 7).unwrap();
    assert_eq!(ix.state(), IndexState::Positive);

    ix.index(2, NULL, -7).unwrap();
    assert_eq!(ix.state(), IndexState::PositiveAndNegative);
}

#[test]
fn test_negative_value_found_by_range() {
    let mut ix = index(IndexKind::ManyToMany);
    ix.index(3, NULL, 5).unwrap();
    ix.index(1, NULL, -7).unwrap();

    assert_eq!(ix.keys_for_range(-10, -5).unwrap().sorted(), vec![1]);
    assert_eq!(ix.keys_for_range(-10, 10).unwrap().sorted(), vec![1, 3]);
    assert_eq!(ix.keys_for_range(-6, -1).unwrap().count(), 0);
    assert_eq!(ix.keys_for_range(0, 10).unwrap().sorted(), vec![3]);
}

#[test]
fn test_cross_zero_range_lists_negative_first() {
    let mut ix = index(IndexKind::ManyToMany);
    ix.index(10, NULL, 2).unwrap();
    ix.index(20, NULL, -1).unwrap();
    ix.index(30, NULL, -3).unwrap();

    let keys: Vec<i64> = ix.keys_for_range(-5, 5).unwrap().collect();
    assert_eq!(keys, vec![20, 30, 10]);
}

#[test]
fn test_empty_range_yields_nothing() {
    let mut ix = index(IndexKind::ManyToMany);
    ix.index(1, NULL, 4).unwrap();
    assert_eq!(ix.keys_for_range(5, 4).unwrap().count(), 0);
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_reindex_moves_key() {
    let mut ix = index(IndexKind::ManyToOne);
    ix.index(1, NULL, 100).unwrap();
    ix.index(1, 100, -100).unwrap();

    assert_eq!(ix.keys_for_range(100, 100).unwrap().count(), 0);
    assert_eq!(ix.keys_for_range(-100, -100).unwrap().sorted(), vec![1]);
}

#[test]
fn test_same_old_and_new_is_noop() {
    let mut ix = index(IndexKind::ManyToMultiMany);
    ix.index(1, NULL, 4).unwrap();
    ix.index(1, 4, 4).unwrap();

    let counts: Vec<(i64, i64)> = ix.counts_for_range(4, 4).unwrap().collect();
    assert_eq!(counts, vec![(1, 1)]);
}

#[test]
fn test_unique_index_keeps_latest_owner() {
    let mut ix = index(IndexKind::OneToOne);
    ix.index(1, NULL, 5).unwrap();
    ix.index(2, NULL, 5).unwrap();
    assert_eq!(ix.keys_for_range(5, 5).unwrap().sorted(), vec![2]);

    // retracting a stale owner leaves the current one alone
    ix.index(1, 5, NULL).unwrap();
    assert_eq!(ix.keys_for_range(5, 5).unwrap().sorted(), vec![2]);

    ix.index(2, 5, NULL).unwrap();
    assert_eq!(ix.keys_for_range(5, 5).unwrap().count(), 0);
}

#[test]
fn test_unique_index_owner_zero() {
    let mut ix = index(IndexKind::OneToMany);
    ix.index(0, NULL, 3).unwrap();
    ix.index(0, NULL, 4).unwrap();
    assert_eq!(ix.keys_for_range(0, 10).unwrap().collect::<Vec<_>>(), vec![0, 0]);
}

// =============================================================================
// Value Set Tests
// =============================================================================

#[test]
fn test_keys_for_set_follows_input_order() {
    let mut ix = index(IndexKind::ManyToMany);
    ix.index(1, NULL, 10).unwrap();
    ix.index(2, NULL, 30).unwrap();
    ix.index(3, NULL, -10).unwrap();

    let keys: Vec<i64> = ix.keys_for_set(&[30, NULL, -10, 10, 99]).unwrap().collect();
    assert_eq!(keys, vec![2, 3, 1]);
}

// =============================================================================
// Occurrence Count Tests
// =============================================================================

#[test]
fn test_counts_for_range() {
    let mut ix = index(IndexKind::ManyToMultiMany);
    ix.index(1, NULL, 4).unwrap();
    ix.index(1, NULL, 4).unwrap();
    ix.index(2, NULL, 4).unwrap();
    ix.index(2, NULL, -4).unwrap();

    let counts: Vec<(i64, i64)> = ix.counts_for_range(-4, 4).unwrap().collect();
    assert_eq!(counts, vec![(2, 1), (1, 2), (2, 1)]);

    ix.index(1, 4, NULL).unwrap();
    let counts: Vec<(i64, i64)> = ix.counts_for_range(4, 4).unwrap().collect();
    assert_eq!(counts, vec![(1, 1), (2, 1)]);
}

#[test]
fn test_counts_need_multimany() {
    let mut ix = index(IndexKind::ManyToMany);
    assert!(matches!(
        ix.counts_for_range(0, 1).err(),
        Some(DenseError::Unsupported(_))
    ));
}

#[test]
fn test_index_kind_names() {
    for kind in IndexKind::ALL {
        assert_eq!(IndexKind::from_name(kind.name()).unwrap(), kind);
    }
    assert!(IndexKind::from_name("many-to-few").is_err());
    assert!(IndexKind::ManyToOne.to_string().contains("many"));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_index_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .fixed_window_keys(16)
        .set_window_keys(16)
        .initial_buffer_words(256)
        .build();

    {
        let mut db = Database::open(config.clone()).unwrap();
        db.define_map("ages", MapOptions::single().with_index(IndexKind::ManyToOne))
            .unwrap();
        let ages = db.fixed_map("ages").unwrap();
        ages.set(1, 30).unwrap();
        ages.set(2, -30).unwrap();
        ages.set(3, 30).unwrap();
        db.close().unwrap();
    }

    let mut db = Database::open(config).unwrap();
    let ages = db.fixed_map("ages").unwrap();
    assert_eq!(ages.index_kind(), Some(IndexKind::ManyToOne));
    assert_eq!(ages.query(30, 30).unwrap().sorted(), vec![1, 3]);
    assert_eq!(ages.query(-30, -30).unwrap().sorted(), vec![2]);
}

#[test]
fn test_dropped_index_falls_back_to_scan() {
    let mut db = Database::in_memory().unwrap();
    db.define_map("m", MapOptions::single().with_index(IndexKind::OneToOne))
        .unwrap();
    let map = db.fixed_map("m").unwrap();
    map.set(4, 40).unwrap();

    map.drop_index().unwrap();
    assert_eq!(map.index_kind(), None);
    assert_eq!(map.query(40, 40).unwrap().sorted(), vec![4]);
}
