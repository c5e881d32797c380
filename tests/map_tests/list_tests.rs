//! Tests for ListMap
//!
//! These tests verify:
//! - Appends in order across reallocations
//! - Sparse puts with NULL placeholders
//! - pop, shrink and slot release
//! - Slot reuse through the free-slot pool
//! - Scan and indexed queries over list values

use densekv::config::Config;
use densekv::constants::NULL;
use densekv::map::MapSettings;
use densekv::{DenseError, IndexKind, KeyMap, ListMap};

// =============================================================================
// Helper Functions
// =============================================================================

fn settings() -> MapSettings {
    MapSettings::from_config(
        &Config::builder()
            .list_window_keys(8)
            .initial_buffer_words(64)
            .max_buffer_words(1024)
            .list_minimum_slot(2)
            .build(),
    )
}

fn list() -> ListMap {
    ListMap::in_memory("list", &settings()).unwrap()
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_push_preserves_order_across_growth() {
    let mut map = list();
    let expected: Vec<i64> = (0..300).map(|i| i * 3 - 100).collect();

    for (i, value) in expected.iter().enumerate() {
        assert_eq!(map.push(7, *value).unwrap(), i as u64 + 1);
    }

    assert_eq!(map.values(7).collect::<Vec<_>>(), expected);
    assert_eq!(map.len(7), 300);
}

#[test]
fn test_interleaved_lists_stay_separate() {
    let mut map = list();
    for i in 0..50 {
        map.push(1, i).unwrap();
        map.push(2, -i).unwrap();
    }

    assert_eq!(map.values(1).collect::<Vec<_>>(), (0..50).collect::<Vec<_>>());
    assert_eq!(map.values(2).collect::<Vec<_>>(), (0..50).map(|i| -i).collect::<Vec<_>>());
}

#[test]
fn test_push_null_rejected() {
    let mut map = list();
    let err = map.push(0, NULL).unwrap_err();
    assert!(matches!(err, DenseError::ReservedValue(_)));
}

// =============================================================================
// Sparse Put Tests
// =============================================================================

#[test]
fn test_sparse_put_fills_placeholders() {
    let mut map = list();
    map.put(3, 4, 40).unwrap();

    assert_eq!(map.len(3), 5);
    assert_eq!(map.raw_values(3), vec![NULL, NULL, NULL, NULL, 40]);
    assert_eq!(map.values(3).collect::<Vec<_>>(), vec![40]);
    assert_eq!(map.get(3, 0), NULL);
    assert_eq!(map.get(3, 4), 40);
    assert_eq!(map.get(3, 5), NULL);
}

#[test]
fn test_put_in_place_returns_old() {
    let mut map = list();
    map.set_values(1, &[1, 2, 3]).unwrap();

    assert_eq!(map.put(1, 1, 20).unwrap(), 2);
    assert_eq!(map.values(1).collect::<Vec<_>>(), vec![1, 20, 3]);
}

#[test]
fn test_put_past_capacity_reallocates() {
    let mut map = list();
    map.push(0, 1).unwrap();
    map.put(0, 20, 21).unwrap();

    assert_eq!(map.len(0), 21);
    assert_eq!(map.get(0, 0), 1);
    assert_eq!(map.get(0, 20), 21);
    assert_eq!(map.values(0).collect::<Vec<_>>(), vec![1, 21]);
}

#[test]
fn test_negative_key_rejected() {
    let mut map = list();
    assert!(matches!(
        map.put(-2, 0, 1).unwrap_err(),
        DenseError::NegativeKey(-2)
    ));
    assert_eq!(map.len(-2), 0);
}

#[test]
fn test_put_past_buffer_limit_rejected() {
    let mut map = list();
    map.push(1, 5).unwrap();

    let err = map.put(1, u64::MAX / 2, 6).unwrap_err();
    assert!(matches!(err, DenseError::IndexOutOfRange { width: 1024, .. }));
    let err = map.put(3, 1024, 6).unwrap_err();
    assert!(matches!(err, DenseError::IndexOutOfRange { index: 1024, .. }));

    assert!(!map.contains_key(3).unwrap());
    assert_eq!(map.values(1).collect::<Vec<_>>(), vec![5]);
    assert_eq!(map.put(1, 1023, 7).unwrap(), NULL);
    assert_eq!(map.len(1), 1024);
}

// =============================================================================
// Pop Tests
// =============================================================================

#[test]
fn test_push_push_pop() {
    let mut map = list();
    map.push(1, 10).unwrap();
    map.push(1, 20).unwrap();

    assert_eq!(map.pop(1).unwrap(), Some(20));
    assert_eq!(map.values(1).collect::<Vec<_>>(), vec![10]);
}

#[test]
fn test_pop_to_empty_keeps_key() {
    let mut map = list();
    map.push(4, 1).unwrap();

    assert_eq!(map.pop(4).unwrap(), Some(1));
    assert_eq!(map.pop(4).unwrap(), None);
    assert!(map.contains_key(4).unwrap());
    assert!(map.is_empty(4));
    assert_eq!(map.allocator().pool().len(), 1);
}

#[test]
fn test_pop_shrinks_sparse_slot() {
    let mut map = list();
    for i in 0..64 {
        map.push(2, i).unwrap();
    }
    for _ in 0..60 {
        map.pop(2).unwrap();
    }

    assert_eq!(map.values(2).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert!(map.allocator().pool().len() > 0);
}

#[test]
fn test_pop_skips_trailing_placeholders() {
    let mut map = list();
    map.put(6, 1, 11).unwrap();
    map.put(6, 4, 44).unwrap();

    assert_eq!(map.pop(6).unwrap(), Some(44));
    assert_eq!(map.len(6), 4);
    assert_eq!(map.pop(6).unwrap(), Some(11));
    assert_eq!(map.len(6), 1);
    assert_eq!(map.pop(6).unwrap(), None);
    assert!(map.is_empty(6));
}

#[test]
fn test_pop_absent_key() {
    let mut map = list();
    assert_eq!(map.pop(9).unwrap(), None);
}

// =============================================================================
// Slot Reuse Tests
// =============================================================================

#[test]
fn test_removed_slot_reused_without_growth() {
    let mut map = list();
    map.set_values(1, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    map.set_values(2, &[9]).unwrap();
    let words = map.allocator().total_words();

    map.remove(1).unwrap();
    map.set_values(3, &[1, 2, 3]).unwrap();

    assert_eq!(map.allocator().total_words(), words);
    assert_eq!(map.values(3).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn test_remove_clears_header() {
    let mut map = list();
    map.set_values(5, &[1, 2]).unwrap();

    assert!(map.remove(5).unwrap());
    assert!(!map.contains_key(5).unwrap());
    assert_eq!(map.len(5), 0);
    assert!(!map.remove(5).unwrap());

    map.push(5, 3).unwrap();
    assert_eq!(map.values(5).collect::<Vec<_>>(), vec![3]);
}

#[test]
fn test_set_values_replaces_list() {
    let mut map = list();
    map.set_values(1, &[1, 2, 3, 4]).unwrap();
    map.set_values(1, &[9]).unwrap();

    assert_eq!(map.values(1).collect::<Vec<_>>(), vec![9]);
    map.set_values(1, &[]).unwrap();
    assert_eq!(map.len(1), 0);
    assert!(map.contains_key(1).unwrap());
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_scan_query_over_lists() {
    let mut map = list();
    map.set_values(1, &[1, 50, 99]).unwrap();
    map.set_values(2, &[-5, -6]).unwrap();
    map.set_values(3, &[200]).unwrap();

    assert_eq!(map.query(40, 60).unwrap().sorted(), vec![1]);
    assert_eq!(map.query(-10, 1).unwrap().sorted(), vec![1, 2]);
    assert_eq!(map.union_query(&[200, -6]).unwrap().sorted(), vec![2, 3]);
}

#[test]
fn test_many_to_many_index_over_lists() {
    let mut map = list();
    map.set_values(1, &[10, 20]).unwrap();
    map.set_values(2, &[20, 30]).unwrap();
    map.add_index(IndexKind::ManyToMany).unwrap();

    assert_eq!(map.query(20, 20).unwrap().sorted(), vec![1, 2]);

    map.push(3, 20).unwrap();
    map.pop(1).unwrap();
    assert_eq!(map.query(20, 20).unwrap().sorted(), vec![2, 3]);

    map.remove(2).unwrap();
    assert_eq!(map.query(20, 30).unwrap().sorted(), vec![3]);
    assert_eq!(map.union_query(&[10, 30]).unwrap().sorted(), vec![1]);
}

#[test]
fn test_stats_report_value_buffers() {
    let mut map = list();
    map.set_values(0, &[1, 2, 3]).unwrap();

    let stats = map.stats();
    assert_eq!(stats.keys, 1);
    assert_eq!(stats.value_buffers, 1);
    assert_eq!(stats.value_words, 64);
}
