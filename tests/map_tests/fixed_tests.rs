//! Tests for FixedNodeMap
//!
//! These tests verify:
//! - put/get round trips and previous-value returns
//! - Usage errors (negative keys, index range, reserved values)
//! - containsKey after any sequence of puts and removes
//! - Scan and indexed value queries
//! - Auto-increment keys and thread-safe reservation

use std::collections::BTreeSet;
use std::thread;

use densekv::config::Config;
use densekv::constants::{END_OF_LINE, MIN_VALUE, NULL};
use densekv::map::MapSettings;
use densekv::{DenseError, FixedNodeMap, IndexKind, KeyMap};

// =============================================================================
// Helper Functions
// =============================================================================

fn settings() -> MapSettings {
    MapSettings::from_config(&Config::builder().fixed_window_keys(8).build())
}

fn single() -> FixedNodeMap {
    FixedNodeMap::in_memory("single", 1, &settings()).unwrap()
}

fn triple() -> FixedNodeMap {
    FixedNodeMap::in_memory("triple", 3, &settings()).unwrap()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_get_round_trip() {
    let mut map = triple();

    map.put(5, 0, 50).unwrap();
    map.put(5, 2, -52).unwrap();

    assert_eq!(map.get(5, 0).unwrap(), 50);
    assert_eq!(map.get(5, 1).unwrap(), NULL);
    assert_eq!(map.get(5, 2).unwrap(), -52);
    assert_eq!(map.values(5), Some(vec![50, NULL, -52]));
}

#[test]
fn test_put_returns_previous_value() {
    let mut map = single();

    assert_eq!(map.set(1, 10).unwrap(), NULL);
    assert_eq!(map.set(1, 11).unwrap(), 10);
    assert_eq!(map.value(1), 11);
}

#[test]
fn test_get_absent_key_is_null() {
    let map = single();
    assert_eq!(map.get(1000, 0).unwrap(), NULL);
    assert_eq!(map.value(-3), NULL);
    assert_eq!(map.values(7), None);
}

#[test]
fn test_extreme_values() {
    let mut map = single();
    map.set(0, MIN_VALUE).unwrap();
    map.set(1, i64::MAX).unwrap();

    assert_eq!(map.value(0), MIN_VALUE);
    assert_eq!(map.value(1), i64::MAX);
}

#[test]
fn test_reactivated_key_starts_empty() {
    let mut map = triple();
    map.put_all(2, &[1, 2, 3]).unwrap();
    map.remove(2).unwrap();

    map.put(2, 1, 20).unwrap();
    assert_eq!(map.values(2), Some(vec![NULL, 20, NULL]));
}

// =============================================================================
// Usage Error Tests
// =============================================================================

#[test]
fn test_negative_key_rejected() {
    let mut map = single();
    let err = map.set(-1, 5).unwrap_err();
    assert!(matches!(err, DenseError::NegativeKey(-1)));
}

#[test]
fn test_index_out_of_range() {
    let mut map = triple();
    let err = map.put(0, 3, 1).unwrap_err();
    assert!(matches!(err, DenseError::IndexOutOfRange { index: 3, width: 3 }));
    assert!(map.get(0, 9).is_err());
}

#[test]
fn test_reserved_value_rejected() {
    let mut map = single();
    let err = map.set(0, END_OF_LINE).unwrap_err();
    assert!(matches!(err, DenseError::ReservedValue(_)));
    assert!(!map.contains_key(0).unwrap());
}

#[test]
fn test_put_all_checks_width() {
    let mut map = triple();
    assert!(map.put_all(0, &[1, 2]).is_err());
}

// =============================================================================
// Key Membership Tests
// =============================================================================

#[test]
fn test_contains_key_follows_latest_operation() {
    let mut map = single();
    let ops: [(i64, bool); 8] = [
        (3, true),
        (3, false),
        (3, true),
        (9, true),
        (3, false),
        (9, false),
        (9, true),
        (12, false),
    ];

    let mut live = BTreeSet::new();
    for (key, put) in ops {
        if put {
            map.set(key, key * 10).unwrap();
            live.insert(key);
        } else {
            map.remove(key).unwrap();
            live.remove(&key);
        }
        for probe in [3, 9, 12] {
            assert_eq!(map.contains_key(probe).unwrap(), live.contains(&probe));
        }
    }
    assert_eq!(map.key_count().unwrap(), live.len() as u64);
}

#[test]
fn test_remove_absent_key() {
    let mut map = single();
    assert!(!map.remove(4).unwrap());
    assert!(!map.remove(-4).unwrap());
}

#[test]
fn test_keys_in_range() {
    let mut map = single();
    for key in [1, 4, 8, 15, 16, 30] {
        map.set(key, 0).unwrap();
    }

    assert_eq!(map.keys(4, 16).unwrap().collect::<Vec<_>>(), vec![4, 8, 15, 16]);
    assert_eq!(map.keys(-10, 1).unwrap().collect::<Vec<_>>(), vec![1]);
    assert_eq!(map.keys(-10, -1).unwrap().count(), 0);
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_scan_query_matches_any_position() {
    let mut map = triple();
    map.put_all(1, &[5, 100, 7]).unwrap();
    map.put_all(2, &[-3, 0, 1]).unwrap();
    map.put_all(3, &[200, 300, 400]).unwrap();

    assert_eq!(map.query(0, 10).unwrap().sorted(), vec![1, 2]);
    assert_eq!(map.query(-5, -1).unwrap().sorted(), vec![2]);
    assert_eq!(map.query(250, 350).unwrap().sorted(), vec![3]);
    assert_eq!(map.query(10, 0).unwrap().count(), 0);
}

#[test]
fn test_scan_union_query() {
    let mut map = single();
    map.set(1, 10).unwrap();
    map.set(2, 20).unwrap();
    map.set(3, 30).unwrap();

    assert_eq!(map.union_query(&[30, 10, NULL]).unwrap().sorted(), vec![1, 3]);
    assert_eq!(map.union_query(&[]).unwrap().count(), 0);
}

#[test]
fn test_indexed_query_agrees_with_scan() {
    let mut map = single();
    for key in 0..40 {
        map.set(key, (key % 7) - 3).unwrap();
    }
    let scanned = map.query(-2, 1).unwrap().sorted();

    map.add_index(IndexKind::ManyToOne).unwrap();
    assert_eq!(map.index_kind(), Some(IndexKind::ManyToOne));
    assert_eq!(map.query(-2, 1).unwrap().sorted(), scanned);
}

#[test]
fn test_index_follows_updates_and_removes() {
    let mut map = single();
    map.add_index(IndexKind::ManyToOne).unwrap();

    map.set(1, 100).unwrap();
    map.set(2, 100).unwrap();
    map.set(1, 5).unwrap();
    assert_eq!(map.query(100, 100).unwrap().sorted(), vec![2]);
    assert_eq!(map.query(5, 5).unwrap().sorted(), vec![1]);

    map.remove(2).unwrap();
    assert_eq!(map.query(100, 100).unwrap().count(), 0);
}

#[test]
fn test_index_keeps_value_held_twice() {
    let mut map = triple();
    map.add_index(IndexKind::ManyToMany).unwrap();

    map.put_all(1, &[7, 7, 8]).unwrap();
    map.put(1, 0, 9).unwrap();
    assert_eq!(map.query(7, 7).unwrap().sorted(), vec![1]);

    map.put(1, 1, 9).unwrap();
    assert_eq!(map.query(7, 7).unwrap().count(), 0);
    assert_eq!(map.query(9, 9).unwrap().sorted(), vec![1]);
}

#[test]
fn test_drop_index_falls_back_to_scan() {
    let mut map = single();
    map.set(4, 44).unwrap();
    map.add_index(IndexKind::OneToOne).unwrap();
    map.drop_index().unwrap();

    assert_eq!(map.index_kind(), None);
    assert_eq!(map.query(44, 44).unwrap().sorted(), vec![4]);
}

// =============================================================================
// Key Generation Tests
// =============================================================================

#[test]
fn test_next_key_tracks_largest() {
    let mut map = single();
    assert_eq!(map.next_key(), 0);

    map.set(41, 1).unwrap();
    map.set(7, 1).unwrap();
    assert_eq!(map.next_key(), 42);

    map.remove(41).unwrap();
    assert_eq!(map.next_key(), 42);
}

#[test]
fn test_insert_uses_reserved_keys() {
    let mut map = triple();
    map.put(10, 0, 1).unwrap();

    let key = map.insert(&[1, 2, 3]).unwrap();
    assert_eq!(key, 11);
    assert_eq!(map.values(11), Some(vec![1, 2, 3]));
}

#[test]
fn test_reserver_hands_out_distinct_keys() {
    let mut map = single();
    map.set(99, 0).unwrap();
    let reserver = map.key_reserver();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let reserver = reserver.clone();
            thread::spawn(move || (0..100).map(|_| reserver.reserve()).collect::<Vec<_>>())
        })
        .collect();

    let mut keys: Vec<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    keys.sort_unstable();
    keys.dedup();

    assert_eq!(keys.len(), 400);
    assert_eq!(keys[0], 100);
    assert_eq!(reserver.peek(), 500);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_clear_empties_map() {
    let mut map = single();
    map.set(1, 1).unwrap();
    map.set(100, 2).unwrap();

    map.clear().unwrap();
    assert_eq!(map.key_count().unwrap(), 0);
    assert_eq!(map.next_key(), 0);
    assert_eq!(map.stats().windows, 0);
}

#[test]
fn test_stats_counts_keys_and_windows() {
    let mut map = single();
    for key in [0, 1, 9, 17] {
        map.set(key, key).unwrap();
    }

    let stats = map.stats();
    assert_eq!(stats.keys, 4);
    assert_eq!(stats.windows, 3);
    assert_eq!(stats.value_buffers, 0);
}
