//! Tests for the paged KeyStore
//!
//! These tests verify:
//! - Window addressing and lazy window creation
//! - Active-bit transitions and window counters
//! - Ascending key iteration with range bounds and gaps
//! - Counters and nodes surviving a reopen

use densekv::keystore::KeyStore;
use densekv::storage::MapDir;
use densekv::DenseError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn activate(store: &mut KeyStore, keys: &[u64]) {
    for key in keys {
        let node = store.ensure_node(*key).unwrap();
        assert!(store.set_active(node, true));
    }
}

// =============================================================================
// Addressing Tests
// =============================================================================

#[test]
fn test_locate_uses_floor_division() {
    let store = KeyStore::in_memory(3, 10);

    assert_eq!(store.locate(0), (0, 1));
    assert_eq!(store.locate(9), (0, 1 + 9 * 3));
    assert_eq!(store.locate(10), (1, 1));
    assert_eq!(store.locate(25), (2, 1 + 5 * 3));
}

#[test]
fn test_node_at_without_create_is_absent() {
    let mut store = KeyStore::in_memory(2, 8);

    assert_eq!(store.node_at(5, false).unwrap(), None);
    assert_eq!(store.window_count(), 0);

    let node = store.node_at(5, true).unwrap().unwrap();
    assert_eq!(node.window(), 0);
    assert_eq!(store.window_count(), 1);
    assert_eq!(store.node_at(6, false).unwrap().map(|n| n.base()), Some(1 + 6 * 2));
}

// =============================================================================
// Active Bit Tests
// =============================================================================

#[test]
fn test_set_active_reports_transitions() {
    let mut store = KeyStore::in_memory(2, 8);
    let node = store.ensure_node(3).unwrap();

    assert!(store.set_active(node, true));
    assert!(!store.set_active(node, true));
    assert_eq!(store.key_count(), 1);

    assert!(store.set_active(node, false));
    assert!(!store.set_active(node, false));
    assert_eq!(store.key_count(), 0);
}

#[test]
fn test_window_counters_track_active_nodes() {
    let mut store = KeyStore::in_memory(1, 4);
    activate(&mut store, &[0, 1, 5, 6, 7]);

    assert_eq!(store.window_after(None).unwrap().active_count(), 2);
    assert_eq!(store.window_after(Some(0)).unwrap().active_count(), 3);
    assert!(store.window_after(Some(1)).is_none());
    assert_eq!(store.key_count(), 5);
}

#[test]
fn test_words_round_trip() {
    let mut store = KeyStore::in_memory(4, 16);
    let node = store.ensure_node(9).unwrap();
    store.set_word(node, 1, 11);
    store.set_word(node, 3, -33);

    assert_eq!(store.word(node, 1), 11);
    assert_eq!(store.payload(node), vec![11, 0, -33]);
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_keys_ascending_across_windows() {
    let mut store = KeyStore::in_memory(1, 4);
    activate(&mut store, &[17, 2, 40, 3, 9]);

    let keys: Vec<u64> = store.keys(0, u64::MAX).collect();
    assert_eq!(keys, vec![2, 3, 9, 17, 40]);
}

#[test]
fn test_keys_respects_bounds() {
    let mut store = KeyStore::in_memory(1, 4);
    activate(&mut store, &[1, 3, 4, 8, 11, 12]);

    let keys: Vec<u64> = store.keys(3, 11).collect();
    assert_eq!(keys, vec![3, 4, 8, 11]);
    assert_eq!(store.keys(5, 7).count(), 0);
    assert_eq!(store.keys(9, 2).count(), 0);
}

#[test]
fn test_keys_skip_emptied_windows() {
    let mut store = KeyStore::in_memory(1, 4);
    activate(&mut store, &[0, 5, 9]);
    let node = store.find(5).unwrap();
    store.set_active(node, false);

    let keys: Vec<u64> = store.keys(0, 100).collect();
    assert_eq!(keys, vec![0, 9]);
}

#[test]
fn test_largest_key() {
    let mut store = KeyStore::in_memory(1, 8);
    assert_eq!(store.largest_key(), None);

    activate(&mut store, &[3, 20, 7]);
    assert_eq!(store.largest_key(), Some(20));

    let node = store.find(20).unwrap();
    store.set_active(node, false);
    assert_eq!(store.largest_key(), Some(7));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_restores_nodes_and_counts() {
    let temp = TempDir::new().unwrap();
    let dir = MapDir::create(temp.path()).unwrap();

    {
        let mut store = KeyStore::open(2, 8, Some(dir.clone())).unwrap();
        activate(&mut store, &[1, 2, 30]);
        let node = store.find(30).unwrap();
        store.set_word(node, 1, 300);
        store.sync().unwrap();
    }

    let store = KeyStore::open(2, 8, Some(dir)).unwrap();
    assert_eq!(store.window_count(), 2);
    assert_eq!(store.key_count(), 3);
    assert_eq!(store.word(store.find(30).unwrap(), 1), 300);
    assert!(store.contains(2));
    assert!(!store.contains(3));
}

#[test]
fn test_reopen_with_other_node_size_fails() {
    let temp = TempDir::new().unwrap();
    let dir = MapDir::create(temp.path()).unwrap();

    {
        let mut store = KeyStore::open(2, 8, Some(dir.clone())).unwrap();
        activate(&mut store, &[1]);
        store.sync().unwrap();
    }

    let err = KeyStore::open(3, 8, Some(dir)).unwrap_err();
    assert!(matches!(err, DenseError::Corruption(_)));
}

#[test]
fn test_clear_removes_window_files() {
    let temp = TempDir::new().unwrap();
    let dir = MapDir::create(temp.path()).unwrap();
    let mut store = KeyStore::open(1, 4, Some(dir.clone())).unwrap();
    activate(&mut store, &[0, 9]);

    store.clear().unwrap();
    assert_eq!(store.window_count(), 0);
    assert!(dir.window_ids().unwrap().is_empty());
}
