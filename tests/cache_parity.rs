//! Cache parity tests.
//!
//! A tree driven through a page cache of any capacity must answer every
//! query exactly like a cache-less tree fed the same inserts; only the
//! I/O volume may differ. These tests verify that cross-component
//! behavior over the public API.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tallytree::{BTree, Entry};
use tempfile::tempdir;

fn workload(seed: u64) -> Vec<i64> {
    // Unique keys plus a band of repeats, shuffled together.
    let mut keys: Vec<i64> = (0..600).chain(0..200).chain(50..100).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(seed));
    keys
}

fn entries_of(tree: &mut BTree) -> Vec<(i64, i32)> {
    tree.ordered_entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (entry.key(), entry.count())
        })
        .collect()
}

/// Identical results with the cache disabled and at several capacities.
#[test]
fn test_cached_and_uncached_agree() {
    let dir = tempdir().unwrap();
    let keys = workload(41);

    let mut baseline = BTree::create(dir.path().join("plain.bt"), 2).unwrap();
    for &key in &keys {
        baseline.insert(Entry::new(key)).unwrap();
    }
    let expected = entries_of(&mut baseline);

    for capacity in [1, 2, 8, 64] {
        let path = dir.path().join(format!("cache{}.bt", capacity));
        let mut cached = BTree::create_with_cache(&path, 2, capacity).unwrap();
        for &key in &keys {
            cached.insert(Entry::new(key)).unwrap();
        }

        assert_eq!(cached.len(), baseline.len(), "capacity {}", capacity);
        assert_eq!(cached.height(), baseline.height(), "capacity {}", capacity);
        assert_eq!(
            cached.node_count(),
            baseline.node_count(),
            "capacity {}",
            capacity
        );
        assert_eq!(entries_of(&mut cached), expected, "capacity {}", capacity);

        for probe in [-5, 0, 42, 199, 599, 600, 1_000] {
            assert_eq!(
                cached.search(probe).unwrap(),
                baseline.search(probe).unwrap(),
                "capacity {}, probe {}",
                capacity,
                probe
            );
        }

        cached.check_invariants().unwrap();
    }
}

/// Finalized files are byte-for-byte queryable regardless of the cache
/// configuration that produced them.
#[test]
fn test_finalized_files_agree_across_cache_configs() {
    let dir = tempdir().unwrap();
    let keys = workload(7);

    let plain_path = dir.path().join("plain.bt");
    let cached_path = dir.path().join("cached.bt");

    {
        let mut tree = BTree::create(&plain_path, 3).unwrap();
        for &key in &keys {
            tree.insert(Entry::new(key)).unwrap();
        }
        tree.finalize().unwrap();
    }
    {
        let mut tree = BTree::create_with_cache(&cached_path, 3, 4).unwrap();
        for &key in &keys {
            tree.insert(Entry::new(key)).unwrap();
        }
        tree.finalize().unwrap();
    }

    let mut plain = BTree::open(&plain_path).unwrap();
    let mut cached = BTree::open(&cached_path).unwrap();

    assert_eq!(plain.len(), cached.len());
    assert_eq!(plain.height(), cached.height());
    assert_eq!(entries_of(&mut plain), entries_of(&mut cached));
}

/// The counters actually move, and a tight cache evicts.
#[test]
fn test_cache_counters_observe_the_workload() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::create_with_cache(dir.path().join("t.bt"), 2, 2).unwrap();

    for &key in &workload(11) {
        tree.insert(Entry::new(key)).unwrap();
    }

    let stats = tree.cache_stats().unwrap();
    assert!(stats.references > 0);
    assert!(stats.hits > 0);
    assert!(stats.evictions > 0);
    assert!(stats.writebacks > 0);
    assert!(stats.hits <= stats.references);
    assert!(stats.hit_rate() > 0.0 && stats.hit_rate() <= 1.0);

    // A cache-less tree reports no stats at all.
    let plain = BTree::create(dir.path().join("plain.bt"), 2).unwrap();
    assert!(plain.cache_stats().is_none());
}

/// An explicit mid-ingest flush leaves the tree fully usable and does not
/// change any result.
#[test]
fn test_flush_midway_preserves_results() {
    let dir = tempdir().unwrap();
    let keys = workload(23);

    let mut tree = BTree::create_with_cache(dir.path().join("t.bt"), 2, 8).unwrap();
    for (i, &key) in keys.iter().enumerate() {
        tree.insert(Entry::new(key)).unwrap();
        if i % 100 == 99 {
            tree.flush().unwrap();
        }
    }

    let mut baseline = BTree::create(dir.path().join("plain.bt"), 2).unwrap();
    for &key in &keys {
        baseline.insert(Entry::new(key)).unwrap();
    }

    assert_eq!(entries_of(&mut tree), entries_of(&mut baseline));
    tree.check_invariants().unwrap();
}
