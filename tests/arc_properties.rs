//! Property-based tests for the adaptive replacement cache.
//!
//! Drives the cache with random access sequences (lookup, then admit on a
//! miss) and checks the list-size invariants and the direction in which
//! ghost hits move the recency target.
//!
//! Run with: `cargo test --test arc_properties`

use proptest::prelude::*;
use std::collections::HashSet;

use cdn_edge::cache::{ArcCache, ArcList, Lookup};
use cdn_edge::types::{ContentId, Payload};

// =============================================================================
// Helpers
// =============================================================================

fn payload_for(id: ContentId) -> Payload {
    Payload::from(id.to_le_bytes().to_vec())
}

/// One simulated request: lookup, then admit on a miss.
fn access(cache: &mut ArcCache, id: ContentId) -> Lookup {
    let lookup = cache.lookup(id);
    if !lookup.is_hit() {
        cache.admit(id, payload_for(id));
    }
    lookup
}

fn check_invariants(cache: &ArcCache) -> Result<(), TestCaseError> {
    let c = cache.capacity();
    let t1 = cache.list_len(ArcList::T1);
    let t2 = cache.list_len(ArcList::T2);
    let b1 = cache.list_len(ArcList::B1);
    let b2 = cache.list_len(ArcList::B2);

    prop_assert!(t1 + t2 <= c, "resident {} > capacity {}", t1 + t2, c);
    prop_assert!(t1 + b1 <= c, "T1+B1 {} > capacity {}", t1 + b1, c);
    prop_assert!(b1 <= c);
    prop_assert!(b2 <= c);
    prop_assert!(cache.target_t1() <= c);
    prop_assert_eq!(cache.len(), t1 + t2);

    let mut seen = HashSet::new();
    for list in [ArcList::T1, ArcList::T2, ArcList::B1, ArcList::B2] {
        for id in cache.ids(list) {
            prop_assert!(seen.insert(id), "id {} present in more than one list", id);
            prop_assert_eq!(cache.locate(id), Some(list));
        }
    }
    Ok(())
}

// =============================================================================
// Strategies
// =============================================================================

/// Small key spaces relative to capacity so ghosts get revisited often.
fn workload_strategy() -> impl Strategy<Value = (usize, Vec<ContentId>)> {
    (1usize..8).prop_flat_map(|capacity| {
        let keys = (capacity as u64) * 3;
        (Just(capacity), prop::collection::vec(0..keys, 0..300))
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// List bounds and disjointness hold after every access
    #[test]
    fn prop_invariants_hold((capacity, ids) in workload_strategy()) {
        let mut cache = ArcCache::new(capacity);
        for id in ids {
            access(&mut cache, id);
            check_invariants(&cache)?;
        }
    }

    /// A lookup hits exactly when the id was resident, and returns its payload
    #[test]
    fn prop_hit_iff_resident((capacity, ids) in workload_strategy()) {
        let mut cache = ArcCache::new(capacity);
        for id in ids {
            let was_resident = cache.contains(id);
            match access(&mut cache, id) {
                Lookup::Hit(payload) => {
                    prop_assert!(was_resident);
                    prop_assert_eq!(payload.as_bytes(), &id.to_le_bytes()[..]);
                    prop_assert_eq!(cache.locate(id), Some(ArcList::T2));
                }
                Lookup::Miss => {
                    prop_assert!(!was_resident);
                    prop_assert!(cache.contains(id));
                }
            }
        }
    }

    /// Ghost hits in B1 never shrink p; ghost hits in B2 never grow it
    #[test]
    fn prop_ghost_hits_move_target((capacity, ids) in workload_strategy()) {
        let mut cache = ArcCache::new(capacity);
        for id in ids {
            let before = cache.target_t1();
            let list = cache.locate(id);
            access(&mut cache, id);
            let after = cache.target_t1();

            match list {
                Some(ArcList::B1) => {
                    prop_assert!(after >= before, "B1 hit moved p {} -> {}", before, after);
                    prop_assert_eq!(cache.locate(id), Some(ArcList::T2));
                }
                Some(ArcList::B2) => {
                    prop_assert!(after <= before, "B2 hit moved p {} -> {}", before, after);
                    prop_assert_eq!(cache.locate(id), Some(ArcList::T2));
                }
                _ => prop_assert_eq!(after, before),
            }
        }
    }

    /// Counters agree with the observed outcomes
    #[test]
    fn prop_stats_match_outcomes((capacity, ids) in workload_strategy()) {
        let mut cache = ArcCache::new(capacity);
        let (mut hits, mut misses) = (0u64, 0u64);
        for id in &ids {
            if access(&mut cache, *id).is_hit() {
                hits += 1;
            } else {
                misses += 1;
            }
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.hits, hits);
        prop_assert_eq!(stats.misses, misses);
        prop_assert_eq!(stats.admissions, misses);
        prop_assert_eq!(stats.entries, cache.len());
        prop_assert_eq!(stats.target_t1, cache.target_t1());
    }

    /// A zero-capacity cache never holds anything
    #[test]
    fn prop_zero_capacity_stays_empty(ids in prop::collection::vec(0u64..16, 0..50)) {
        let mut cache = ArcCache::new(0);
        for id in ids {
            prop_assert!(!access(&mut cache, id).is_hit());
            prop_assert!(cache.is_empty());
            prop_assert_eq!(cache.locate(id), None);
        }
    }
}

// =============================================================================
// Fixed sequences
// =============================================================================

#[test]
fn test_recency_then_frequency_sequence() {
    let mut cache = ArcCache::new(3);
    for id in [1, 2, 3, 1, 4] {
        access(&mut cache, id);
    }

    assert_eq!(cache.ids(ArcList::T2), vec![1]);
    assert_eq!(cache.ids(ArcList::T1), vec![3, 4]);
    assert_eq!(cache.ids(ArcList::B1), vec![2]);
    assert!(cache.ids(ArcList::B2).is_empty());
    assert_eq!(cache.target_t1(), 0);
}

#[test]
fn test_recency_ghost_grows_target() {
    let mut cache = ArcCache::new(3);
    for id in [1, 2, 3, 1, 4] {
        access(&mut cache, id);
    }

    // 2 comes back from B1
    assert!(!access(&mut cache, 2).is_hit());
    assert_eq!(cache.target_t1(), 1);
    assert_eq!(cache.locate(2), Some(ArcList::T2));
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.stats().recency_ghost_hits, 1);
}

#[test]
fn test_scan_does_not_flush_frequent_entries() {
    let mut cache = ArcCache::new(4);
    for _ in 0..2 {
        for id in [1, 2] {
            access(&mut cache, id);
        }
    }
    for id in 100..120 {
        access(&mut cache, id);
    }

    assert_eq!(cache.locate(1), Some(ArcList::T2));
    assert_eq!(cache.locate(2), Some(ArcList::T2));
}
