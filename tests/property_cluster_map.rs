//! Property-based tests for cluster allocation bitmaps

use proptest::prelude::*;
use std::collections::BTreeSet;
use vaultfs::core::cluster_map::{ClusterMap, ClusterMaps};

const CLUSTER_SIZE: usize = 1024;

proptest! {
    #[test]
    fn prop_allocate_then_free_restores_free_count(
        map_count in 1usize..4,
        n in 0usize..3000
    ) {
        let mut maps = ClusterMaps::new(map_count, CLUSTER_SIZE);
        let initial = maps.slots_free();
        let n = n.min(initial);

        let slots: Vec<u32> = (0..n).map(|_| maps.allocate().unwrap()).collect();
        prop_assert_eq!(maps.slots_free(), initial - n);
        for slot in slots {
            maps.free(slot).unwrap();
        }
        prop_assert_eq!(maps.slots_free(), initial);
    }

    #[test]
    fn prop_free_slot_matches_model(
        ops in prop::collection::vec((any::<bool>(), 0u32..20_000), 1..300)
    ) {
        let mut maps = ClusterMaps::new(2, CLUSTER_SIZE);
        let total = maps.slot_count() as u32;
        let mut used = BTreeSet::new();

        for (allocate, pick) in ops {
            if allocate {
                let slot = maps.allocate().unwrap();
                prop_assert!(used.insert(slot), "slot {} handed out twice", slot);
            } else if let Some(&slot) = used.iter().nth(pick as usize % used.len().max(1)) {
                maps.free(slot).unwrap();
                used.remove(&slot);
            }

            let expected = (0..total).find(|s| !used.contains(s));
            prop_assert_eq!(maps.get_free_slot(), expected);
            if let Some(slot) = maps.get_free_slot() {
                prop_assert!(!maps.get(slot));
            }
            prop_assert_eq!(maps.slots_free(), total as usize - used.len());
        }
    }
}

#[test]
fn test_exhausted_maps_report_none() {
    let mut maps = ClusterMaps::new(1, CLUSTER_SIZE);
    let total = ClusterMap::slots_per_map(CLUSTER_SIZE);
    for _ in 0..total {
        maps.allocate().unwrap();
    }
    assert_eq!(maps.slots_free(), 0);
    assert_eq!(maps.get_free_slot(), None);
    assert!(maps.allocate().is_err());

    maps.free(17).unwrap();
    assert_eq!(maps.get_free_slot(), Some(17));
}
