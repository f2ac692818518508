//! Fixed-capacity round-robin cluster cache
//!
//! Not LRU: a single write pointer walks the slots in order and every append
//! evicts whatever sits under it. Lookups scan from the pointer so recently
//! appended clusters are found first.
//!
//! The cache owns no file handle. Evicted entries are handed back to the
//! caller, which writes them back when dirty.

use crate::data_cluster::DataCluster;
use crate::frame::Persistable;
use crate::node_cluster::NodeCluster;

/// Default number of cached clusters
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Either kind of cluster held by the cache
#[derive(Debug, Clone)]
pub enum ClusterKind {
    Data(DataCluster),
    Node(NodeCluster),
}

impl ClusterKind {
    pub fn cluster_id(&self) -> i32 {
        match self {
            ClusterKind::Data(c) => c.cluster_id(),
            ClusterKind::Node(c) => c.cluster_id(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            ClusterKind::Data(c) => c.is_dirty(),
            ClusterKind::Node(c) => c.is_dirty(),
        }
    }
}

#[derive(Debug)]
pub struct ClusterCache {
    slots: Vec<Option<ClusterKind>>,
    cursor: usize,
}

impl ClusterCache {
    pub fn new(capacity: usize) -> Self {
        ClusterCache {
            slots: (0..capacity.max(1)).map(|_| None).collect(),
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Slot index holding `id`, scanning from the write pointer
    pub fn position(&self, id: i32) -> Option<usize> {
        let cap = self.slots.len();
        (0..cap)
            .map(|step| (self.cursor + cap - 1 - step) % cap)
            .find(|&slot| matches!(&self.slots[slot], Some(c) if c.cluster_id() == id))
    }

    pub fn contains(&self, id: i32) -> bool {
        self.position(id).is_some()
    }

    pub fn item(&self, id: i32) -> Option<&ClusterKind> {
        self.position(id).and_then(|slot| self.slots[slot].as_ref())
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut ClusterKind> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// Store `value` at the write pointer and advance it.
    ///
    /// Returns the evicted entry, if the slot was occupied.
    pub fn append(&mut self, value: ClusterKind) -> (usize, Option<ClusterKind>) {
        let slot = self.cursor;
        let evicted = self.slots[slot].replace(value);
        self.cursor = (self.cursor + 1) % self.slots.len();
        (slot, evicted)
    }

    /// Drop an entry without write-back
    pub fn remove(&mut self, id: i32) -> Option<ClusterKind> {
        let slot = self.position(id)?;
        self.slots[slot].take()
    }

    /// Every occupied entry, in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClusterKind> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.cursor = 0;
    }
}

impl Default for ClusterCache {
    fn default() -> Self {
        ClusterCache::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTER_SIZE: usize = 1024;

    fn data(id: i32) -> ClusterKind {
        ClusterKind::Data(DataCluster::new(id, CLUSTER_SIZE))
    }

    #[test]
    fn test_append_and_lookup() {
        let mut cache = ClusterCache::new(4);
        cache.append(data(1));
        cache.append(ClusterKind::Node(NodeCluster::new(2, CLUSTER_SIZE)));

        assert!(matches!(cache.item(1), Some(ClusterKind::Data(_))));
        assert!(matches!(cache.item(2), Some(ClusterKind::Node(_))));
        assert!(cache.item(3).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_round_robin_eviction() {
        let mut cache = ClusterCache::new(3);
        for id in 0..3 {
            let (_, evicted) = cache.append(data(id));
            assert!(evicted.is_none());
        }

        // Wraps around to slot 0 regardless of access pattern
        let _ = cache.item(0);
        let (slot, evicted) = cache.append(data(3));
        assert_eq!(slot, 0);
        assert_eq!(evicted.map(|c| c.cluster_id()), Some(0));
        assert!(!cache.contains(0));
        assert!(cache.contains(3));
    }

    #[test]
    fn test_remove_skips_write_back() {
        let mut cache = ClusterCache::new(2);
        cache.append(data(9));
        let removed = cache.remove(9).unwrap();
        assert!(removed.is_dirty());
        assert!(cache.is_empty());
        assert!(cache.remove(9).is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = ClusterCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }
}
