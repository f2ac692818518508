//! Cluster allocation bitmaps
//!
//! Each [`ClusterMap`] is one cluster-sized framed record whose payload is a
//! bitmap with one bit per cluster slot. [`ClusterMaps`] concatenates all maps
//! into a single logical slot index space.

use crate::bitmap::Bitmap;
use crate::codec::{FieldReader, FieldWriter};
use crate::error::{Result, VfsError};
use crate::frame::{payload_capacity, Persistable};
use crate::hash::signature_of;

/// One allocation bitmap
#[derive(Debug, Clone)]
pub struct ClusterMap {
    index: i32,
    bits: Bitmap,
    dirty: bool,
}

impl ClusterMap {
    /// Create an empty (all free) map for clusters of `cluster_size` bytes
    pub fn new(index: i32, cluster_size: usize) -> Self {
        ClusterMap {
            index,
            bits: Bitmap::new(Self::slots_per_map(cluster_size)),
            dirty: true,
        }
    }

    /// Slots tracked by one map: every payload bit
    pub fn slots_per_map(cluster_size: usize) -> usize {
        payload_capacity(cluster_size) * 8
    }

    pub fn slot_count(&self) -> usize {
        self.bits.len()
    }

    pub fn slots_free(&self) -> usize {
        self.bits.free()
    }

    pub fn get(&self, slot: usize) -> bool {
        self.bits.get(slot)
    }

    /// Set a slot's state; only a real toggle marks the map dirty
    pub fn set(&mut self, slot: usize, used: bool) {
        if self.bits.set(slot, used) {
            self.dirty = true;
        }
    }

    pub fn get_free_slot(&self) -> Option<u32> {
        self.bits.first_free().map(|slot| slot as u32)
    }
}

impl Persistable for ClusterMap {
    const SIGNATURE: u32 = signature_of("ClusterMap");
    const ENCRYPTED: bool = false;

    fn index(&self) -> i32 {
        self.index
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    fn read_user_data(&mut self, payload: &[u8]) -> Result<()> {
        self.bits.decode(&mut FieldReader::new(payload));
        Ok(())
    }

    fn write_user_data(&self, payload: &mut [u8]) {
        self.bits.encode(&mut FieldWriter::new(payload));
    }
}

/// All cluster maps of a container, addressed by global slot index
#[derive(Debug, Clone, Default)]
pub struct ClusterMaps {
    maps: Vec<ClusterMap>,
}

impl ClusterMaps {
    pub fn new(count: usize, cluster_size: usize) -> Self {
        ClusterMaps {
            maps: (0..count)
                .map(|i| ClusterMap::new(i as i32, cluster_size))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn maps(&self) -> &[ClusterMap] {
        &self.maps
    }

    pub fn maps_mut(&mut self) -> &mut [ClusterMap] {
        &mut self.maps
    }

    pub fn slot_count(&self) -> usize {
        self.maps.iter().map(ClusterMap::slot_count).sum()
    }

    pub fn slots_free(&self) -> usize {
        self.maps.iter().map(ClusterMap::slots_free).sum()
    }

    /// Resolve a global slot to (map, local slot)
    fn locate(&self, slot: u32) -> Option<(usize, usize)> {
        let mut local = slot as usize;
        for (map_idx, map) in self.maps.iter().enumerate() {
            if local < map.slot_count() {
                return Some((map_idx, local));
            }
            local -= map.slot_count();
        }
        None
    }

    pub fn get(&self, slot: u32) -> bool {
        self.locate(slot)
            .map(|(m, local)| self.maps[m].get(local))
            .unwrap_or(false)
    }

    pub fn set(&mut self, slot: u32, used: bool) -> Result<()> {
        let (m, local) = self
            .locate(slot)
            .ok_or(VfsError::InvalidClusterId(slot as i64))?;
        self.maps[m].set(local, used);
        Ok(())
    }

    /// First free slot across maps in order
    pub fn get_free_slot(&self) -> Option<u32> {
        let mut base = 0u32;
        for map in &self.maps {
            if let Some(local) = map.get_free_slot() {
                return Some(base + local);
            }
            base += map.slot_count() as u32;
        }
        None
    }

    /// Claim the first free slot
    pub fn allocate(&mut self) -> Result<u32> {
        let slot = self.get_free_slot().ok_or(VfsError::NoFreeCluster)?;
        self.set(slot, true)?;
        Ok(slot)
    }

    /// Return a slot to the free pool
    pub fn free(&mut self, slot: u32) -> Result<()> {
        self.set(slot, false)
    }

    pub fn is_dirty(&self) -> bool {
        self.maps.iter().any(ClusterMap::is_dirty)
    }
}
