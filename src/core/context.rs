//! Shared container state: file handle, header, cache, cipher and layout
//!
//! ```text
//! ┌────────┬────────────┬──────────────┬────────────┬──────────────────┐
//! │ header │ containers │ cluster maps │ root block │ clusters 0..n    │
//! └────────┴────────────┴──────────────┴────────────┴──────────────────┘
//! ```
//!
//! Every position in the file comes from the offset functions here. The root
//! node block occupies the cluster-sized gap after the maps, addressed as
//! cluster `-1`.

use crate::cache::{ClusterCache, ClusterKind};
use crate::cipher::Cipher;
use crate::cluster_map::ClusterMap;
use crate::data_cluster::DataCluster;
use crate::error::{Result, VfsError};
use crate::frame::{read_record, write_record, Persistable};
use crate::header::Header;
use crate::node_cluster::{NodeCluster, HEAD_BLOCK_ID};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

#[derive(Debug)]
pub struct ContainerContext {
    handle: File,
    header: Header,
    cache: ClusterCache,
    cipher: Cipher,
}

impl ContainerContext {
    pub fn new(handle: File, header: Header, cipher: Cipher, cache_capacity: usize) -> Self {
        ContainerContext {
            handle,
            header,
            cache: ClusterCache::new(cache_capacity),
            cipher,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }

    pub fn cache(&self) -> &ClusterCache {
        &self.cache
    }

    pub fn handle(&self) -> &File {
        &self.handle
    }

    pub fn cluster_size(&self) -> usize {
        self.header.cluster_size()
    }

    /// Addressable data clusters (every cluster-map bit)
    pub fn cluster_count(&self) -> usize {
        ClusterMap::slots_per_map(self.cluster_size()) * self.header.cluster_map_count()
    }

    pub fn header_offset(&self) -> u64 {
        0
    }

    pub fn header_size(&self) -> u64 {
        self.header.size() as u64
    }

    pub fn container_offset(&self, index: usize) -> u64 {
        let preceding: usize = self.header.container_sizes().take(index).sum();
        self.header_offset() + self.header_size() + preceding as u64
    }

    pub fn cluster_map_offset(&self, index: usize) -> u64 {
        self.container_offset(self.header.container_count()) + (index * self.cluster_size()) as u64
    }

    /// Offset of cluster `index`; `-1` is the root node block
    pub fn cluster_offset(&self, index: i32) -> u64 {
        let cs = self.cluster_size() as i64;
        let base = self.cluster_map_offset(self.header.cluster_map_count()) as i64;
        (base + cs + index as i64 * cs) as u64
    }

    /// Bytes the layout needs through the root node block
    pub fn metadata_len(&self) -> u64 {
        self.cluster_offset(0)
    }

    fn check_cluster_id(&self, id: i32, allow_head: bool) -> Result<()> {
        let in_range = id >= 0 && (id as usize) < self.cluster_count();
        if in_range || (allow_head && id == HEAD_BLOCK_ID) {
            Ok(())
        } else {
            Err(VfsError::InvalidClusterId(id as i64))
        }
    }

    /// Read and verify one framed record into `target`
    pub fn read_frame<T: Persistable>(&mut self, offset: u64, len: usize, target: &mut T) -> Result<()> {
        read_record(&mut self.handle, offset, len, &self.cipher, target)
    }

    /// Write one framed record if dirty
    pub fn write_frame<T: Persistable>(&mut self, offset: u64, len: usize, source: &mut T) -> Result<bool> {
        write_record(&mut self.handle, offset, len, &self.cipher, source)
    }

    pub fn read_data_cluster(&mut self, id: i32) -> Result<DataCluster> {
        self.check_cluster_id(id, false)?;
        let cs = self.cluster_size();
        let mut cluster = DataCluster::new(id, cs);
        self.read_frame(self.cluster_offset(id), cs, &mut cluster)?;
        Ok(cluster)
    }

    pub fn read_node_cluster(&mut self, id: i32) -> Result<NodeCluster> {
        self.check_cluster_id(id, true)?;
        let cs = self.cluster_size();
        let mut cluster = NodeCluster::new(id, cs);
        self.read_frame(self.cluster_offset(id), cs, &mut cluster)?;
        Ok(cluster)
    }

    pub fn write_node_cluster(&mut self, cluster: &mut NodeCluster) -> Result<bool> {
        let cs = self.cluster_size();
        let offset = self.cluster_offset(cluster.cluster_id());
        self.write_frame(offset, cs, cluster)
    }

    pub fn write_cluster(&mut self, cluster: &mut ClusterKind) -> Result<bool> {
        let cs = self.cluster_size();
        let offset = self.cluster_offset(cluster.cluster_id());
        match cluster {
            ClusterKind::Data(c) => self.write_frame(offset, cs, c),
            ClusterKind::Node(c) => self.write_frame(offset, cs, c),
        }
    }

    /// Insert into the cache, writing back whatever gets evicted
    pub fn cache_cluster(&mut self, cluster: ClusterKind) -> Result<usize> {
        let (slot, evicted) = self.cache.append(cluster);
        if let Some(mut evicted) = evicted {
            self.write_cluster(&mut evicted)?;
        }
        Ok(slot)
    }

    /// Cached data cluster, loading it from disk on a miss
    pub fn data_cluster(&mut self, id: i32) -> Result<&mut DataCluster> {
        let slot = match self.cache.position(id) {
            Some(slot) => slot,
            None => {
                let cluster = self.read_data_cluster(id)?;
                self.cache_cluster(ClusterKind::Data(cluster))?
            }
        };
        match self.cache.slot_mut(slot) {
            Some(ClusterKind::Data(cluster)) => Ok(cluster),
            _ => Err(VfsError::ClusterKindMismatch(id)),
        }
    }

    /// Cache a fresh, zeroed data cluster at `id` without reading the disk
    pub fn new_data_cluster(&mut self, id: i32) -> Result<&mut DataCluster> {
        self.check_cluster_id(id, false)?;
        self.cache.remove(id);
        let cluster = DataCluster::new(id, self.cluster_size());
        let slot = self.cache_cluster(ClusterKind::Data(cluster))?;
        match self.cache.slot_mut(slot) {
            Some(ClusterKind::Data(cluster)) => Ok(cluster),
            _ => Err(VfsError::ClusterKindMismatch(id)),
        }
    }

    /// Write every dirty cached cluster
    pub fn flush_cache(&mut self) -> Result<()> {
        let cs = self.cluster_size();
        let base = self.cluster_offset(0) as i64;
        let ContainerContext {
            handle,
            cache,
            cipher,
            ..
        } = self;
        for cluster in cache.iter_mut() {
            let offset = (base + cluster.cluster_id() as i64 * cs as i64) as u64;
            match cluster {
                ClusterKind::Data(c) => write_record(handle, offset, cs, cipher, c)?,
                ClusterKind::Node(c) => write_record(handle, offset, cs, cipher, c)?,
            };
        }
        Ok(())
    }

    /// Drop a cluster from the cache and zero its disk region
    pub fn discard_cluster(&mut self, id: i32) -> Result<()> {
        self.check_cluster_id(id, false)?;
        self.cache.remove(id);
        let offset = self.cluster_offset(id);
        let len = self.cluster_size();
        self.clear_region(offset, len)
    }

    pub fn clear_region(&mut self, offset: u64, len: usize) -> Result<()> {
        self.handle.seek(SeekFrom::Start(offset))?;
        self.handle.write_all(&vec![0u8; len])?;
        Ok(())
    }

    pub fn write_header(&mut self) -> Result<()> {
        self.header.write(&mut self.handle)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.handle.flush()?;
        self.handle.sync_all()?;
        Ok(())
    }

    /// Forget cached clusters without writing them
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }

    pub fn replace_header(&mut self, header: Header) {
        self.header = header;
    }

    pub fn file_len(&self) -> Result<u64> {
        Ok(self.handle.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    fn context(container_sizes: &[usize]) -> ContainerContext {
        let header = Header::new(1024, 2, container_sizes, 1);
        ContainerContext::new(tempfile().unwrap(), header, Cipher::default(), 4)
    }

    #[test]
    fn test_offsets() {
        let ctx = context(&[64, 128]);
        let header_size = 76 + 8;
        assert_eq!(ctx.header_size(), header_size);
        assert_eq!(ctx.container_offset(0), header_size);
        assert_eq!(ctx.container_offset(1), header_size + 64);
        assert_eq!(ctx.cluster_map_offset(0), header_size + 192);
        assert_eq!(ctx.cluster_map_offset(1), header_size + 192 + 1024);

        let maps_end = header_size + 192 + 2048;
        assert_eq!(ctx.cluster_offset(HEAD_BLOCK_ID), maps_end);
        assert_eq!(ctx.cluster_offset(0), maps_end + 1024);
        assert_eq!(ctx.cluster_offset(3), maps_end + 4 * 1024);
    }

    #[test]
    fn test_cluster_written_through_cache() {
        let mut ctx = context(&[]);
        ctx.new_data_cluster(2).unwrap().block_write(0, b"payload");
        ctx.flush_cache().unwrap();
        ctx.reset_cache();

        let cluster = ctx.read_data_cluster(2).unwrap();
        let mut buf = [0u8; 7];
        cluster.block_read(0, &mut buf);
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn test_eviction_writes_back() {
        let mut ctx = context(&[]);
        for id in 0..5 {
            ctx.new_data_cluster(id).unwrap().block_write(0, &[id as u8 + 1]);
        }
        // Capacity 4: cluster 0 was evicted and written
        assert!(!ctx.cache().contains(0));
        let cluster = ctx.read_data_cluster(0).unwrap();
        let mut buf = [0u8; 1];
        cluster.block_read(0, &mut buf);
        assert_eq!(buf[0], 1);
    }

    #[test]
    fn test_out_of_range_cluster_rejected() {
        let mut ctx = context(&[]);
        let count = ctx.cluster_count() as i32;
        assert!(matches!(
            ctx.read_data_cluster(count),
            Err(VfsError::InvalidClusterId(_))
        ));
        assert!(matches!(
            ctx.read_data_cluster(HEAD_BLOCK_ID),
            Err(VfsError::InvalidClusterId(-1))
        ));
    }

    #[test]
    fn test_discarded_cluster_is_zeroed() {
        let mut ctx = context(&[]);
        ctx.new_data_cluster(1).unwrap().block_write(0, b"gone");
        ctx.flush_cache().unwrap();
        ctx.discard_cluster(1).unwrap();

        assert!(!ctx.cache().contains(1));
        assert!(matches!(
            ctx.read_data_cluster(1),
            Err(VfsError::SignatureMismatch { .. })
        ));
    }
}
