//! Generic container (`.dfs`): header, auxiliary records, cluster maps and
//! clusters without any file system on top

use crate::cluster_map::ClusterMaps;
use crate::codec::{FieldReader, FieldWriter};
use crate::config::{validate_container_sizes, validate_geometry, ContainerConfig};
use crate::context::ContainerContext;
use crate::data_cluster::DataCluster;
use crate::error::{Result, VfsError};
use crate::frame::{payload_capacity, Persistable};
use crate::hash::signature_of;
use crate::header::Header;
use std::fs::OpenOptions;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Length prefix of a container record payload
const RECORD_LEN_PREFIX: usize = 4;

/// One auxiliary container record: an encrypted, length-prefixed byte blob
#[derive(Debug)]
struct ContainerRecord {
    index: i32,
    data: Vec<u8>,
    dirty: bool,
}

impl Persistable for ContainerRecord {
    const SIGNATURE: u32 = signature_of("ContainerRecord");
    const ENCRYPTED: bool = true;

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
        let mut r = FieldReader::new(payload);
        let len = r.u32() as usize;
        let capacity = payload.len() - RECORD_LEN_PREFIX;
        if len > capacity {
            return Err(VfsError::RecordTooLarge { size: len, capacity });
        }
        self.data = r.take(len).to_vec();
        Ok(())
    }

    fn write_user_data(&self, payload: &mut [u8]) {
        let mut w = FieldWriter::new(payload);
        w.u32(self.data.len() as u32);
        w.put(&self.data);
    }
}

/// Usage summary of an open container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStats {
    pub cluster_size: usize,
    pub cluster_count: usize,
    pub clusters_used: usize,
    pub clusters_free: usize,
    pub usable_cluster_size: usize,
    pub cached_clusters: usize,
    pub file_len: u64,
}

/// An open container file
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    ctx: ContainerContext,
    maps: ClusterMaps,
}

impl Container {
    /// Create (or truncate) a container file and lay down empty metadata
    pub fn create(path: impl AsRef<Path>, config: &ContainerConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let header = Header::new(
            config.cluster_size,
            config.cluster_map_count,
            &config.container_sizes,
            config.build,
        );
        let maps = ClusterMaps::new(config.cluster_map_count, config.cluster_size);
        let ctx = ContainerContext::new(file, header, config.cipher()?, config.cache_capacity);

        let mut container = Container { path, ctx, maps };
        for index in 0..config.container_sizes.len() {
            container.write_record(index, &[])?;
        }
        container.flush()?;

        debug!(
            "Created container {} ({} byte clusters, {} slots)",
            container.path.display(),
            config.cluster_size,
            container.maps.slot_count()
        );
        Ok(container)
    }

    /// Open an existing container, verifying header and cluster maps
    ///
    /// Geometry comes from the header on disk; only the cipher material and
    /// cache capacity are taken from `config`.
    pub fn open(path: impl AsRef<Path>, config: &ContainerConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let header = read_header(&mut file)?;

        let ctx = ContainerContext::new(file, header, config.cipher()?, config.cache_capacity);
        let maps_end = ctx.cluster_map_offset(ctx.header().cluster_map_count());
        if ctx.file_len()? < maps_end {
            return Err(VfsError::InvalidHeader(format!(
                "File ends before the cluster maps ({} bytes expected)",
                maps_end
            )));
        }

        let mut container = Container {
            path,
            ctx,
            maps: ClusterMaps::default(),
        };
        container.load_maps()?;

        debug!(
            "Opened container {} ({} of {} clusters used)",
            container.path.display(),
            container.maps.slot_count() - container.maps.slots_free(),
            container.maps.slot_count()
        );
        Ok(container)
    }

    fn load_maps(&mut self) -> Result<()> {
        let cs = self.ctx.cluster_size();
        let mut maps = ClusterMaps::new(self.ctx.header().cluster_map_count(), cs);
        for (i, map) in maps.maps_mut().iter_mut().enumerate() {
            let offset = self.ctx.cluster_map_offset(i);
            self.ctx.read_frame(offset, cs, map)?;
        }
        self.maps = maps;
        Ok(())
    }

    /// Discard in-memory state and re-read header and maps from disk
    pub fn reload(&mut self) -> Result<()> {
        let mut handle = self.ctx.handle();
        let header = read_header(&mut handle)?;
        self.ctx.replace_header(header);
        self.ctx.reset_cache();
        self.load_maps()
    }

    /// Mark every cluster free and forget cached clusters
    pub fn clear_allocations(&mut self) {
        let cs = self.ctx.cluster_size();
        self.maps = ClusterMaps::new(self.ctx.header().cluster_map_count(), cs);
        self.ctx.reset_cache();
    }

    /// Header (always) and dirty cluster maps
    pub fn flush_metadata(&mut self) -> Result<()> {
        self.ctx.write_header()?;
        let cs = self.ctx.cluster_size();
        for (i, map) in self.maps.maps_mut().iter_mut().enumerate() {
            let offset = self.ctx.cluster_map_offset(i);
            self.ctx.write_frame(offset, cs, map)?;
        }
        Ok(())
    }

    /// Dirty cached clusters, then sync the host file
    pub fn flush_clusters(&mut self) -> Result<()> {
        self.ctx.flush_cache()?;
        self.ctx.sync()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.flush_metadata()?;
        self.flush_clusters()
    }

    /// Flush and release the file handle
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        debug!("Closed container {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ctx(&self) -> &ContainerContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut ContainerContext {
        &mut self.ctx
    }

    pub fn header(&self) -> &Header {
        self.ctx.header()
    }

    pub fn maps(&self) -> &ClusterMaps {
        &self.maps
    }

    pub fn cluster_size(&self) -> usize {
        self.ctx.cluster_size()
    }

    /// File bytes carried by one data cluster
    pub fn usable_cluster_size(&self) -> usize {
        DataCluster::usable_size(self.cluster_size())
    }

    pub fn is_allocated(&self, id: i32) -> bool {
        id >= 0 && self.maps.get(id as u32)
    }

    /// Claim the first free cluster slot
    pub fn allocate_cluster(&mut self) -> Result<i32> {
        let slot = self.maps.allocate()?;
        Ok(slot as i32)
    }

    /// Zero a cluster on disk, drop it from the cache and free its slot
    pub fn release_cluster(&mut self, id: i32) -> Result<()> {
        self.ctx.discard_cluster(id)?;
        self.maps.free(id as u32)
    }

    /// Data cluster `id` through the cache
    pub fn data_cluster(&mut self, id: i32) -> Result<&mut DataCluster> {
        self.ctx.data_cluster(id)
    }

    /// Fresh zeroed data cluster at an allocated slot
    pub fn new_data_cluster(&mut self, id: i32) -> Result<&mut DataCluster> {
        self.ctx.new_data_cluster(id)
    }

    /// Bytes a container record can hold
    pub fn record_capacity(&self, index: usize) -> Result<usize> {
        let size = self
            .header()
            .container_size(index)
            .ok_or(VfsError::InvalidRecordIndex(index))?;
        Ok(payload_capacity(size) - RECORD_LEN_PREFIX)
    }

    pub fn record_count(&self) -> usize {
        self.header().container_count()
    }

    pub fn read_record(&mut self, index: usize) -> Result<Vec<u8>> {
        let size = self
            .header()
            .container_size(index)
            .ok_or(VfsError::InvalidRecordIndex(index))?;
        let mut record = ContainerRecord {
            index: index as i32,
            data: Vec::new(),
            dirty: false,
        };
        let offset = self.ctx.container_offset(index);
        self.ctx.read_frame(offset, size, &mut record)?;
        Ok(record.data)
    }

    /// Replace a record's contents; written immediately
    pub fn write_record(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let capacity = self.record_capacity(index)?;
        if data.len() > capacity {
            return Err(VfsError::RecordTooLarge {
                size: data.len(),
                capacity,
            });
        }
        let size = self
            .header()
            .container_size(index)
            .ok_or(VfsError::InvalidRecordIndex(index))?;
        let mut record = ContainerRecord {
            index: index as i32,
            data: data.to_vec(),
            dirty: true,
        };
        let offset = self.ctx.container_offset(index);
        self.ctx.write_frame(offset, size, &mut record)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<ContainerStats> {
        let cluster_count = self.maps.slot_count();
        Ok(ContainerStats {
            cluster_size: self.cluster_size(),
            cluster_count,
            clusters_used: cluster_count - self.maps.slots_free(),
            clusters_free: self.maps.slots_free(),
            usable_cluster_size: self.usable_cluster_size(),
            cached_clusters: self.ctx.cache().len(),
            file_len: self.ctx.file_len()?,
        })
    }
}

fn read_header<H: Read + Seek>(handle: &mut H) -> Result<Header> {
    let header = Header::read(handle)?;
    let sizes: Vec<usize> = header.container_sizes().collect();
    validate_geometry(header.cluster_size(), header.cluster_map_count())
        .and_then(|()| validate_container_sizes(&sizes))
        .map_err(|e| match e {
            VfsError::Config(msg) => VfsError::InvalidHeader(msg),
            other => other,
        })?;
    Ok(header)
}
