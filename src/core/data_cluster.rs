//! Data clusters: raw file bytes plus chain links

use crate::codec::{FieldReader, FieldWriter};
use crate::error::Result;
use crate::frame::{payload_capacity, Persistable};
use crate::hash::signature_of;
use crate::node::NO_CLUSTER;

/// previous + next
const LINK_SIZE: usize = 8;

/// One link of a file's cluster chain
#[derive(Debug, Clone)]
pub struct DataCluster {
    cluster_id: i32,
    previous: i32,
    next: i32,
    data: Vec<u8>,
    dirty: bool,
}

impl DataCluster {
    /// Fresh, unlinked, zero-filled cluster (dirty until first write)
    pub fn new(cluster_id: i32, cluster_size: usize) -> Self {
        DataCluster {
            cluster_id,
            previous: NO_CLUSTER,
            next: NO_CLUSTER,
            data: vec![0u8; Self::usable_size(cluster_size)],
            dirty: true,
        }
    }

    /// File bytes carried by one cluster of `cluster_size` bytes
    pub fn usable_size(cluster_size: usize) -> usize {
        payload_capacity(cluster_size) - LINK_SIZE
    }

    pub fn cluster_id(&self) -> i32 {
        self.cluster_id
    }

    pub fn previous(&self) -> i32 {
        self.previous
    }

    pub fn next(&self) -> i32 {
        self.next
    }

    pub fn set_previous(&mut self, previous: i32) {
        if self.previous != previous {
            self.previous = previous;
            self.dirty = true;
        }
    }

    pub fn set_next(&mut self, next: i32) {
        if self.next != next {
            self.next = next;
            self.dirty = true;
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Copy bytes starting at `offset` into `buf`; returns bytes copied
    pub fn block_read(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.data.len() {
            return 0;
        }
        let n = buf.len().min(self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        n
    }

    /// Copy `buf` into the cluster at `offset`; returns bytes copied
    pub fn block_write(&mut self, offset: usize, buf: &[u8]) -> usize {
        if offset >= self.data.len() {
            return 0;
        }
        let n = buf.len().min(self.data.len() - offset);
        self.data[offset..offset + n].copy_from_slice(&buf[..n]);
        if n > 0 {
            self.dirty = true;
        }
        n
    }

    /// Zero everything from `offset` to the end of the data region
    pub fn clear_from(&mut self, offset: usize) {
        if offset < self.data.len() && self.data[offset..].iter().any(|&b| b != 0) {
            self.data[offset..].fill(0);
            self.dirty = true;
        }
    }
}

impl Persistable for DataCluster {
    const SIGNATURE: u32 = signature_of("DataCluster");
    const ENCRYPTED: bool = true;

    fn index(&self) -> i32 {
        self.cluster_id
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    fn read_user_data(&mut self, payload: &[u8]) -> Result<()> {
        let mut r = FieldReader::new(payload);
        self.previous = r.i32();
        self.next = r.i32();
        let len = self.data.len();
        self.data.copy_from_slice(r.take(len));
        Ok(())
    }

    fn write_user_data(&self, payload: &mut [u8]) {
        let mut w = FieldWriter::new(payload);
        w.i32(self.previous);
        w.i32(self.next);
        w.put(&self.data);
    }
}
