//! Random-access byte stream over one node's data cluster chain
//!
//! The stream keeps a working copy of the node and writes it back into its
//! node block after every change, so the block (and a later flush) always
//! sees the current size and chain ends.
//!
//! Seeking past the end grows the chain so the target cluster exists; the
//! file size itself only changes on a write or `set_length`.

use crate::container::Container;
use crate::data_cluster::DataCluster;
use crate::error::{Result, VfsError};
use crate::node::{Node, NO_CLUSTER, NO_PARENT};
use crate::node_cluster::NodeCluster;
use std::io::{self, SeekFrom};

pub struct FileStream<'a> {
    container: &'a mut Container,
    block: &'a mut NodeCluster,
    slot: usize,
    node: Node,
    usable: u64,
    /// Cluster covering `[cluster_start, cluster_start + usable)`, or `NO_CLUSTER`
    cluster: i32,
    cluster_index: u32,
    cluster_start: u64,
    position: u64,
}

impl<'a> FileStream<'a> {
    /// Open a stream on the file node in `slot` of `block`
    pub fn new(container: &'a mut Container, block: &'a mut NodeCluster, slot: usize) -> Result<Self> {
        let node = block.node(slot).cloned().ok_or(VfsError::NodeNotFound(NO_PARENT))?;
        if node.is_directory() {
            return Err(VfsError::FileNotFound(node.name()));
        }
        let usable = container.usable_cluster_size() as u64;
        Ok(FileStream {
            container,
            block,
            slot,
            node,
            usable,
            cluster: NO_CLUSTER,
            cluster_index: 0,
            cluster_start: 0,
            position: 0,
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn len(&self) -> u64 {
        self.node.file_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Clusters needed to hold `len` bytes
    pub fn clusters_for(&self, len: u64) -> u32 {
        len.div_ceil(self.usable) as u32
    }

    fn write_back(&mut self) -> Result<()> {
        self.block.replace_node(self.slot, self.node.clone())
    }

    fn check_writable(&self) -> Result<()> {
        if self.node.is_read_only() {
            return Err(VfsError::ReadOnly(self.node.name()));
        }
        Ok(())
    }

    /// Move the current cluster so its window contains `pos`.
    ///
    /// Walks from whichever of the current cluster, the head or the tail is
    /// closest to the target.
    fn align(&mut self, pos: u64) -> Result<()> {
        let target = (pos / self.usable) as u32;
        let count = self.node.cluster_count();
        if target >= count {
            return Err(VfsError::BrokenChain(self.node.last_cluster()));
        }
        if self.cluster != NO_CLUSTER && self.cluster_index == target {
            return Ok(());
        }

        let mut best = (self.node.first_cluster(), 0u32, target);
        if self.cluster != NO_CLUSTER {
            let distance = self.cluster_index.abs_diff(target);
            if distance < best.2 {
                best = (self.cluster, self.cluster_index, distance);
            }
        }
        if count - 1 - target < best.2 {
            best = (self.node.last_cluster(), count - 1, count - 1 - target);
        }

        let (mut id, mut index, _) = best;
        let mut steps = 0u32;
        while index != target {
            let cluster = self.container.data_cluster(id)?;
            let forward = index < target;
            let next = if forward { cluster.next() } else { cluster.previous() };
            steps += 1;
            if next == NO_CLUSTER || steps > count {
                return Err(VfsError::BrokenChain(id));
            }
            id = next;
            index = if forward { index + 1 } else { index - 1 };
        }

        self.cluster = id;
        self.cluster_index = index;
        self.cluster_start = index as u64 * self.usable;
        Ok(())
    }

    /// Move the cursor, growing the chain first when the target lies past the end.
    ///
    /// Read-only files never grow; their cursor just moves.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.len() as i128 + delta as i128,
        };
        if target < 0 {
            return Err(VfsError::InvalidSeek(target as i64));
        }
        let target = u64::try_from(target).map_err(|_| VfsError::FileTooLarge(u64::MAX))?;

        if target > self.len() && !self.node.is_read_only() {
            if i32::try_from(target).is_err() {
                return Err(VfsError::FileTooLarge(target));
            }
            self.enhance_clusters_to(self.clusters_for(target + 1))?;
        }
        self.position = target;

        if self.position < self.node.cluster_count() as u64 * self.usable {
            self.align(self.position)?;
        }
        Ok(self.position)
    }

    /// Read up to `buf.len()` bytes; returns 0 at end of file
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let size = self.len();
        let mut done = 0;
        while done < buf.len() && self.position < size {
            self.align(self.position)?;
            let offset = (self.position - self.cluster_start) as usize;
            let available = (size - self.position).min(self.usable - offset as u64) as usize;
            let n = (buf.len() - done).min(available);

            let cluster = self.container.data_cluster(self.cluster)?;
            let read = cluster.block_read(offset, &mut buf[done..done + n]);
            if read == 0 {
                break;
            }
            done += read;
            self.position += read as u64;
        }
        Ok(done)
    }

    /// Write all of `buf` at the cursor, growing the file as needed
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_writable()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let end = self.position + buf.len() as u64;
        if end > self.len() {
            self.set_length(end)?;
        }

        let mut done = 0;
        while done < buf.len() {
            self.align(self.position)?;
            let offset = (self.position - self.cluster_start) as usize;
            let n = (buf.len() - done).min(self.usable as usize - offset);

            let cluster = self.container.data_cluster(self.cluster)?;
            let written = cluster.block_write(offset, &buf[done..done + n]);
            if written == 0 {
                return Err(VfsError::BrokenChain(self.cluster));
            }
            done += written;
            self.position += written as u64;
        }

        self.node.touch();
        self.write_back()?;
        Ok(done)
    }

    /// Grow or shrink the file to exactly `len` bytes
    pub fn set_length(&mut self, len: u64) -> Result<()> {
        self.check_writable()?;
        if i32::try_from(len).is_err() {
            return Err(VfsError::FileTooLarge(len));
        }

        let old_len = self.len();
        let needed = self.clusters_for(len);
        if needed > self.node.cluster_count() {
            self.enhance_clusters_to(needed)?;
        } else if needed < self.node.cluster_count() {
            self.reduce_clusters_to(needed)?;
        }

        // Stale bytes past the new end would reappear on a later growth
        if len < old_len && needed > 0 {
            let tail_offset = (len - (needed as u64 - 1) * self.usable) as usize;
            let tail = self.node.last_cluster();
            self.container.data_cluster(tail)?.clear_from(tail_offset);
        }

        self.node.set_file_size(len)?;
        self.write_back()
    }

    /// Extend the chain to `count` clusters
    pub fn enhance_clusters_to(&mut self, count: u32) -> Result<()> {
        while self.node.cluster_count() < count {
            let id = self.container.allocate_cluster()?;
            let previous = self.node.last_cluster();
            if previous != NO_CLUSTER {
                self.container.data_cluster(previous)?.set_next(id);
            }
            self.container.new_data_cluster(id)?.set_previous(previous);

            self.node.push_cluster(id);
            self.write_back()?;
        }
        Ok(())
    }

    /// Cut the chain down to `count` clusters, releasing the tail ones
    pub fn reduce_clusters_to(&mut self, count: u32) -> Result<()> {
        while self.node.cluster_count() > count {
            let tail = self.node.last_cluster();
            let previous = self.container.data_cluster(tail)?.previous();
            self.container.release_cluster(tail)?;

            self.node.pop_cluster(previous);
            if self.node.cluster_count() > 0 {
                self.container.data_cluster(previous)?.set_next(NO_CLUSTER);
            }
            self.write_back()?;
        }
        self.cluster = NO_CLUSTER;
        Ok(())
    }

    /// Persist the container metadata, this node's block and cached clusters
    pub fn flush(&mut self) -> Result<()> {
        self.container.flush_metadata()?;
        self.container.ctx_mut().write_node_cluster(self.block)?;
        self.container.flush_clusters()
    }

    /// Read everything from the current position to the end
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let remaining = self.len().saturating_sub(self.position) as usize;
        let mut buf = vec![0u8; remaining];
        let n = self.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Usable bytes per data cluster
    pub fn usable_cluster_size(&self) -> usize {
        DataCluster::usable_size(self.container.cluster_size())
    }
}

fn to_io(err: VfsError) -> io::Error {
    match err {
        VfsError::Io(e) => e,
        other => io::Error::other(other),
    }
}

impl io::Read for FileStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FileStream::read(self, buf).map_err(to_io)
    }
}

impl io::Write for FileStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FileStream::write(self, buf).map_err(to_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        FileStream::flush(self).map_err(to_io)
    }
}

impl io::Seek for FileStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        FileStream::seek(self, pos).map_err(to_io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::node::NodeFlags;
    use crate::node_cluster::HEAD_BLOCK_ID;
    use tempfile::TempDir;

    const CLUSTER_SIZE: usize = 1024;

    struct Fixture {
        _dir: TempDir,
        container: Container,
        block: NodeCluster,
        slot: usize,
    }

    fn fixture(flags: NodeFlags) -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = ContainerConfig::default().with_cluster_size(CLUSTER_SIZE);
        let container = Container::create(dir.path().join("stream.dfs"), &config).unwrap();
        let mut block = NodeCluster::new(HEAD_BLOCK_ID, CLUSTER_SIZE);
        let slot = block.create_node(42, 0, "data.bin", flags).unwrap();
        Fixture {
            _dir: dir,
            container,
            block,
            slot,
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_write_read_across_clusters() {
        let mut f = fixture(NodeFlags::empty());
        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        let usable = stream.usable_cluster_size();
        let data = pattern(usable * 3 + 17);

        assert_eq!(stream.write(&data).unwrap(), data.len());
        assert_eq!(stream.node().cluster_count(), 4);

        stream.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(stream.read_to_end().unwrap(), data);

        let node = f.block.node(f.slot).unwrap();
        assert_eq!(node.file_size(), data.len() as u64);
        assert!(node.chain_is_consistent());
    }

    #[test]
    fn test_seek_then_read_mid_chain() {
        let mut f = fixture(NodeFlags::empty());
        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        let usable = stream.usable_cluster_size();
        let data = pattern(usable * 5);
        stream.write(&data).unwrap();

        // Backwards from the tail, then forwards from the head
        for &pos in &[usable * 4 + 3, usable + 1, usable * 2 - 1, 0] {
            stream.seek(SeekFrom::Start(pos as u64)).unwrap();
            let mut buf = [0u8; 8];
            assert_eq!(stream.read(&mut buf).unwrap(), 8);
            assert_eq!(&buf, &data[pos..pos + 8]);
        }
    }

    #[test]
    fn test_short_read_at_eof() {
        let mut f = fixture(NodeFlags::empty());
        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        stream.write(b"hello").unwrap();

        stream.seek(SeekFrom::End(-2)).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_negative_seek_rejected() {
        let mut f = fixture(NodeFlags::empty());
        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        assert!(matches!(
            stream.seek(SeekFrom::Current(-1)),
            Err(VfsError::InvalidSeek(-1))
        ));
    }

    #[test]
    fn test_write_past_end_zero_fills_gap() {
        let mut f = fixture(NodeFlags::empty());
        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        let usable = stream.usable_cluster_size() as u64;

        stream.seek(SeekFrom::Start(usable + 10)).unwrap();
        stream.write(b"tail").unwrap();
        assert_eq!(stream.len(), usable + 14);

        stream.seek(SeekFrom::Start(0)).unwrap();
        let all = stream.read_to_end().unwrap();
        assert!(all[..(usable + 10) as usize].iter().all(|&b| b == 0));
        assert_eq!(&all[(usable + 10) as usize..], b"tail");
    }

    #[test]
    fn test_seek_past_end_grows_chain_but_not_size() {
        let mut f = fixture(NodeFlags::empty());
        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        let usable = stream.usable_cluster_size() as u64;

        stream.seek(SeekFrom::Start(usable * 2)).unwrap();
        assert_eq!(stream.node().cluster_count(), 3);
        assert_eq!(stream.len(), 0);
        assert!(stream.node().chain_is_consistent());

        // Already covered: no further growth
        stream.seek(SeekFrom::Start(usable + 7)).unwrap();
        assert_eq!(stream.node().cluster_count(), 3);

        stream.set_length(5).unwrap();
        assert_eq!(stream.node().cluster_count(), 1);
    }

    #[test]
    fn test_seek_past_end_on_full_container() {
        let mut f = fixture(NodeFlags::empty());
        while f.container.maps().slots_free() > 0 {
            f.container.allocate_cluster().unwrap();
        }

        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        assert!(matches!(
            stream.seek(SeekFrom::Start(10)),
            Err(VfsError::NoFreeCluster)
        ));
        assert_eq!(stream.node().cluster_count(), 0);
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_read_only_seek_does_not_grow() {
        let mut f = fixture(NodeFlags::READ_ONLY);
        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        assert_eq!(stream.seek(SeekFrom::Start(5000)).unwrap(), 5000);
        assert_eq!(stream.node().cluster_count(), 0);
    }

    #[test]
    fn test_shrink_releases_clusters_and_zeroes_tail() {
        let mut f = fixture(NodeFlags::empty());
        let free_before = f.container.maps().slots_free();
        {
            let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
            let usable = stream.usable_cluster_size() as u64;
            stream.write(&vec![0xEE; (usable * 3) as usize]).unwrap();

            stream.set_length(usable + 5).unwrap();
            assert_eq!(stream.node().cluster_count(), 2);

            stream.set_length(usable * 2).unwrap();
            stream.seek(SeekFrom::Start(usable)).unwrap();
            let rest = stream.read_to_end().unwrap();
            assert_eq!(&rest[..5], &[0xEE; 5]);
            assert!(rest[5..].iter().all(|&b| b == 0));

            stream.set_length(0).unwrap();
            assert_eq!(stream.node().cluster_count(), 0);
            assert_eq!(stream.node().first_cluster(), NO_CLUSTER);
        }
        assert_eq!(f.container.maps().slots_free(), free_before);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let mut f = fixture(NodeFlags::READ_ONLY);
        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        assert!(matches!(stream.write(b"x"), Err(VfsError::ReadOnly(_))));
        assert!(matches!(stream.set_length(1), Err(VfsError::ReadOnly(_))));
    }

    #[test]
    fn test_io_traits_compose_with_copy() {
        let mut f = fixture(NodeFlags::empty());
        let mut stream = FileStream::new(&mut f.container, &mut f.block, f.slot).unwrap();
        let data = pattern(4000);

        std::io::copy(&mut data.as_slice(), &mut stream).unwrap();
        stream.flush().unwrap();
        std::io::Seek::seek(&mut stream, SeekFrom::Start(0)).unwrap();

        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut stream, &mut out).unwrap();
        assert_eq!(out, data);
    }
}
