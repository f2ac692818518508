//! File system facade (`.vfs`): node blocks, directory tree and navigation
//! on top of a [`Container`]
//!
//! Structural mutations persist on success. When one fails with a structural
//! or integrity error the volume reloads itself from disk and reports
//! [`VfsError::Resynchronized`], so the in-memory model never drifts from
//! what is on disk.

use crate::config::ContainerConfig;
use crate::container::{Container, ContainerStats};
use crate::error::{Result, VfsError};
use crate::hash::node_id;
use crate::node::{validate_name, Node, NodeFlags, NO_CLUSTER, NO_PARENT};
use crate::node_cluster::{NodeCluster, HEAD_BLOCK_ID};
use crate::stream::FileStream;
use crate::tree::{root_id, DirectoryTree, ROOT_KEY};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Path separator inside a volume
pub const SEPARATOR: char = '\\';

/// Name stored in the root node
pub const ROOT_NAME: &str = "\\";

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A volume shared between threads; every operation takes the lock
pub type SharedVolume = Arc<Mutex<Volume>>;

/// Where a node lives: index into the node block chain, then slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLocation {
    pub block: usize,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeStats {
    pub container: ContainerStats,
    pub directories: usize,
    pub files: usize,
    pub node_blocks: usize,
    pub free_node_slots: usize,
}

/// An open file system volume
#[derive(Debug)]
pub struct Volume {
    container: Container,
    node_blocks: Vec<NodeCluster>,
    index: HashMap<u32, NodeLocation>,
    tree: DirectoryTree,
    current: u32,
}

impl Volume {
    /// Create a container file and format it
    pub fn create(path: impl AsRef<Path>, name: &str, config: &ContainerConfig) -> Result<Self> {
        info!("Creating volume '{}' at {:?}", name, path.as_ref());
        let container = Container::create(path, config)?;
        let mut volume = Volume {
            container,
            node_blocks: Vec::new(),
            index: HashMap::new(),
            tree: DirectoryTree::with_root(),
            current: root_id(),
        };
        volume.format(name)?;
        Ok(volume)
    }

    /// Open an existing volume and rebuild its directory tree
    pub fn open(path: impl AsRef<Path>, config: &ContainerConfig) -> Result<Self> {
        info!("Opening volume at {:?}", path.as_ref());
        let container = Container::open(path, config)?;
        let mut volume = Volume {
            container,
            node_blocks: Vec::new(),
            index: HashMap::new(),
            tree: DirectoryTree::with_root(),
            current: root_id(),
        };
        volume.load()?;
        info!(
            "Opened volume '{}' ({} directories, {} files)",
            volume.name(),
            volume.tree.dir_count(),
            volume.tree.file_count()
        );
        Ok(volume)
    }

    /// Wipe the volume down to an empty root directory
    pub fn format(&mut self, name: &str) -> Result<()> {
        info!("Formatting volume '{}'", name);
        let cs = self.container.cluster_size();
        self.container.clear_allocations();
        self.container.ctx_mut().header_mut().set_name(name);

        let mut head = NodeCluster::new(HEAD_BLOCK_ID, cs);
        head.create_node(root_id(), NO_PARENT, ROOT_NAME, NodeFlags::DIRECTORY)?;
        self.node_blocks = vec![head];
        self.rebuild()?;
        self.flush()
    }

    /// Read the node block chain and rebuild index and tree
    fn load(&mut self) -> Result<()> {
        let limit = self.container.ctx().cluster_count() + 1;
        let mut blocks = Vec::new();
        let mut id = HEAD_BLOCK_ID;
        loop {
            let block = self.container.ctx_mut().read_node_cluster(id)?;
            let next = block.next_block();
            blocks.push(block);
            if next == NO_CLUSTER {
                break;
            }
            if blocks.len() >= limit {
                return Err(VfsError::BrokenChain(next));
            }
            id = next;
        }
        self.node_blocks = blocks;
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<()> {
        let mut index = HashMap::new();
        for (b, block) in self.node_blocks.iter().enumerate() {
            for (slot, node) in block.occupied() {
                index.insert(node.id(), NodeLocation { block: b, slot });
            }
        }
        let tree = DirectoryTree::build(self.node_blocks.iter().flat_map(|b| b.occupied().map(|(_, n)| n)))?;

        self.index = index;
        self.current = if tree.contains_dir(self.current) {
            self.current
        } else {
            tree.root()
        };
        self.tree = tree;
        Ok(())
    }

    /// Discard everything in memory and re-read from disk
    pub fn reload(&mut self) -> Result<()> {
        self.container.reload()?;
        self.load()
    }

    /// Header, cluster maps, node blocks, then cached data clusters
    pub fn flush(&mut self) -> Result<()> {
        self.container.flush_metadata()?;
        for block in &mut self.node_blocks {
            self.container.ctx_mut().write_node_cluster(block)?;
        }
        self.container.flush_clusters()
    }

    /// Stamp the header's modified time and persist a finished mutation
    fn commit(&mut self) -> Result<()> {
        self.container.ctx_mut().header_mut().touch();
        self.flush()
    }

    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        info!("Closed volume '{}'", self.name());
        Ok(())
    }

    /// Wrap for use across threads
    pub fn into_shared(self) -> SharedVolume {
        Arc::new(Mutex::new(self))
    }

    /// Run a mutation; structural and integrity failures trigger a reload
    fn guarded<T>(&mut self, op: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match f(self) {
            Err(err) if err.is_structural() || err.is_integrity() => {
                warn!("{} failed: {}; reloading volume", op, err);
                if let Err(reload_err) = self.reload() {
                    error!("Reload after failed {} also failed: {}", op, reload_err);
                }
                Err(VfsError::Resynchronized(Box::new(err)))
            }
            other => other,
        }
    }

    pub fn name(&self) -> String {
        self.container.header().name()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn tree(&self) -> &DirectoryTree {
        &self.tree
    }

    pub fn locate_node(&self, id: u32) -> Option<NodeLocation> {
        self.index.get(&id).copied()
    }

    pub fn node(&self, id: u32) -> Option<&Node> {
        let loc = self.locate_node(id)?;
        self.node_blocks.get(loc.block)?.node(loc.slot)
    }

    fn node_or_err(&self, id: u32) -> Result<&Node> {
        self.node(id).ok_or(VfsError::NodeNotFound(id))
    }

    /// Node blocks in chain order, head first
    pub fn node_blocks(&self) -> &[NodeCluster] {
        &self.node_blocks
    }

    /// Path key hashed into node ids: `ROOT\A\B`
    fn path_key(&self, dir: u32, name: Option<&str>) -> Result<String> {
        let mut key = String::from(ROOT_KEY);
        for id in self.tree.ancestry(dir).into_iter().skip(1) {
            key.push(SEPARATOR);
            key.push_str(&self.node_or_err(id)?.name());
        }
        if let Some(name) = name {
            key.push(SEPARATOR);
            key.push_str(name);
        }
        Ok(key)
    }

    fn create_node(&mut self, parent: u32, name: &str, flags: NodeFlags) -> Result<u32> {
        let id = node_id(&self.path_key(parent, Some(name))?);

        let block = match self.node_blocks.iter().position(NodeCluster::has_free_slot) {
            Some(block) => block,
            None => self.allocate_node_block()?,
        };
        let slot = self.node_blocks[block].create_node(id, parent, name, flags)?;
        self.index.insert(id, NodeLocation { block, slot });
        Ok(id)
    }

    fn allocate_node_block(&mut self) -> Result<usize> {
        let cluster = self.container.allocate_cluster()?;
        let cs = self.container.cluster_size();
        if let Some(last) = self.node_blocks.last_mut() {
            last.set_next_block(cluster);
        }
        self.node_blocks.push(NodeCluster::new(cluster, cs));
        debug!("Allocated node block at cluster {}", cluster);
        Ok(self.node_blocks.len() - 1)
    }

    fn remove_node(&mut self, id: u32) -> Result<Node> {
        let loc = self.locate_node(id).ok_or(VfsError::NodeNotFound(id))?;
        let node = self.node_blocks[loc.block].remove_node(id)?;
        self.index.remove(&id);
        Ok(node)
    }

    fn update_node(&mut self, id: u32, f: impl FnOnce(&mut Node)) -> Result<()> {
        let loc = self.locate_node(id).ok_or(VfsError::NodeNotFound(id))?;
        let block = &mut self.node_blocks[loc.block];
        let mut node = block.node(loc.slot).cloned().ok_or(VfsError::NodeNotFound(id))?;
        f(&mut node);
        block.replace_node(loc.slot, node)
    }

    fn child_dir(&self, dir: u32, name: &str) -> Option<u32> {
        self.tree
            .children(dir)
            .iter()
            .copied()
            .find(|&id| self.node(id).is_some_and(|n| n.name_matches(name)))
    }

    fn child_file(&self, dir: u32, name: &str) -> Option<u32> {
        self.tree
            .files(dir)
            .iter()
            .copied()
            .find(|&id| self.node(id).is_some_and(|n| n.name_matches(name)))
    }

    /// Follow directory segments from `start`
    fn walk<'p>(&self, start: u32, segments: impl Iterator<Item = &'p str>) -> Result<u32> {
        let mut dir = start;
        for segment in segments {
            dir = match segment {
                "" | "." => dir,
                ".." => self
                    .tree
                    .dir(dir)
                    .and_then(|d| d.parent)
                    .ok_or_else(|| VfsError::DirectoryNotFound(segment.to_string()))?,
                name => self
                    .child_dir(dir, name)
                    .ok_or_else(|| VfsError::DirectoryNotFound(name.to_string()))?,
            };
        }
        Ok(dir)
    }

    fn start_of(&self, path: &str) -> u32 {
        if path.starts_with(SEPARATOR) {
            self.tree.root()
        } else {
            self.current
        }
    }

    /// Directory id for a backslash-separated path
    pub fn resolve_dir(&self, path: &str) -> Result<u32> {
        self.walk(self.start_of(path), path.split(SEPARATOR))
    }

    /// File id for a backslash-separated path
    pub fn resolve_file(&self, path: &str) -> Result<u32> {
        let (dir_part, name) = match path.rfind(SEPARATOR) {
            Some(i) => (&path[..i], &path[i + 1..]),
            None => ("", path),
        };
        if name.is_empty() || name == "." || name == ".." {
            return Err(VfsError::FileNotFound(path.to_string()));
        }
        let dir = self.walk(self.start_of(path), dir_part.split(SEPARATOR))?;
        self.child_file(dir, name)
            .ok_or_else(|| VfsError::FileNotFound(path.to_string()))
    }

    // Navigation

    pub fn current_directory(&self) -> Result<&Node> {
        self.node_or_err(self.current)
    }

    /// Absolute path of the current directory (`\` at the root)
    pub fn current_path(&self) -> Result<String> {
        self.path_of_dir(self.current)
    }

    fn path_of_dir(&self, dir: u32) -> Result<String> {
        let mut path = String::new();
        for id in self.tree.ancestry(dir).into_iter().skip(1) {
            path.push(SEPARATOR);
            path.push_str(&self.node_or_err(id)?.name());
        }
        if path.is_empty() {
            path.push(SEPARATOR);
        }
        Ok(path)
    }

    /// Change into a directory (name or path); unchanged on failure
    pub fn change_to_folder(&mut self, path: &str) -> Result<()> {
        self.current = self.resolve_dir(path)?;
        Ok(())
    }

    pub fn change_one_up(&mut self) -> Result<()> {
        self.current = self
            .tree
            .parent_of(self.current)
            .ok_or_else(|| VfsError::DirectoryNotFound("..".to_string()))?;
        Ok(())
    }

    pub fn change_to_root(&mut self) {
        self.current = self.tree.root();
    }

    /// Child directories of the current directory
    pub fn directories(&self) -> Vec<Node> {
        self.tree
            .children(self.current)
            .iter()
            .filter_map(|&id| self.node(id).cloned())
            .collect()
    }

    /// Files in the current directory
    pub fn files(&self) -> Vec<Node> {
        self.tree
            .files(self.current)
            .iter()
            .filter_map(|&id| self.node(id).cloned())
            .collect()
    }

    /// Directories then files of the current directory
    pub fn list_entries(&self) -> Result<Vec<crate::Entry>> {
        let parent = self.current_path()?;
        let dirs = self.directories();
        let files = self.files();
        Ok(dirs
            .iter()
            .chain(files.iter())
            .map(|node| crate::Entry::from_node(node, &parent))
            .collect())
    }

    pub fn get_file(&self, path: &str) -> Result<Node> {
        let id = self.resolve_file(path)?;
        self.node_or_err(id).cloned()
    }

    // Mutations

    pub fn create_folder(&mut self, name: &str) -> Result<Node> {
        self.guarded("create_folder", |v| {
            validate_name(name)?;
            let parent = v.current;
            if v.child_dir(parent, name).is_some() {
                return Err(VfsError::DirectoryExists(name.to_string()));
            }
            if v.child_file(parent, name).is_some() {
                return Err(VfsError::FileExists(name.to_string()));
            }

            let id = v.create_node(parent, name, NodeFlags::DIRECTORY)?;
            v.tree.add_directory(parent, id)?;
            v.commit()?;
            debug!("Created folder {}", name);
            v.node_or_err(id).cloned()
        })
    }

    /// Create an empty file, or refresh the timestamp of an existing one
    pub fn touch(&mut self, name: &str) -> Result<Node> {
        self.guarded("touch", |v| v.touch_in_current(name))
    }

    fn touch_in_current(&mut self, name: &str) -> Result<Node> {
        validate_name(name)?;
        let parent = self.current;
        if self.child_dir(parent, name).is_some() {
            return Err(VfsError::DirectoryExists(name.to_string()));
        }

        let id = match self.child_file(parent, name) {
            Some(id) => {
                self.update_node(id, Node::touch)?;
                id
            }
            None => {
                let id = self.create_node(parent, name, NodeFlags::ARCHIVE)?;
                self.tree.add_file(parent, id)?;
                id
            }
        };
        self.commit()?;
        debug!("Touched {}", name);
        self.node_or_err(id).cloned()
    }

    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        self.guarded("delete_file", |v| {
            let id = v.resolve_file(path)?;
            let node = v.node_or_err(id)?.clone();
            if node.is_read_only() {
                return Err(VfsError::ReadOnly(node.name()));
            }

            let chain = v.collect_chain(&node)?;
            for cluster in chain {
                v.container.release_cluster(cluster)?;
            }
            v.remove_node(id)?;
            v.tree.remove_file(id)?;
            v.commit()?;
            debug!("Deleted file {}", path);
            Ok(())
        })
    }

    /// Every cluster of a node's chain, verified before anything is released
    fn collect_chain(&mut self, node: &Node) -> Result<Vec<i32>> {
        let mut chain = Vec::with_capacity(node.cluster_count() as usize);
        let mut seen = HashSet::new();
        let mut id = node.first_cluster();
        for _ in 0..node.cluster_count() {
            if id == NO_CLUSTER || !seen.insert(id) {
                return Err(VfsError::BrokenChain(node.last_cluster()));
            }
            let next = self.container.data_cluster(id)?.next();
            chain.push(id);
            id = next;
        }
        if chain.last().is_some_and(|&tail| tail != node.last_cluster()) {
            return Err(VfsError::BrokenChain(node.last_cluster()));
        }
        Ok(chain)
    }

    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        self.guarded("remove_directory", |v| {
            let id = v.resolve_dir(path)?;
            if id == v.tree.root() {
                return Err(VfsError::DirectoryNotEmpty(ROOT_NAME.to_string()));
            }
            if v.tree.dir(id).is_some_and(|d| !d.is_empty()) {
                return Err(VfsError::DirectoryNotEmpty(path.to_string()));
            }
            if v.tree.ancestry(v.current).contains(&id) {
                v.current = v.tree.parent_of(id).unwrap_or_else(|| v.tree.root());
            }

            v.remove_node(id)?;
            v.tree.remove_directory(id)?;
            v.commit()?;
            debug!("Removed directory {}", path);
            Ok(())
        })
    }

    /// Replace a node's attribute bits (the directory bit is kept)
    pub fn set_flags(&mut self, path: &str, flags: NodeFlags) -> Result<()> {
        self.guarded("set_flags", |v| {
            let id = match v.resolve_file(path) {
                Ok(id) => id,
                Err(VfsError::FileNotFound(_)) => v.resolve_dir(path)?,
                Err(e) => return Err(e),
            };
            v.update_node(id, |n| n.set_flags(flags))?;
            v.commit()?;
            debug!("Set flags of {} to {:?}", path, flags);
            Ok(())
        })
    }

    /// Random-access stream over an existing file
    pub fn file_stream(&mut self, path: &str) -> Result<FileStream<'_>> {
        let id = self.resolve_file(path)?;
        let loc = self.locate_node(id).ok_or(VfsError::NodeNotFound(id))?;
        let Volume {
            container,
            node_blocks,
            ..
        } = self;
        FileStream::new(container, &mut node_blocks[loc.block], loc.slot)
    }

    /// Copy `reader` into a file in the current directory, replacing any
    /// previous contents. Returns the bytes copied.
    pub fn copy(&mut self, reader: &mut impl io::Read, name: &str) -> Result<u64> {
        self.guarded("copy", |v| {
            v.touch_in_current(name)?;
            let copied = {
                let mut stream = v.file_stream(name)?;
                stream.set_length(0)?;
                let mut buf = vec![0u8; COPY_BUFFER_SIZE];
                let mut copied = 0u64;
                loop {
                    let n = match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    };
                    stream.write(&buf[..n])?;
                    copied += n as u64;
                }
                copied
            };
            v.commit()?;
            debug!("Copied {} bytes into {}", copied, name);
            Ok(copied)
        })
    }

    /// Export a file's contents into `writer`
    pub fn copy_to(&mut self, path: &str, writer: &mut impl io::Write) -> Result<u64> {
        let mut stream = self.file_stream(path)?;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            copied += n as u64;
        }
        Ok(copied)
    }

    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut stream = self.file_stream(path)?;
        stream.read_to_end()
    }

    /// Overwrite bytes at `offset`, growing the file if needed
    pub fn patch(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        self.guarded("patch", |v| {
            {
                let mut stream = v.file_stream(path)?;
                stream.seek(SeekFrom::Start(offset))?;
                stream.write(data)?;
            }
            v.commit()?;
            debug!("Patched {} bytes of {} at {}", data.len(), path, offset);
            Ok(())
        })
    }

    pub fn stats(&self) -> Result<VolumeStats> {
        Ok(VolumeStats {
            container: self.container.stats()?,
            directories: self.tree.dir_count(),
            files: self.tree.file_count(),
            node_blocks: self.node_blocks.len(),
            free_node_slots: self.node_blocks.iter().map(NodeCluster::free_slots).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small() -> ContainerConfig {
        ContainerConfig::default().with_cluster_size(4096)
    }

    fn fresh(dir: &TempDir) -> Volume {
        Volume::create(dir.path().join("test.vfs"), "VOL", &small()).unwrap()
    }

    #[test]
    fn test_format_gives_empty_root() {
        let dir = TempDir::new().unwrap();
        let volume = fresh(&dir);

        let root = volume.current_directory().unwrap();
        assert_eq!(root.id(), node_id("ROOT"));
        assert_eq!(root.parent(), NO_PARENT);
        assert!(volume.directories().is_empty());
        assert!(volume.files().is_empty());
        assert_eq!(volume.current_path().unwrap(), "\\");
        assert_eq!(volume.name(), "VOL");
    }

    #[test]
    fn test_node_ids_follow_paths() {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh(&dir);

        let a = volume.create_folder("Docs").unwrap();
        assert_eq!(a.id(), node_id("ROOT\\DOCS"));

        volume.change_to_folder("docs").unwrap();
        let f = volume.touch("a.txt").unwrap();
        assert_eq!(f.id(), node_id("ROOT\\Docs\\a.txt"));
        assert_eq!(volume.current_path().unwrap(), "\\Docs");
    }

    #[test]
    fn test_path_resolution() {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh(&dir);
        volume.create_folder("A").unwrap();
        volume.change_to_folder("A").unwrap();
        volume.create_folder("B").unwrap();
        volume.change_to_folder("B").unwrap();
        volume.touch("leaf.txt").unwrap();
        volume.change_to_root();

        assert_eq!(volume.get_file("\\A\\B\\leaf.txt").unwrap().name(), "leaf.txt");
        assert_eq!(volume.get_file("A\\.\\B\\..\\B\\leaf.txt").unwrap().name(), "leaf.txt");
        assert!(matches!(
            volume.get_file("\\A\\leaf.txt"),
            Err(VfsError::FileNotFound(_))
        ));
        assert!(matches!(
            volume.get_file("\\A\\X\\leaf.txt"),
            Err(VfsError::DirectoryNotFound(_))
        ));
        assert!(matches!(
            volume.get_file("\\A\\B"),
            Err(VfsError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_name_clashes() {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh(&dir);
        volume.create_folder("x").unwrap();

        let err = volume.create_folder("X").unwrap_err();
        assert!(matches!(err.root_cause(), VfsError::DirectoryExists(_)));

        let err = volume.touch("x").unwrap_err();
        assert!(matches!(err.root_cause(), VfsError::DirectoryExists(_)));

        volume.touch("y").unwrap();
        let err = volume.create_folder("y").unwrap_err();
        assert!(matches!(err, VfsError::Resynchronized(_)));
        assert!(matches!(err.root_cause(), VfsError::FileExists(_)));

        // Reload kept everything already persisted
        assert_eq!(volume.directories().len(), 1);
        assert_eq!(volume.files().len(), 1);
    }

    #[test]
    fn test_touch_existing_refreshes_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh(&dir);
        let first = volume.touch("t").unwrap();
        let second = volume.touch("t").unwrap();
        assert_eq!(first.id(), second.id());
        assert!(second.modified_millis() >= first.modified_millis());
        assert_eq!(volume.files().len(), 1);
    }

    #[test]
    fn test_patch_and_read() {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh(&dir);
        volume.copy(&mut &b"hello world"[..], "greeting").unwrap();
        volume.patch("greeting", 6, b"there").unwrap();
        assert_eq!(volume.read_file("greeting").unwrap(), b"hello there");

        volume.patch("greeting", 11, b"!").unwrap();
        assert_eq!(volume.get_file("greeting").unwrap().file_size(), 12);
    }

    #[test]
    fn test_read_only_file_cannot_be_deleted() {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh(&dir);
        volume.touch("locked").unwrap();
        volume.set_flags("locked", NodeFlags::READ_ONLY).unwrap();

        let err = volume.delete_file("locked").unwrap_err();
        assert!(matches!(err.root_cause(), VfsError::ReadOnly(_)));
        assert!(volume.get_file("locked").unwrap().is_read_only());
    }

    #[test]
    fn test_remove_directory_rules() {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh(&dir);
        volume.create_folder("outer").unwrap();
        volume.change_to_folder("outer").unwrap();
        volume.touch("inside").unwrap();
        volume.change_to_root();

        let err = volume.remove_directory("outer").unwrap_err();
        assert!(matches!(err.root_cause(), VfsError::DirectoryNotEmpty(_)));

        volume.delete_file("outer\\inside").unwrap();
        volume.remove_directory("outer").unwrap();
        assert!(volume.directories().is_empty());
    }

    #[test]
    fn test_mutations_stamp_header_modified() {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh(&dir);
        let formatted = volume.container().header().modified();

        std::thread::sleep(std::time::Duration::from_millis(5));
        volume.touch("x").unwrap();
        let touched = volume.container().header().modified();
        assert!(touched > formatted);

        std::thread::sleep(std::time::Duration::from_millis(5));
        volume.create_folder("sub").unwrap();
        assert!(volume.container().header().modified() > touched);
        let stamped = volume.container().header().modified();
        volume.close().unwrap();

        let volume = Volume::open(dir.path().join("test.vfs"), &small()).unwrap();
        assert_eq!(volume.container().header().modified(), stamped);
    }

    #[test]
    fn test_shared_volume() {
        let dir = TempDir::new().unwrap();
        let shared = fresh(&dir).into_shared();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    shared.lock().touch(&format!("file{}", i)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.lock().files().len(), 4);
    }
}
