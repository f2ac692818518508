//! In-memory directory hierarchy rebuilt from node records
//!
//! The tree stores ids only. Node metadata stays in the node blocks.

use crate::error::{Result, VfsError};
use crate::hash::node_id;
use crate::node::{Node, NO_PARENT};
use std::collections::HashMap;

/// Key hashed into the root node id
pub const ROOT_KEY: &str = "ROOT";

/// Id of the root directory node
pub fn root_id() -> u32 {
    node_id(ROOT_KEY)
}

/// One directory in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDir {
    pub id: u32,
    pub parent: Option<u32>,
    pub children: Vec<u32>,
    pub files: Vec<u32>,
}

impl TreeDir {
    fn new(id: u32, parent: Option<u32>) -> Self {
        TreeDir {
            id,
            parent,
            children: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.files.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryTree {
    root: u32,
    dirs: HashMap<u32, TreeDir>,
    file_parents: HashMap<u32, u32>,
}

impl DirectoryTree {
    /// Rebuild the hierarchy from every occupied node.
    ///
    /// Files attach to their parent directory first; a file without one is an
    /// orphan. Directories then merge bottom-up: each pass attaches every
    /// pending directory that has no pending children. A pass without
    /// progress means an orphan (or a cycle). The last directory standing
    /// must be the root.
    pub fn build<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Result<Self> {
        let mut order: HashMap<u32, usize> = HashMap::new();
        let mut dir_nodes: Vec<&Node> = Vec::new();
        let mut file_nodes: Vec<&Node> = Vec::new();

        for (discovered, node) in nodes.into_iter().enumerate() {
            order.insert(node.id(), discovered);
            if node.is_directory() {
                dir_nodes.push(node);
            } else {
                file_nodes.push(node);
            }
        }

        let mut dirs: HashMap<u32, TreeDir> = dir_nodes
            .iter()
            .map(|d| {
                let parent = (d.parent() != NO_PARENT).then_some(d.parent());
                (d.id(), TreeDir::new(d.id(), parent))
            })
            .collect();

        let mut file_parents = HashMap::new();
        for file in &file_nodes {
            let parent = dir_nodes
                .iter()
                .find(|d| d.id() == file.parent())
                .map(|d| d.id())
                .ok_or(VfsError::OrphanNode {
                    id: file.id(),
                    parent: file.parent(),
                })?;
            if let Some(dir) = dirs.get_mut(&parent) {
                dir.files.push(file.id());
            }
            file_parents.insert(file.id(), parent);
        }

        let mut pending: Vec<&Node> = dir_nodes.clone();
        while pending.len() > 1 {
            let mut merged = Vec::new();
            for (i, dir) in pending.iter().enumerate() {
                let has_pending_child = pending.iter().any(|other| other.parent() == dir.id());
                let parent_known = dirs.contains_key(&dir.parent()) && dir.parent() != dir.id();
                if !has_pending_child && parent_known {
                    merged.push(i);
                }
            }

            if merged.is_empty() {
                let stuck = pending
                    .iter()
                    .find(|d| d.parent() != NO_PARENT)
                    .unwrap_or(&pending[0]);
                return Err(VfsError::OrphanNode {
                    id: stuck.id(),
                    parent: stuck.parent(),
                });
            }

            for &i in &merged {
                let dir = pending[i];
                if let Some(parent) = dirs.get_mut(&dir.parent()) {
                    parent.children.push(dir.id());
                }
            }
            let mut index = 0;
            pending.retain(|_| {
                let keep = !merged.contains(&index);
                index += 1;
                keep
            });
        }

        let root = match pending.first() {
            Some(last) if pending.len() == 1 && last.id() == root_id() && last.parent() == NO_PARENT => {
                last.id()
            }
            _ => return Err(VfsError::RootNotFound),
        };

        for dir in dirs.values_mut() {
            dir.children.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
        }

        Ok(DirectoryTree {
            root,
            dirs,
            file_parents,
        })
    }

    /// Tree holding only the root directory
    pub fn with_root() -> Self {
        let root = root_id();
        let mut dirs = HashMap::new();
        dirs.insert(root, TreeDir::new(root, None));
        DirectoryTree {
            root,
            dirs,
            file_parents: HashMap::new(),
        }
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn dir(&self, id: u32) -> Option<&TreeDir> {
        self.dirs.get(&id)
    }

    pub fn contains_dir(&self, id: u32) -> bool {
        self.dirs.contains_key(&id)
    }

    pub fn contains_file(&self, id: u32) -> bool {
        self.file_parents.contains_key(&id)
    }

    pub fn parent_of(&self, id: u32) -> Option<u32> {
        self.dirs
            .get(&id)
            .and_then(|d| d.parent)
            .or_else(|| self.file_parents.get(&id).copied())
    }

    pub fn children(&self, id: u32) -> &[u32] {
        self.dirs.get(&id).map(|d| d.children.as_slice()).unwrap_or(&[])
    }

    pub fn files(&self, id: u32) -> &[u32] {
        self.dirs.get(&id).map(|d| d.files.as_slice()).unwrap_or(&[])
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn file_count(&self) -> usize {
        self.file_parents.len()
    }

    /// Directory ids from the root down to `id`, inclusive
    pub fn ancestry(&self, id: u32) -> Vec<u32> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.dirs.get(&current).and_then(|d| d.parent) {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    pub fn add_directory(&mut self, parent: u32, id: u32) -> Result<()> {
        let dir = self.dirs.get_mut(&parent).ok_or(VfsError::NodeNotFound(parent))?;
        dir.children.push(id);
        self.dirs.insert(id, TreeDir::new(id, Some(parent)));
        Ok(())
    }

    pub fn add_file(&mut self, parent: u32, id: u32) -> Result<()> {
        let dir = self.dirs.get_mut(&parent).ok_or(VfsError::NodeNotFound(parent))?;
        dir.files.push(id);
        self.file_parents.insert(id, parent);
        Ok(())
    }

    pub fn remove_file(&mut self, id: u32) -> Result<()> {
        let parent = self.file_parents.remove(&id).ok_or(VfsError::NodeNotFound(id))?;
        if let Some(dir) = self.dirs.get_mut(&parent) {
            dir.files.retain(|&f| f != id);
        }
        Ok(())
    }

    /// Remove an empty, non-root directory
    pub fn remove_directory(&mut self, id: u32) -> Result<()> {
        let dir = self.dirs.get(&id).ok_or(VfsError::NodeNotFound(id))?;
        if id == self.root || !dir.is_empty() {
            return Err(VfsError::DirectoryNotEmpty(format!("{:#010x}", id)));
        }
        let parent = dir.parent;
        if let Some(parent) = parent.and_then(|p| self.dirs.get_mut(&p)) {
            parent.children.retain(|&c| c != id);
        }
        self.dirs.remove(&id);
        Ok(())
    }
}
