//! # vaultfs - Single-File Encrypted Virtual File System
//!
//! `vaultfs` stores a whole directory hierarchy inside one host file. The
//! file is split into fixed-size clusters, every one of them framed with a
//! signature, an index and a CRC-32, and node and data payloads are encrypted
//! with AES-128-CBC.
//!
//! - **Containers** (`.dfs`): header, auxiliary records, cluster maps, clusters
//! - **Volumes** (`.vfs`): a container plus node blocks and a directory tree
//! - **Streams**: random-access reads and writes over a file's cluster chain
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vaultfs::{ContainerConfig, Result, Volume};
//!
//! # fn main() -> Result<()> {
//! let config = ContainerConfig::default();
//! let mut volume = Volume::create("data.vfs", "DATA", &config)?;
//!
//! volume.create_folder("docs")?;
//! volume.change_to_folder("docs")?;
//! volume.copy(&mut &b"Hello, World!"[..], "hello.txt")?;
//!
//! let content = volume.read_file("\\docs\\hello.txt")?;
//! assert_eq!(content, b"Hello, World!");
//!
//! volume.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Builder
//!
//! ```rust,no_run
//! use vaultfs::{Result, VolumeBuilder};
//!
//! # fn main() -> Result<()> {
//! let mut volume = VolumeBuilder::new()
//!     .path("secure.vfs")
//!     .name("SECURE")
//!     .cluster_size(8192)
//!     .key([7u8; 16], [9u8; 16])
//!     .build()?;
//!
//! volume.touch("empty.txt")?;
//! # Ok(())
//! # }
//! ```

// Container and file system internals
pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use core::{
    bitmap, cache, cipher, cluster_map, codec, config, container, context, data_cluster, error,
    frame, hash, header, node, node_cluster, stream, tree, volume,
};

// Re-export core types that users need
pub use crate::core::{
    cipher::{Cipher, CipherIv, CipherKey},
    config::ContainerConfig,
    container::{Container, ContainerStats},
    error::{Result, VfsError},
    header::{Header, DEFAULT_CLUSTER_SIZE},
    node::{Node, NodeFlags},
    stream::FileStream,
    volume::{SharedVolume, Volume, VolumeStats, SEPARATOR},
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Conventional extension of a formatted volume
pub const VOLUME_EXTENSION: &str = "vfs";

/// Conventional extension of a bare container
pub const CONTAINER_EXTENSION: &str = "dfs";

/// Listing view of a file or directory
///
/// # Examples
///
/// ```rust,no_run
/// use vaultfs::{ContainerConfig, Volume};
///
/// # fn main() -> vaultfs::Result<()> {
/// let volume = Volume::open("data.vfs", &ContainerConfig::default())?;
/// for entry in volume.list_entries()? {
///     if entry.is_dir {
///         println!("[dir] {}", entry.path);
///     } else {
///         println!("{} ({} bytes)", entry.path, entry.size.unwrap_or(0));
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    /// Node id (hash of the upper-cased path key)
    pub id: u32,

    /// Absolute path, e.g. `\docs\hello.txt`
    pub path: String,

    pub name: String,

    /// Absolute path of the containing directory
    pub parent: String,

    pub is_dir: bool,

    /// File size in bytes (None for directories)
    pub size: Option<u64>,

    /// Creation time as Unix epoch milliseconds
    pub created: i64,

    /// Last modification time as Unix epoch milliseconds
    pub modified: i64,

    /// Raw attribute bits
    pub flags: u32,
}

impl Entry {
    pub(crate) fn from_node(node: &Node, parent: &str) -> Self {
        let name = node.name();
        let path = if parent.ends_with(SEPARATOR) {
            format!("{}{}", parent, name)
        } else {
            format!("{}{}{}", parent, SEPARATOR, name)
        };
        Entry {
            id: node.id(),
            path,
            name,
            parent: parent.to_string(),
            is_dir: node.is_directory(),
            size: (!node.is_directory()).then(|| node.file_size()),
            created: node.created_millis(),
            modified: node.modified_millis(),
            flags: node.flags().bits(),
        }
    }
}

/// Builder for creating or opening volumes
#[derive(Debug, Clone)]
pub struct VolumeBuilder {
    path: Option<PathBuf>,
    name: Option<String>,
    config: ContainerConfig,
}

impl VolumeBuilder {
    pub fn new() -> Self {
        VolumeBuilder {
            path: None,
            name: None,
            config: ContainerConfig::default(),
        }
    }

    /// Host file of the volume
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Volume name stored in the header (defaults to the file stem)
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cluster_size(mut self, cluster_size: usize) -> Self {
        self.config = self.config.with_cluster_size(cluster_size);
        self
    }

    pub fn cluster_map_count(mut self, count: usize) -> Self {
        self.config = self.config.with_cluster_map_count(count);
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_cache_capacity(capacity);
        self
    }

    pub fn key(mut self, key: CipherKey, iv: CipherIv) -> Self {
        self.config = self.config.with_key(&key, &iv);
        self
    }

    fn require_path(&self) -> Result<PathBuf> {
        self.path
            .clone()
            .ok_or_else(|| VfsError::Config("path must be set".to_string()))
    }

    /// Create and format a new volume
    pub fn build(self) -> Result<Volume> {
        let path = self.require_path()?;
        let name = match self.name {
            Some(name) => name,
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        info!("Building volume '{}' at {:?}", name, path);
        Volume::create(&path, &name, &self.config)
    }

    /// Open an existing volume with this builder's key material
    pub fn open(self) -> Result<Volume> {
        let path = self.require_path()?;
        Volume::open(&path, &self.config)
    }
}

impl Default for VolumeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
