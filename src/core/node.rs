//! File and directory descriptors

use crate::codec::{decode_name, encode_name, FieldReader, FieldWriter};
use crate::error::{Result, VfsError};
use bitflags::bitflags;
use chrono::{DateTime, TimeZone, Utc};

/// On-disk slot size of one node
pub const NODE_RECORD_SIZE: usize = 128;

/// Maximum encoded name length in bytes
pub const NAME_LEN: usize = 32;

/// Parent id of the root node
pub const NO_PARENT: u32 = 0xFFFF_FFFF;

/// Sentinel for "no cluster" in chains and node fields
pub const NO_CLUSTER: i32 = -1;

bitflags! {
    /// Node attribute bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u32 {
        const HIDDEN = 1 << 0;
        const ARCHIVE = 1 << 1;
        const READ_ONLY = 1 << 2;
        const ENCRYPTED = 1 << 3;
        const SYMLINK = 1 << 4;
        const TRANSFORMED = 1 << 5;
        const SYSTEM_USE_ONLY = 1 << 6;
        const DIRECTORY = 1 << 7;
    }
}

/// Current time in the node/header timestamp unit (Unix epoch milliseconds)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// One file-or-directory descriptor
///
/// Metadata only; file content lives in a data cluster chain running from
/// `first_cluster` to `last_cluster`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: u32,
    parent: u32,
    flags: NodeFlags,
    name: [u8; NAME_LEN],
    file_size: i32,
    cluster_count: i32,
    created: i64,
    modified: i64,
    first_cluster: i32,
    last_cluster: i32,
}

impl Node {
    pub fn new(id: u32, parent: u32, name: &str, flags: NodeFlags) -> Self {
        let now = now_millis();
        Node {
            id,
            parent,
            flags,
            name: encode_name(name),
            file_size: 0,
            cluster_count: 0,
            created: now,
            modified: now,
            first_cluster: NO_CLUSTER,
            last_cluster: NO_CLUSTER,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn parent(&self) -> u32 {
        self.parent
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn name(&self) -> String {
        decode_name(&self.name)
    }

    /// Case-insensitive name comparison
    pub fn name_matches(&self, name: &str) -> bool {
        self.name().to_uppercase() == name.to_uppercase()
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(NodeFlags::DIRECTORY)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(NodeFlags::READ_ONLY)
    }

    pub fn file_size(&self) -> u64 {
        self.file_size.max(0) as u64
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count.max(0) as u32
    }

    pub fn first_cluster(&self) -> i32 {
        self.first_cluster
    }

    pub fn last_cluster(&self) -> i32 {
        self.last_cluster
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.created)
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.modified)
    }

    pub fn created_millis(&self) -> i64 {
        self.created
    }

    pub fn modified_millis(&self) -> i64 {
        self.modified
    }

    /// Replace attribute bits; the directory bit is preserved
    pub fn set_flags(&mut self, flags: NodeFlags) {
        let directory = self.flags & NodeFlags::DIRECTORY;
        self.flags = (flags - NodeFlags::DIRECTORY) | directory;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.modified = now_millis();
    }

    pub(crate) fn set_file_size(&mut self, size: u64) -> Result<()> {
        self.file_size = i32::try_from(size).map_err(|_| VfsError::FileTooLarge(size))?;
        self.touch();
        Ok(())
    }

    /// Append a cluster id as the new tail of the chain
    pub(crate) fn push_cluster(&mut self, id: i32) {
        if self.cluster_count == 0 {
            self.first_cluster = id;
        }
        self.last_cluster = id;
        self.cluster_count += 1;
    }

    /// Drop the tail; `previous` becomes the new tail
    pub(crate) fn pop_cluster(&mut self, previous: i32) {
        self.cluster_count -= 1;
        if self.cluster_count <= 0 {
            self.cluster_count = 0;
            self.first_cluster = NO_CLUSTER;
            self.last_cluster = NO_CLUSTER;
        } else {
            self.last_cluster = previous;
        }
    }

    /// `cluster_count == 0` exactly when both chain ends are unset
    pub fn chain_is_consistent(&self) -> bool {
        let empty = self.first_cluster == NO_CLUSTER && self.last_cluster == NO_CLUSTER;
        (self.cluster_count == 0) == empty && !(self.is_directory() && !empty)
    }

    pub(crate) fn encode(&self, w: &mut FieldWriter<'_>) {
        let start = w.position();
        w.u32(self.id);
        w.u32(self.parent);
        w.u32(self.flags.bits());
        w.put(&self.name);
        w.i32(self.file_size);
        w.i32(self.cluster_count);
        w.i64(self.created);
        w.i64(self.modified);
        w.i32(self.first_cluster);
        w.i32(self.last_cluster);
        w.skip(NODE_RECORD_SIZE - (w.position() - start));
    }

    pub(crate) fn decode(r: &mut FieldReader<'_>) -> Self {
        let start = r.position();
        let node = Node {
            id: r.u32(),
            parent: r.u32(),
            flags: NodeFlags::from_bits_retain(r.u32()),
            name: r.array::<NAME_LEN>(),
            file_size: r.i32(),
            cluster_count: r.i32(),
            created: r.i64(),
            modified: r.i64(),
            first_cluster: r.i32(),
            last_cluster: r.i32(),
        };
        r.skip(NODE_RECORD_SIZE - (r.position() - start));
        node
    }
}

/// Validate a single path segment used as a node name
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.len() > NAME_LEN
        || name == "."
        || name == ".."
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(VfsError::InvalidName(name.to_string()));
    }
    Ok(())
}
