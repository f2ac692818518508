use thiserror::Error;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("Signature mismatch at offset {offset}: expected {expected:#010x}, found {found:#010x}")]
    SignatureMismatch {
        offset: u64,
        expected: u32,
        found: u32,
    },

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("CRC mismatch at offset {offset}: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        offset: u64,
        stored: u32,
        computed: u32,
    },

    #[error("Record at offset {offset} belongs to index {found}, expected {expected}")]
    MisplacedRecord {
        offset: u64,
        expected: i32,
        found: i32,
    },

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Cipher failure: {0}")]
    Cipher(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Root directory not found")]
    RootNotFound,

    #[error("Node not found: {0:#010x}")]
    NodeNotFound(u32),

    #[error("Directory already exists: {0}")]
    DirectoryExists(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Orphan node {id:#010x}: parent {parent:#010x} does not exist (lost and found)")]
    OrphanNode { id: u32, parent: u32 },

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Node is read-only: {0}")]
    ReadOnly(String),

    #[error("Invalid cluster id: {0}")]
    InvalidClusterId(i64),

    #[error("Broken cluster chain at cluster {0}")]
    BrokenChain(i32),

    #[error("Cluster {0} is cached as a different kind")]
    ClusterKindMismatch(i32),

    #[error("Invalid seek to negative position {0}")]
    InvalidSeek(i64),

    #[error("Out of space: no free cluster slot available")]
    NoFreeCluster,

    #[error("Node block {0} has no free node slot")]
    NoFreeNodeSlot(i32),

    #[error("File too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("Record too large: {size} bytes (capacity {capacity})")]
    RecordTooLarge { size: usize, capacity: usize },

    #[error("Container record index out of range: {0}")]
    InvalidRecordIndex(usize),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Operation failed and the volume was reloaded from disk: {0}")]
    Resynchronized(#[source] Box<VfsError>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VfsError {
    /// Structural failures leave the in-memory model suspect; the volume
    /// reloads from disk before surfacing them.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            VfsError::DirectoryNotFound(_)
                | VfsError::FileNotFound(_)
                | VfsError::RootNotFound
                | VfsError::NodeNotFound(_)
                | VfsError::DirectoryExists(_)
                | VfsError::FileExists(_)
                | VfsError::DirectoryNotEmpty(_)
                | VfsError::OrphanNode { .. }
                | VfsError::InvalidName(_)
                | VfsError::ReadOnly(_)
                | VfsError::BrokenChain(_)
                | VfsError::ClusterKindMismatch(_)
        )
    }

    /// Signature, version and checksum failures.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            VfsError::SignatureMismatch { .. }
                | VfsError::UnsupportedVersion(_)
                | VfsError::CrcMismatch { .. }
                | VfsError::MisplacedRecord { .. }
                | VfsError::InvalidHeader(_)
                | VfsError::Cipher(_)
        )
    }

    /// Unwraps a [`VfsError::Resynchronized`] wrapper, if any.
    pub fn root_cause(&self) -> &VfsError {
        match self {
            VfsError::Resynchronized(inner) => inner.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, VfsError>;
