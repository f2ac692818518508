//! Container geometry and cipher configuration
//!
//! Loadable from TOML:
//!
//! ```toml
//! cluster_size = 32768
//! cluster_map_count = 1
//! container_sizes = [4096]
//! cache_capacity = 64
//! key = "000102030405060708090a0b0c0d0e0f"
//! iv = "0f0e0d0c0b0a09080706050403020100"
//! ```

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::cipher::{Cipher, BLOCK_SIZE};
use crate::cluster_map::ClusterMap;
use crate::error::{Result, VfsError};
use crate::header::{DEFAULT_CLUSTER_SIZE, MAX_CONTAINERS};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MIN_CLUSTER_SIZE: usize = 1024;
pub const MAX_CLUSTER_SIZE: usize = 1024 * 1024;

/// Smallest container record that still carries a length prefix
pub const MIN_CONTAINER_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Bytes per cluster (and per cluster map)
    pub cluster_size: usize,

    /// Number of allocation bitmaps
    pub cluster_map_count: usize,

    /// Byte size of each auxiliary container record
    pub container_sizes: Vec<usize>,

    /// Clusters held by the write-back cache
    pub cache_capacity: usize,

    /// Build number stamped into new headers
    pub build: i32,

    /// Hex-encoded AES-128 key replacing the embedded one
    pub key: Option<String>,

    /// Hex-encoded IV replacing the embedded one
    pub iv: Option<String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        ContainerConfig {
            cluster_size: DEFAULT_CLUSTER_SIZE,
            cluster_map_count: 1,
            container_sizes: Vec::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            build: 1,
            key: None,
            iv: None,
        }
    }
}

impl ContainerConfig {
    pub fn with_cluster_size(mut self, cluster_size: usize) -> Self {
        self.cluster_size = cluster_size;
        self
    }

    pub fn with_cluster_map_count(mut self, count: usize) -> Self {
        self.cluster_map_count = count;
        self
    }

    pub fn with_container_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.container_sizes = sizes;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Use a custom key, hex encoded
    pub fn with_key(mut self, key: &[u8; 16], iv: &[u8; 16]) -> Self {
        self.key = Some(hex::encode(key));
        self.iv = Some(hex::encode(iv));
        self
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ContainerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Check geometry and cipher material
    pub fn validate(&self) -> Result<()> {
        validate_geometry(self.cluster_size, self.cluster_map_count)?;

        if self.container_sizes.len() > MAX_CONTAINERS {
            return Err(VfsError::Config(format!(
                "At most {} container records are supported",
                MAX_CONTAINERS
            )));
        }
        validate_container_sizes(&self.container_sizes)?;

        if self.cache_capacity == 0 {
            return Err(VfsError::Config("Cache capacity must be at least 1".to_string()));
        }

        self.cipher()?;
        Ok(())
    }

    /// Cipher for this configuration: embedded key unless both key and IV are set
    pub fn cipher(&self) -> Result<Cipher> {
        match (&self.key, &self.iv) {
            (None, None) => Ok(Cipher::default()),
            (Some(key), Some(iv)) => Ok(Cipher::new(decode_block(key, "key")?, decode_block(iv, "iv")?)),
            _ => Err(VfsError::Config("Key and IV must be configured together".to_string())),
        }
    }
}

/// Cluster geometry shared by configuration and headers read from disk
pub fn validate_geometry(cluster_size: usize, cluster_map_count: usize) -> Result<()> {
    if !(MIN_CLUSTER_SIZE..=MAX_CLUSTER_SIZE).contains(&cluster_size) || cluster_size % BLOCK_SIZE != 0 {
        return Err(VfsError::Config(format!(
            "Cluster size {} must be a multiple of {} between {} and {}",
            cluster_size, BLOCK_SIZE, MIN_CLUSTER_SIZE, MAX_CLUSTER_SIZE
        )));
    }

    if cluster_map_count == 0 {
        return Err(VfsError::Config("At least one cluster map is required".to_string()));
    }

    let slots = ClusterMap::slots_per_map(cluster_size) as u64 * cluster_map_count as u64;
    if slots >= i32::MAX as u64 {
        return Err(VfsError::Config(format!(
            "{} cluster maps address more than {} clusters",
            cluster_map_count,
            i32::MAX
        )));
    }

    Ok(())
}

/// Container record sizes shared by configuration and headers read from disk
pub fn validate_container_sizes(sizes: &[usize]) -> Result<()> {
    let mut total: u64 = 0;
    for (i, &size) in sizes.iter().enumerate() {
        if size < MIN_CONTAINER_SIZE || size % BLOCK_SIZE != 0 || size > i32::MAX as usize {
            return Err(VfsError::Config(format!(
                "Container {} size {} must be at least {} and a multiple of {}",
                i, size, MIN_CONTAINER_SIZE, BLOCK_SIZE
            )));
        }
        total = total
            .checked_add(size as u64)
            .filter(|&t| t <= i64::MAX as u64)
            .ok_or_else(|| VfsError::Config("Container sizes overflow the file offset range".to_string()))?;
    }
    Ok(())
}

fn decode_block(text: &str, what: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(text).map_err(|e| VfsError::Config(format!("Invalid {} hex: {}", what, e)))?;
    <[u8; 16]>::try_from(bytes.as_slice())
        .map_err(|_| VfsError::Config(format!("The {} must be 16 bytes, got {}", what, bytes.len())))
}
