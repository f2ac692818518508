//! Container and file system internals

pub mod bitmap;
pub mod cache;
pub mod cipher;
pub mod cluster_map;
pub mod codec;
pub mod config;
pub mod container;
pub mod context;
pub mod data_cluster;
pub mod error;
pub mod frame;
pub mod hash;
pub mod header;
pub mod node;
pub mod node_cluster;
pub mod stream;
pub mod tree;
pub mod volume;

pub use container::Container;
pub use volume::Volume;
