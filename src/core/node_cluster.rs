//! Node clusters: fixed-capacity blocks of node records
//!
//! Payload layout:
//!
//! ```text
//! next_block: i32 | reserved: [u8; 12] | node_map: [u32; words] | nodes: [Node; n]
//! ```

use crate::bitmap::Bitmap;
use crate::codec::{FieldReader, FieldWriter};
use crate::error::{Result, VfsError};
use crate::frame::{payload_capacity, Persistable};
use crate::hash::signature_of;
use crate::node::{Node, NodeFlags, NODE_RECORD_SIZE, NO_CLUSTER};

/// next_block + reserved
const BLOCK_HEADER_SIZE: usize = 16;

/// Cluster index of the first node block: the reserved slot between the
/// cluster maps and cluster 0. No block ever links back to it, so the shared
/// `-1` value is unambiguous as a `next_block` terminator.
pub const HEAD_BLOCK_ID: i32 = -1;

#[derive(Debug, Clone)]
pub struct NodeCluster {
    cluster_id: i32,
    next_block: i32,
    node_map: Bitmap,
    nodes: Vec<Option<Node>>,
    dirty: bool,
}

impl NodeCluster {
    pub fn new(cluster_id: i32, cluster_size: usize) -> Self {
        let count = Self::nodes_per_block(cluster_size);
        NodeCluster {
            cluster_id,
            next_block: NO_CLUSTER,
            node_map: Bitmap::new(count),
            nodes: vec![None; count],
            dirty: true,
        }
    }

    /// Largest n with header + bitmap + n node records inside the payload
    pub fn nodes_per_block(cluster_size: usize) -> usize {
        let available = payload_capacity(cluster_size).saturating_sub(BLOCK_HEADER_SIZE);
        let mut n = available / NODE_RECORD_SIZE;
        while n > 0 && n * NODE_RECORD_SIZE + Bitmap::words_for(n) * 4 > available {
            n -= 1;
        }
        n
    }

    pub fn cluster_id(&self) -> i32 {
        self.cluster_id
    }

    pub fn next_block(&self) -> i32 {
        self.next_block
    }

    pub fn set_next_block(&mut self, next: i32) {
        if self.next_block != next {
            self.next_block = next;
            self.dirty = true;
        }
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn free_slots(&self) -> usize {
        self.node_map.free()
    }

    pub fn has_free_slot(&self) -> bool {
        self.node_map.free() > 0
    }

    /// Place a new node in the first free slot; returns the slot index
    pub fn create_node(&mut self, id: u32, parent: u32, name: &str, flags: NodeFlags) -> Result<usize> {
        let slot = self
            .node_map
            .first_free()
            .ok_or(VfsError::NoFreeNodeSlot(self.cluster_id))?;
        self.node_map.set(slot, true);
        self.nodes[slot] = Some(Node::new(id, parent, name, flags));
        self.dirty = true;
        Ok(slot)
    }

    /// Clear the slot holding `id`
    pub fn remove_node(&mut self, id: u32) -> Result<Node> {
        let slot = self.slot_of(id).ok_or(VfsError::NodeNotFound(id))?;
        self.node_map.set(slot, false);
        self.dirty = true;
        self.nodes[slot].take().ok_or(VfsError::NodeNotFound(id))
    }

    pub fn slot_of(&self, id: u32) -> Option<usize> {
        self.occupied().find(|(_, n)| n.id() == id).map(|(slot, _)| slot)
    }

    pub fn find_node(&self, id: u32) -> Option<&Node> {
        self.occupied().find(|(_, n)| n.id() == id).map(|(_, n)| n)
    }

    /// Case-insensitive name scan over occupied slots
    pub fn find_node_by_name(&self, name: &str) -> Option<&Node> {
        self.occupied().find(|(_, n)| n.name_matches(name)).map(|(_, n)| n)
    }

    pub fn node(&self, slot: usize) -> Option<&Node> {
        self.nodes.get(slot).and_then(Option::as_ref)
    }

    /// Overwrite an occupied slot
    pub fn replace_node(&mut self, slot: usize, node: Node) -> Result<()> {
        match self.nodes.get_mut(slot) {
            Some(entry @ Some(_)) => {
                *entry = Some(node);
                self.dirty = true;
                Ok(())
            }
            _ => Err(VfsError::NodeNotFound(node.id())),
        }
    }

    /// Occupied slots in slot order
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(slot, n)| n.as_ref().map(|n| (slot, n)))
    }
}

impl Persistable for NodeCluster {
    const SIGNATURE: u32 = signature_of("NodeCluster");
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
        self.next_block = r.i32();
        r.skip(BLOCK_HEADER_SIZE - 4);
        self.node_map.decode(&mut r);

        for slot in 0..self.nodes.len() {
            self.nodes[slot] = if self.node_map.get(slot) {
                Some(Node::decode(&mut r))
            } else {
                r.skip(NODE_RECORD_SIZE);
                None
            };
        }
        Ok(())
    }

    fn write_user_data(&self, payload: &mut [u8]) {
        let mut w = FieldWriter::new(payload);
        w.i32(self.next_block);
        w.skip(BLOCK_HEADER_SIZE - 4);
        self.node_map.encode(&mut w);

        for node in &self.nodes {
            match node {
                Some(node) => node.encode(&mut w),
                None => w.skip(NODE_RECORD_SIZE),
            }
        }
    }
}
