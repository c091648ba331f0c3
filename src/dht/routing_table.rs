//! The Kademlia routing table.
//!
//! 160 buckets, one per possible position of the highest bit in which a
//! foreign node id differs from ours; each holds up to [`K`] entries.
//! Insertion is deliberately simple: update in place on a matching id,
//! append while there is room, drop the newcomer when the bucket is
//! full.

use zest_primitives::{NodeId, PeerAddr};

/// Bucket capacity, the Kademlia `k` parameter.
pub const K: usize = 8;

/// Number of buckets: one per id bit.
pub const ID_BITS: usize = 160;

/// A known node: identity plus UDP transport address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEntry {
    pub id: NodeId,
    pub addr: PeerAddr,
}

/// Byte-wise XOR of two ids, read as a big-endian 160-bit distance.
#[must_use]
pub fn xor_distance(a: &[u8; 20], b: &[u8; 20]) -> [u8; 20] {
    let mut distance = [0u8; 20];
    for (out, (x, y)) in distance.iter_mut().zip(a.iter().zip(b.iter())) {
        *out = x ^ y;
    }
    distance
}

/// Whether `a` is strictly closer to `target` than `b` is.
#[must_use]
pub fn is_closer(target: &[u8; 20], a: &[u8; 20], b: &[u8; 20]) -> bool {
    xor_distance(a, target) < xor_distance(b, target)
}

/// Index of the highest differing bit between two ids: `0` for the most
/// significant bit of byte 0, `159` for the least significant bit of
/// byte 19. `None` when the ids are equal.
#[must_use]
pub fn bucket_index(own: &NodeId, other: &NodeId) -> Option<usize> {
    let distance = xor_distance(&own.0, &other.0);
    for (byte_index, byte) in distance.iter().enumerate() {
        if *byte != 0 {
            return Some(byte_index * 8 + byte.leading_zeros() as usize);
        }
    }
    None
}

/// The table itself. Single-task use; callers sharing it across tasks
/// wrap it in their own lock.
pub struct RoutingTable {
    own_id: NodeId,
    buckets: Vec<Vec<NodeEntry>>,
}

impl RoutingTable {
    #[must_use]
    pub fn new(own_id: NodeId) -> Self {
        Self {
            own_id,
            buckets: vec![Vec::new(); ID_BITS],
        }
    }

    #[must_use]
    pub fn own_id(&self) -> NodeId {
        self.own_id
    }

    /// Inserts or refreshes a node.
    ///
    /// A matching id updates the stored address in place; otherwise the
    /// node is appended if its bucket has room and dropped if not. Our
    /// own id is never stored.
    pub fn insert(&mut self, node: NodeEntry) {
        let Some(index) = bucket_index(&self.own_id, &node.id) else {
            return;
        };
        let bucket = &mut self.buckets[index];

        if let Some(existing) = bucket.iter_mut().find(|entry| entry.id == node.id) {
            *existing = node;
            return;
        }
        if bucket.len() < K {
            bucket.push(node);
        }
    }

    /// Removes the node with `id`, keeping its bucket contiguous.
    pub fn remove(&mut self, id: &NodeId) {
        if let Some(index) = bucket_index(&self.own_id, id) {
            self.buckets[index].retain(|entry| entry.id != *id);
        }
    }

    /// The up-to-[`K`] known nodes closest to `target` by XOR distance.
    #[must_use]
    pub fn find_closest(&self, target: &[u8; 20]) -> Vec<NodeEntry> {
        let mut nodes: Vec<NodeEntry> = self.buckets.iter().flatten().copied().collect();
        nodes.sort_by(|a, b| xor_distance(&a.id.0, target).cmp(&xor_distance(&b.id.0, target)));
        nodes.truncate(K);
        nodes
    }

    /// Total entries across all buckets.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }
}
