//! Compact wire encodings from BEP 5.
//!
//! - Compact node: `id[20] || ip4[4] || port_be[2]`, 26 bytes, packed
//!   back to back in a `nodes` byte string.
//! - Compact peer: `ip4[4] || port_be[2]`, 6 bytes, one per entry of a
//!   `values` list (the codec itself lives on
//!   `zest_primitives::PeerAddr`).

use zest_primitives::{NodeId, PeerAddr};

use super::routing_table::NodeEntry;
use super::Error;

/// Size of one compact node entry.
pub const COMPACT_NODE_LEN: usize = 26;

/// Encodes nodes back to back into a `nodes` byte string.
#[must_use]
pub fn encode_nodes(nodes: &[NodeEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nodes.len() * COMPACT_NODE_LEN);
    for node in nodes {
        out.extend_from_slice(&node.id.0);
        out.extend_from_slice(&node.addr.to_compact());
    }
    out
}

/// Decodes a `nodes` byte string.
///
/// # Errors
///
/// Fails when the length is not a multiple of 26 bytes.
pub fn decode_nodes(bytes: &[u8]) -> Result<Vec<NodeEntry>, Error> {
    if bytes.len() % COMPACT_NODE_LEN != 0 {
        return Err(Error::Malformed { what: "compact nodes" });
    }

    let mut nodes = Vec::with_capacity(bytes.len() / COMPACT_NODE_LEN);
    for chunk in bytes.chunks_exact(COMPACT_NODE_LEN) {
        let id: [u8; 20] = chunk[..20].try_into().expect("chunk is 26 bytes");
        let addr = PeerAddr::from_compact(&chunk[20..]).expect("chunk tail is 6 bytes");
        nodes.push(NodeEntry {
            id: NodeId(id),
            addr,
        });
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use zest_primitives::{NodeId, PeerAddr};

    use super::{decode_nodes, encode_nodes};
    use crate::dht::routing_table::NodeEntry;

    #[test]
    fn a_compact_node_lays_out_id_ip_then_big_endian_port() {
        let node = NodeEntry {
            id: NodeId([0xAB; 20]),
            addr: PeerAddr::new(Ipv4Addr::new(192, 168, 1, 1), 6881),
        };

        let bytes = encode_nodes(&[node]);

        assert_eq!(bytes.len(), 26);
        assert_eq!(&bytes[..20], &[0xAB; 20]);
        assert_eq!(&bytes[20..24], &[0xC0, 0xA8, 0x01, 0x01]);
        assert_eq!(&bytes[24..26], &[0x1A, 0xE1]);
    }

    #[test]
    fn nodes_round_trip_in_order() {
        let nodes = vec![
            NodeEntry {
                id: NodeId([1; 20]),
                addr: PeerAddr::new(Ipv4Addr::new(10, 0, 0, 1), 6881),
            },
            NodeEntry {
                id: NodeId([2; 20]),
                addr: PeerAddr::new(Ipv4Addr::new(10, 0, 0, 2), 6882),
            },
        ];

        assert_eq!(decode_nodes(&encode_nodes(&nodes)).unwrap(), nodes);
    }

    #[test]
    fn a_ragged_nodes_string_is_rejected() {
        assert!(decode_nodes(&[0u8; 27]).is_err());
        assert!(decode_nodes(&[0u8; 25]).is_err());
        assert!(decode_nodes(&[]).unwrap().is_empty());
    }
}
