//! Peer-facing identities and transport addresses.
//!
//! A zest process owns one [`PeerId`] and one [`NodeId`] for its whole
//! lifetime. Both are generated once at startup and passed explicitly to
//! the components that need them; nothing in the crate regenerates them.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use rand::Rng;
use thiserror::Error;

const ID_BYTES_LEN: usize = 20;

/// Client identifier prefix, Azureus style: `-<2 letters><4 digits>-`.
const PEER_ID_PREFIX: &[u8; 8] = b"-ZS0001-";

/// 20-byte peer identity sent in the `BitTorrent` handshake.
///
/// The first 8 bytes identify the client implementation and version; the
/// remaining 12 are random per process start.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct PeerId(pub [u8; ID_BYTES_LEN]);

impl PeerId {
    /// Generates the process peer id: client prefix plus a random tail.
    #[must_use]
    pub fn generate() -> Self {
        let mut id = [0u8; ID_BYTES_LEN];
        id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
        rand::thread_rng().fill(&mut id[PEER_ID_PREFIX.len()..]);
        Self(id)
    }

    #[must_use]
    pub fn bytes(&self) -> [u8; ID_BYTES_LEN] {
        self.0
    }

    /// The 8-byte client identifier at the front of the id.
    #[must_use]
    pub fn client_prefix(&self) -> &[u8] {
        &self.0[..PEER_ID_PREFIX.len()]
    }
}

impl From<[u8; ID_BYTES_LEN]> for PeerId {
    fn from(bytes: [u8; ID_BYTES_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "%{byte:02x}")?;
            }
        }
        Ok(())
    }
}

/// 20-byte DHT node identity, random per process start.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct NodeId(pub [u8; ID_BYTES_LEN]);

impl NodeId {
    #[must_use]
    pub fn generate() -> Self {
        let mut id = [0u8; ID_BYTES_LEN];
        rand::thread_rng().fill(&mut id);
        Self(id)
    }

    #[must_use]
    pub fn bytes(&self) -> [u8; ID_BYTES_LEN] {
        self.0
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; ID_BYTES_LEN]> for NodeId {
    fn from(bytes: [u8; ID_BYTES_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [0u8; ID_BYTES_LEN * 2];
        binascii::bin2hex(&self.0, &mut chars).expect("failed to hexlify");
        write!(f, "{}", std::str::from_utf8(&chars).unwrap())
    }
}

/// Error converting a transport address into a [`PeerAddr`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerAddrError {
    /// Only IPv4 peers exist on the compact wire encodings.
    #[error("peer addresses must be IPv4, got {0}")]
    NotIpv4(SocketAddr),
    /// A compact peer is exactly 6 bytes.
    #[error("compact peer encoding must be 6 bytes, got {0}")]
    InvalidCompactLength(usize),
    /// A textual address that does not parse as `ip:port`.
    #[error("not a valid IPv4 `ip:port` address: {0}")]
    InvalidAddress(String),
}

/// IPv4 transport address of a peer.
///
/// This is the connection-pool key: the 4 address bytes and the port
/// pack into a single `u64` so pool lookups hash an integer instead of a
/// socket address struct.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct PeerAddr {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddr {
    #[must_use]
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Packs the address into a `u64` key: 4 IP bytes then 2 port bytes.
    #[must_use]
    pub fn pool_key(&self) -> u64 {
        let ip = self.ip.octets();
        (u64::from(u32::from_be_bytes(ip)) << 16) | u64::from(self.port)
    }

    /// Encodes the 6-byte compact form: `ip4[4] || port_be[2]`.
    #[must_use]
    pub fn to_compact(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[..4].copy_from_slice(&self.ip.octets());
        out[4..].copy_from_slice(&self.port.to_be_bytes());
        out
    }

    /// Decodes the 6-byte compact form.
    ///
    /// # Errors
    ///
    /// Fails unless `bytes` is exactly 6 bytes long.
    pub fn from_compact(bytes: &[u8]) -> Result<Self, PeerAddrError> {
        if bytes.len() != 6 {
            return Err(PeerAddrError::InvalidCompactLength(bytes.len()));
        }
        Ok(Self {
            ip: Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]),
            port: u16::from_be_bytes([bytes[4], bytes[5]]),
        })
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl TryFrom<SocketAddr> for PeerAddr {
    type Error = PeerAddrError;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(Self::new(*v4.ip(), v4.port())),
            SocketAddr::V6(_) => Err(PeerAddrError::NotIpv4(addr)),
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl std::str::FromStr for PeerAddr {
    type Err = PeerAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddrV4 = s
            .parse()
            .map_err(|_| PeerAddrError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(*addr.ip(), addr.port()))
    }
}

impl serde::ser::Serialize for PeerAddr {
    fn serialize<S: serde::ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::de::Deserialize<'de> for PeerAddr {
    fn deserialize<D: serde::de::Deserializer<'de>>(des: D) -> Result<Self, D::Error> {
        let s = <String as serde::de::Deserialize>::deserialize(des)?;
        s.parse()
            .map_err(|_| serde::de::Error::invalid_value(serde::de::Unexpected::Str(&s), &"an `ip:port` IPv4 address"))
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use super::{NodeId, PeerAddr, PeerAddrError, PeerId};

    #[test]
    fn a_peer_id_carries_the_client_prefix_and_a_random_tail() {
        let id = PeerId::generate();

        assert_eq!(id.client_prefix(), b"-ZS0001-");
        assert_eq!(id.bytes().len(), 20);
    }

    #[test]
    fn two_generated_peer_ids_differ_in_their_tails() {
        assert_ne!(PeerId::generate(), PeerId::generate());
    }

    #[test]
    fn two_generated_node_ids_differ() {
        assert_ne!(NodeId::generate(), NodeId::generate());
    }

    #[test]
    fn a_peer_addr_round_trips_through_the_compact_form() {
        let addr = PeerAddr::new(Ipv4Addr::new(192, 168, 1, 1), 6881);
        let compact = addr.to_compact();

        assert_eq!(compact, [0xC0, 0xA8, 0x01, 0x01, 0x1A, 0xE1]);
        assert_eq!(PeerAddr::from_compact(&compact).unwrap(), addr);
    }

    #[test]
    fn a_compact_peer_decodes_to_its_address_and_big_endian_port() {
        let addr = PeerAddr::from_compact(&[0x0A, 0x00, 0x00, 0x01, 0x1F, 0x90]).unwrap();

        assert_eq!(addr.to_string(), "10.0.0.1:8080");
    }

    #[test]
    fn compact_decoding_rejects_wrong_lengths() {
        assert_eq!(
            PeerAddr::from_compact(&[1, 2, 3]),
            Err(PeerAddrError::InvalidCompactLength(3))
        );
    }

    #[test]
    fn the_pool_key_packs_ip_then_port() {
        let addr = PeerAddr::new(Ipv4Addr::new(10, 0, 0, 1), 8080);

        assert_eq!(addr.pool_key(), 0x0A00_0001_1F90);
    }

    #[test]
    fn ipv6_addresses_are_rejected() {
        let v6: SocketAddr = "[::1]:6881".parse().unwrap();
        assert!(matches!(
            PeerAddr::try_from(v6),
            Err(PeerAddrError::NotIpv4(_))
        ));
    }
}
