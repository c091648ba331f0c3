//! Primitive types shared by the zest packages.
//!
//! Everything here is plain data: content hashes, swarm and node
//! identities, chunk index ranges and peer transport addresses. The
//! transfer planes (peer wire, DHT, tracker) and the swarm core all
//! speak in these types; none of them carries behavior beyond parsing,
//! formatting and derivation.

pub mod chunk_range;
pub mod hash;
pub mod info_hash;
pub mod peer;

pub use chunk_range::ChunkRange;
pub use hash::{ChunkHash, XorbHash};
pub use info_hash::InfoHash;
pub use peer::{NodeId, PeerAddr, PeerId};
