//! **Zest** is a peer-to-peer transfer plane for immutable,
//! content-addressed ML artifacts.
//!
//! Model files live in a content-addressed store (CAS) as fixed-size
//! chunks grouped into *xorbs* (containers of up to 64 MiB), and are
//! normally served over a CDN. Zest layers a `BitTorrent`-compliant
//! swarm on top of that: every xorb is its own swarm, identified by a
//! 20-byte info-hash derived from the 32-byte xorb hash, and peers that
//! hold a xorb (or a sub-range of one) serve it to each other over a
//! `BitTorrent` extension. The CAS stays canonical; peers are
//! opportunistic. A download never fails because no peer is reachable:
//! the CDN is always a correct fallback.
//!
//! A single xorb fetch walks a waterfall:
//!
//! ```text
//! reconstruction term (xorb_hash, chunk range)
//!        |
//!        v
//! swarm core -- hit --> xorb cache (return bytes)
//!        | miss
//!        v
//! peer discovery (direct peers, DHT get_peers, tracker announce)
//!        |
//!        v
//! peer pool -> peer.request_chunk(hash, range)
//!        | any failure
//!        v
//! CDN fetch -> populate cache -> return bytes
//! ```
//!
//! # Components
//!
//! - [`core`]: the swarm orchestrator (per-xorb waterfall, file
//!   reconstruction, fetch-source statistics).
//! - [`protocol`]: the `BitTorrent` wire (BEP 3 handshake, message
//!   framing, the BEP 10 extension handshake and the `ut_xet` chunk
//!   transfer sub-messages).
//! - [`peer`]: client and server ends of a peer connection, plus the
//!   bounded connection pool.
//! - [`dht`]: a Kademlia (BEP 5) client for decentralized peer
//!   discovery over UDP.
//! - [`tracker`]: the BEP 3 HTTP tracker announce client.
//! - [`cas`]: the narrow interfaces this crate consumes from the
//!   upstream CAS collaborator (reconstruction metadata, CDN fetch,
//!   xorb cache, chunk extraction).
//!
//! The process-wide peer id and DHT node id are generated once (see
//! `zest_primitives::PeerId` and `zest_primitives::NodeId`) and passed
//! explicitly to the components that need them.

pub mod cas;
pub mod config;
pub mod core;
pub mod dht;
pub mod peer;
pub mod protocol;
pub mod tracker;
