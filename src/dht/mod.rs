//! Kademlia peer discovery over UDP (BEP 5).
//!
//! This is the client role only: the node queries the network to find
//! peers for a swarm and to announce itself; it keeps a routing table
//! from the nodes it hears back from but does not answer foreign
//! queries.
//!
//! Lookup rounds are single-hop: `get_peers` goes to the up-to-K known
//! nodes closest to the target and collects whatever answers arrive
//! before the response timeout (3 s by default, configurable). Nodes
//! returned in `nodes` fields feed the routing table, so repeated
//! lookups converge the same way an iterative walk would, one round per
//! call.

pub mod compact;
pub mod krpc;
pub mod routing_table;

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error as ThisError;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tracing::{debug, trace};
use zest_primitives::{InfoHash, NodeId, PeerAddr};

use self::krpc::{Message, Query, Response, TransactionId};
use self::routing_table::{NodeEntry, RoutingTable};

/// Largest accepted datagram: one UDP MTU.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// Default time a collection round waits for outstanding responses.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("i/o failure on the DHT socket: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bencoded datagram: {0}")]
    Bencode(#[from] zest_bencode::Error),

    #[error("malformed KRPC message: {what}")]
    Malformed { what: &'static str },
}

/// State behind the DHT lock: the socket, the routing table and the
/// announce tokens learned from `get_peers` responses.
///
/// One lock serializes whole query rounds; interleaving two rounds on
/// one socket would cross-deliver their responses.
struct Inner {
    socket: UdpSocket,
    routing_table: RoutingTable,
    /// `announce_peer` tokens keyed by packed node address.
    tokens: HashMap<u64, Vec<u8>>,
}

/// A DHT node handle.
pub struct Dht {
    node_id: NodeId,
    response_timeout: Duration,
    inner: Mutex<Inner>,
}

impl Dht {
    /// Binds the UDP socket. Port `0` picks an ephemeral port.
    ///
    /// # Errors
    ///
    /// Fails when the socket cannot be bound.
    pub async fn bind(port: u16, node_id: NodeId, response_timeout: Duration) -> Result<Self, Error> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        debug!(addr = %socket.local_addr()?, "DHT socket bound");
        Ok(Self {
            node_id,
            response_timeout,
            inner: Mutex::new(Inner {
                socket,
                routing_table: RoutingTable::new(node_id),
                tokens: HashMap::new(),
            }),
        })
    }

    /// The bound socket address.
    ///
    /// # Errors
    ///
    /// Propagates the socket's local-address lookup failure.
    pub async fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.inner.lock().await.socket.local_addr()?)
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Number of nodes currently in the routing table.
    pub async fn node_count(&self) -> usize {
        self.inner.lock().await.routing_table.node_count()
    }

    /// Seeds the routing table with a known node without any traffic.
    pub async fn insert_node(&self, node: NodeEntry) {
        self.inner.lock().await.routing_table.insert(node);
    }

    /// Pings well-known addresses and inserts every responder into the
    /// routing table. Returns the number of nodes that answered.
    ///
    /// # Errors
    ///
    /// Fails only on socket errors; unreachable bootstrap nodes are
    /// simply absent from the result.
    pub async fn bootstrap(&self, bootstrap_nodes: &[PeerAddr]) -> Result<usize, Error> {
        if bootstrap_nodes.is_empty() {
            return Ok(0);
        }
        let mut inner = self.inner.lock().await;

        let mut pending: HashMap<TransactionId, PeerAddr> = HashMap::new();
        for addr in bootstrap_nodes {
            let transaction_id = TransactionId::random();
            let message = Message::Query {
                transaction_id,
                query: Query::Ping { id: self.node_id },
            };
            inner.socket.send_to(&message.to_bytes(), addr.socket_addr()).await?;
            pending.insert(transaction_id, *addr);
        }

        let mut inserted = 0;
        collect_responses(&mut inner, self.response_timeout, &mut pending, |inner, from, response| {
            if let Some(id) = response.id {
                inner.routing_table.insert(NodeEntry { id, addr: from });
                inserted += 1;
            }
        })
        .await?;

        debug!(inserted, "DHT bootstrap round finished");
        Ok(inserted)
    }

    /// One `get_peers` round: queries the K known nodes closest to
    /// `info_hash` and returns every peer advertised in the answers.
    ///
    /// Side effects per answer: `nodes` feed the routing table, `token`
    /// is remembered for a later [`Self::announce_peer`].
    ///
    /// # Errors
    ///
    /// Fails only on socket errors. No known nodes, or none answering
    /// in time, yields an empty list.
    pub async fn get_peers(&self, info_hash: &InfoHash) -> Result<Vec<PeerAddr>, Error> {
        let mut inner = self.inner.lock().await;

        let targets = inner.routing_table.find_closest(&info_hash.bytes());
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let mut pending: HashMap<TransactionId, PeerAddr> = HashMap::new();
        for node in &targets {
            let transaction_id = TransactionId::random();
            let message = Message::Query {
                transaction_id,
                query: Query::GetPeers {
                    id: self.node_id,
                    info_hash: *info_hash,
                },
            };
            inner.socket.send_to(&message.to_bytes(), node.addr.socket_addr()).await?;
            pending.insert(transaction_id, node.addr);
        }

        let mut peers: Vec<PeerAddr> = Vec::new();
        collect_responses(&mut inner, self.response_timeout, &mut pending, |inner, from, response| {
            for node in &response.nodes {
                inner.routing_table.insert(*node);
            }
            if let Some(token) = &response.token {
                inner.tokens.insert(from.pool_key(), token.clone());
            }
            for peer in &response.peers {
                if !peers.contains(peer) {
                    peers.push(*peer);
                }
            }
        })
        .await?;

        debug!(info_hash = %info_hash, peers = peers.len(), "get_peers round finished");
        Ok(peers)
    }

    /// Announces this process as a peer for `info_hash` on `port`.
    ///
    /// Sent to the K closest known nodes that handed us a token in an
    /// earlier `get_peers` round; nodes without a token are skipped and
    /// responses are not awaited.
    ///
    /// # Errors
    ///
    /// Fails only on socket errors.
    pub async fn announce_peer(&self, info_hash: &InfoHash, port: u16) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;

        let targets = inner.routing_table.find_closest(&info_hash.bytes());
        let mut announced = 0usize;
        for node in targets {
            let Some(token) = inner.tokens.get(&node.addr.pool_key()).cloned() else {
                trace!(node = %node.addr, "skipping announce: no token");
                continue;
            };
            let message = Message::Query {
                transaction_id: TransactionId::random(),
                query: Query::AnnouncePeer {
                    id: self.node_id,
                    info_hash: *info_hash,
                    port,
                    token,
                    implied_port: false,
                },
            };
            inner.socket.send_to(&message.to_bytes(), node.addr.socket_addr()).await?;
            announced += 1;
        }

        debug!(info_hash = %info_hash, announced, "announce_peer sent");
        Ok(())
    }
}

/// Reads datagrams until every pending transaction answered or the
/// timeout elapses, feeding each matched response to `on_response`.
/// Unmatched, foreign and malformed datagrams are skipped.
async fn collect_responses(
    inner: &mut Inner,
    timeout: Duration,
    pending: &mut HashMap<TransactionId, PeerAddr>,
    mut on_response: impl FnMut(&mut Inner, PeerAddr, &Response),
) -> Result<(), Error> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    while !pending.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let (len, from) = match time::timeout(remaining, inner.socket.recv_from(&mut buf)).await {
            Ok(received) => received?,
            Err(_) => break,
        };
        let Ok(from) = PeerAddr::try_from(from) else {
            continue;
        };

        match Message::from_bytes(&buf[..len]) {
            Ok(Message::Response {
                transaction_id,
                response,
            }) => {
                if pending.remove(&transaction_id).is_some() {
                    on_response(inner, from, &response);
                } else {
                    trace!(node = %from, "dropping response for an unknown transaction");
                }
            }
            Ok(Message::Error {
                code, message: text, ..
            }) => {
                trace!(node = %from, code, text, "DHT node answered with an error");
            }
            Ok(Message::Query { .. }) => {
                trace!(node = %from, "ignoring foreign query; this node is client-only");
            }
            Err(err) => {
                trace!(node = %from, %err, "dropping malformed datagram");
            }
        }
    }
    Ok(())
}
