//! Bounded pool of persistent peer connections.
//!
//! Connections are keyed by packed transport address and live until an
//! error removes them, capacity evicts them, or the pool shuts down.
//! The pool lock guards nothing but the map: connecting and handshaking
//! (which can take seconds) always happen outside it, so a slow dial
//! never stalls other pool users. The price is a benign race: two tasks
//! asking for the same new address may both dial, and the loser
//! discards its connection when it finds the winner already installed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use zest_primitives::{InfoHash, PeerAddr, PeerId};

use super::connection::PeerConnection;
use super::Error;

struct PoolEntry {
    peer: Arc<PeerConnection>,
    last_used: Instant,
}

/// Persistent peer connections, keyed by address, bounded by
/// `max_peers` with least-recently-used eviction.
pub struct PeerPool {
    connections: Mutex<HashMap<u64, PoolEntry>>,
    max_peers: usize,
    our_peer_id: PeerId,
    listen_port: u16,
    connect_timeout: Duration,
}

impl PeerPool {
    #[must_use]
    pub fn new(max_peers: usize, our_peer_id: PeerId, listen_port: u16, connect_timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            max_peers: max_peers.max(1),
            our_peer_id,
            listen_port,
            connect_timeout,
        }
    }

    /// Returns the pooled connection for `addr`, dialing one if none
    /// exists.
    ///
    /// The pool lock is held only for map lookups and inserts, never
    /// across the dial. When a concurrent task installed a connection
    /// for the same address in the meantime, the one dialed here is
    /// discarded in favor of the installed one.
    ///
    /// # Errors
    ///
    /// Propagates connect and handshake errors from the dial.
    pub async fn get_or_connect(&self, addr: PeerAddr, info_hash: InfoHash) -> Result<Arc<PeerConnection>, Error> {
        let key = addr.pool_key();

        {
            let mut connections = self.connections.lock().await;
            if let Some(entry) = connections.get_mut(&key) {
                entry.last_used = Instant::now();
                return Ok(Arc::clone(&entry.peer));
            }
        }

        let peer = Arc::new(
            PeerConnection::connect(addr, info_hash, self.our_peer_id, self.listen_port, self.connect_timeout).await?,
        );

        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get_mut(&key) {
            existing.last_used = Instant::now();
            return Ok(Arc::clone(&existing.peer));
        }

        if connections.len() >= self.max_peers {
            evict_least_recently_used(&mut connections);
        }
        connections.insert(
            key,
            PoolEntry {
                peer: Arc::clone(&peer),
                last_used: Instant::now(),
            },
        );
        Ok(peer)
    }

    /// Drops the pooled connection for `addr`, closing its stream once
    /// the last outstanding handle goes away.
    pub async fn remove(&self, addr: PeerAddr) {
        let removed = self.connections.lock().await.remove(&addr.pool_key());
        if removed.is_some() {
            debug!(peer = %addr, "removed peer from pool");
        }
    }

    /// Whether a connection for `addr` is currently pooled.
    pub async fn contains(&self, addr: PeerAddr) -> bool {
        self.connections.lock().await.contains_key(&addr.pool_key())
    }

    /// Number of pooled connections.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Drops every pooled connection.
    pub async fn shutdown(&self) {
        self.connections.lock().await.clear();
    }
}

/// Removes exactly one entry: the one longest unused.
fn evict_least_recently_used(connections: &mut HashMap<u64, PoolEntry>) {
    let oldest = connections
        .iter()
        .min_by_key(|(_, entry)| entry.last_used)
        .map(|(key, _)| *key);
    if let Some(key) = oldest {
        if let Some(entry) = connections.remove(&key) {
            debug!(peer = %entry.peer.addr(), "evicted least recently used peer");
        }
    }
}
