//! The swarm core: the per-xorb fetch waterfall.
//!
//! Every reconstruction term resolves through the same ladder:
//!
//! 1. **Cache**: a hit on `(xorb_hash, chunk_start)` short-circuits
//!    everything.
//! 2. **P2P**: candidate peers (direct peers first, then DHT results,
//!    then tracker results, each in discovery order) are tried one by
//!    one through the connection pool. Negative answers keep the peer
//!    pooled; transport and protocol failures evict it. Requests always
//!    carry the fetch entry's full chunk range rather than the term's
//!    narrower one, so the peer's answer is reusable for sibling terms
//!    of the same xorb.
//! 3. **CDN**: the canonical fallback. Its bytes populate the cache,
//!    and only its errors can surface to the caller.
//!
//! A successful peer or CDN fetch is followed by a best-effort announce
//! to the DHT and the tracker: the process starts seeding a xorb the
//! moment it holds one.

pub mod error;
pub mod statistics;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use zest_primitives::{ChunkRange, InfoHash, PeerAddr, PeerId};

use crate::cas::{CasClient, FetchEntry, Reconstruction, ReconstructionTerm, XorbCache, XorbReader};
use crate::config::Configuration;
use crate::dht::Dht;
use crate::peer::PeerPool;
use crate::tracker;

pub use self::error::Error;
use self::statistics::{FetchCounters, FetchEvent, FetchSource, FetchStats, Recorder};

/// Bytes satisfying one reconstruction term.
///
/// `data` holds a xorb or xorb sub-range; `local_range` gives the
/// term's chunk indices rebased into it, ready for
/// [`XorbReader::extract_chunk_range`].
#[derive(Debug, Clone)]
pub struct TermData {
    pub data: Vec<u8>,
    pub local_range: ChunkRange,
}

/// The swarm orchestrator.
///
/// Owns the peer pool and the fetch accounting; borrows everything
/// upstream (CAS, cache, xorb reader) through trait objects.
pub struct Swarm {
    config: Configuration,
    cas: Arc<dyn CasClient>,
    cache: Arc<dyn XorbCache>,
    xorb_reader: Arc<dyn XorbReader>,
    pool: Arc<PeerPool>,
    dht: Option<Arc<Dht>>,
    tracker: Option<tracker::Client>,
    recorder: Box<dyn Recorder>,
    stats: FetchStats,
}

impl Swarm {
    /// Builds a swarm with no discovery planes attached. Wire the DHT
    /// and tracker in with [`Self::with_dht`] and [`Self::with_tracker`].
    ///
    /// Must run inside a tokio runtime: the fetch accounting spawns its
    /// task here.
    #[must_use]
    pub fn new(
        config: Configuration,
        peer_id: PeerId,
        cas: Arc<dyn CasClient>,
        cache: Arc<dyn XorbCache>,
        xorb_reader: Arc<dyn XorbReader>,
    ) -> Self {
        let pool = Arc::new(PeerPool::new(
            config.max_peers,
            peer_id,
            config.listen_port,
            Duration::from_secs(config.peer_connect_timeout_secs),
        ));
        let stats = FetchStats::new();
        let recorder = stats.start_recording();
        Self {
            config,
            cas,
            cache,
            xorb_reader,
            pool,
            dht: None,
            tracker: None,
            recorder,
            stats,
        }
    }

    #[must_use]
    pub fn with_dht(mut self, dht: Arc<Dht>) -> Self {
        self.dht = Some(dht);
        self
    }

    #[must_use]
    pub fn with_tracker(mut self, tracker: tracker::Client) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// The connection pool, shared with whoever else needs it.
    #[must_use]
    pub fn pool(&self) -> &Arc<PeerPool> {
        &self.pool
    }

    /// A point-in-time copy of the fetch-source counters.
    pub async fn stats(&self) -> FetchCounters {
        self.stats.snapshot().await
    }

    /// Resolves one term through the cache -> P2P -> CDN waterfall.
    ///
    /// # Errors
    ///
    /// [`Error::NoCoveringFetchEntry`] when the fetch info cannot
    /// satisfy the term at all, and CDN/collaborator errors from the
    /// final stage. Peer failures never surface here.
    pub async fn fetch_xorb_for_term(
        &self,
        term: &ReconstructionTerm,
        entries: &[FetchEntry],
    ) -> Result<TermData, Error> {
        let entry = entries
            .iter()
            .find(|entry| entry.covers(&term.range))
            .ok_or(Error::NoCoveringFetchEntry {
                xorb_hash: term.xorb_hash,
                range: term.range,
            })?;

        if let Some(data) = self.probe_cache(term, entry).await {
            return Ok(data);
        }

        let info_hash = InfoHash::from_xorb_hash(&term.xorb_hash);

        if let Some(data) = self.fetch_from_peers(term, entry, info_hash).await {
            self.record_fetch(FetchSource::Peer, data.data.len()).await;
            self.announce_presence(info_hash).await;
            return Ok(data);
        }

        let data = self.fetch_from_cdn(term, entry, entries.len() == 1).await?;
        self.record_fetch(FetchSource::Cdn, data.data.len()).await;
        self.announce_presence(info_hash).await;
        Ok(data)
    }

    /// Reconstructs a whole file to `path`, terms in plan order.
    ///
    /// Terms fetch concurrently up to `fetch_concurrency` but their
    /// bytes reach the file strictly in input order. With
    /// `sequential_fetch` set (or a concurrency of one) the same loop
    /// runs inline on this task.
    ///
    /// # Errors
    ///
    /// The first unrecoverable error in term order; bytes already
    /// written stay in the file (callers wanting atomicity write to a
    /// temp path and rename).
    pub async fn reconstruct_to_file(&self, file_hash: &str, path: &Path) -> Result<(), Error> {
        let plan = self.cas.get_reconstruction(file_hash).await?;
        debug!(file_hash, terms = plan.terms.len(), "reconstruction plan fetched");

        let mut file = tokio::fs::File::create(path).await?;

        if self.config.sequential_fetch || self.config.fetch_concurrency <= 1 {
            for term in &plan.terms {
                let bytes = self.fetch_term_bytes(&plan, term).await?;
                file.write_all(&bytes).await?;
            }
        } else {
            let fetches = plan.terms.iter().map(|term| self.fetch_term_bytes(&plan, term));
            let mut ordered = stream::iter(fetches).buffered(self.config.fetch_concurrency);
            while let Some(bytes) = ordered.next().await {
                file.write_all(&bytes?).await?;
            }
        }

        file.flush().await?;
        Ok(())
    }

    /// Fetches one term and extracts exactly its chunks.
    async fn fetch_term_bytes(&self, plan: &Reconstruction, term: &ReconstructionTerm) -> Result<Vec<u8>, Error> {
        let entries = plan
            .fetch_info
            .get(&term.xorb_hash)
            .ok_or(Error::MissingFetchInfo(term.xorb_hash))?;
        let fetched = self.fetch_xorb_for_term(term, entries).await?;
        Ok(self.xorb_reader.extract_chunk_range(&fetched.data, &fetched.local_range)?)
    }

    async fn probe_cache(&self, term: &ReconstructionTerm, entry: &FetchEntry) -> Option<TermData> {
        let hit = self.cache.get(&term.xorb_hash, entry.chunk_range.start).await?;
        let Some(local_range) = rebase_term(&term.range, hit.chunk_offset) else {
            warn!(xorb = %term.xorb_hash, offset = hit.chunk_offset, "cache entry does not reach the term; ignoring it");
            return None;
        };
        self.record_fetch(FetchSource::Cache, hit.data.len()).await;
        Some(TermData {
            data: hit.data,
            local_range,
        })
    }

    /// Walks the candidate peers in discovery order until one serves the
    /// fetch entry's chunk range.
    async fn fetch_from_peers(
        &self,
        term: &ReconstructionTerm,
        entry: &FetchEntry,
        info_hash: InfoHash,
    ) -> Option<TermData> {
        for addr in self.discover_peers(info_hash).await {
            let peer = match self.pool.get_or_connect(addr, info_hash).await {
                Ok(peer) => peer,
                Err(err) => {
                    debug!(peer = %addr, %err, "skipping peer: connect failed");
                    continue;
                }
            };
            if !peer.supports_xet() {
                debug!(peer = %addr, "skipping peer: no ut_xet");
                continue;
            }

            match peer.request_chunk(term.xorb_hash.into(), entry.chunk_range).await {
                Ok(chunk) => {
                    let Some(local_range) = rebase_term(&term.range, chunk.chunk_offset) else {
                        debug!(peer = %addr, "peer answer does not reach the term; trying next peer");
                        continue;
                    };
                    return Some(TermData {
                        data: chunk.data,
                        local_range,
                    });
                }
                Err(err) if err.is_negative_response() => {
                    // A healthy connection saying "don't have it".
                    debug!(peer = %addr, %err, "peer declined; trying next peer");
                }
                Err(err) => {
                    debug!(peer = %addr, %err, "peer failed; evicting from pool");
                    self.pool.remove(addr).await;
                }
            }
        }
        None
    }

    /// Final waterfall stage; the only one whose failure propagates.
    async fn fetch_from_cdn(
        &self,
        term: &ReconstructionTerm,
        entry: &FetchEntry,
        only_entry: bool,
    ) -> Result<TermData, Error> {
        let data = self.cas.fetch_from_url(&entry.url, &entry.url_range).await?;

        // Cache writes are best-effort; a persistence failure never
        // fails the download. A lone entry starting at chunk 0 is the
        // whole xorb; anything else is stored as a partial keyed by its
        // chunk offset.
        let cached = if only_entry && entry.chunk_range.start == 0 {
            self.cache.put(&term.xorb_hash, &data).await
        } else {
            self.cache.put_partial(&term.xorb_hash, entry.chunk_range.start, &data).await
        };
        if let Err(err) = cached {
            warn!(xorb = %term.xorb_hash, %err, "failed to cache fetched xorb");
        }

        let local_range = rebase_term(&term.range, entry.chunk_range.start).expect("fetch entry covers the term");
        Ok(TermData { data, local_range })
    }

    /// Candidate peers: direct peers, then DHT answers, then tracker
    /// answers, deduplicated with discovery order preserved.
    async fn discover_peers(&self, info_hash: InfoHash) -> Vec<PeerAddr> {
        let mut candidates = self.config.direct_peers.clone();

        if let Some(dht) = &self.dht {
            match dht.get_peers(&info_hash).await {
                Ok(peers) => candidates.extend(peers),
                Err(err) => debug!(%err, "DHT discovery failed; continuing without it"),
            }
        }

        if let Some(tracker) = &self.tracker {
            match tracker
                .announce(info_hash, self.config.listen_port, Some(tracker::AnnounceEvent::Started))
                .await
            {
                Ok(announce) => candidates.extend(announce.peers),
                Err(err) => debug!(%err, "tracker discovery failed; continuing without it"),
            }
        }

        let mut seen = std::collections::HashSet::new();
        candidates.retain(|addr| seen.insert(addr.pool_key()));
        candidates
    }

    /// Tells the swarm we now hold (part of) this xorb. Best effort on
    /// both planes; failures are logged and swallowed.
    async fn announce_presence(&self, info_hash: InfoHash) {
        if let Some(dht) = &self.dht {
            if let Err(err) = dht.announce_peer(&info_hash, self.config.listen_port).await {
                debug!(%err, "DHT announce failed");
            }
        }
        if let Some(tracker) = &self.tracker {
            if let Err(err) = tracker.announce(info_hash, self.config.listen_port, None).await {
                debug!(%err, "tracker announce failed");
            }
        }
    }

    async fn record_fetch(&self, source: FetchSource, bytes: usize) {
        self.recorder.record(FetchEvent {
            source,
            bytes: bytes as u64,
        })
        .await;
    }
}

/// Shifts a term's chunk indices into an artifact that starts at
/// `chunk_offset`. `None` when the artifact starts past the term.
fn rebase_term(range: &ChunkRange, chunk_offset: u32) -> Option<ChunkRange> {
    Some(ChunkRange::new(
        range.start.checked_sub(chunk_offset)?,
        range.end.checked_sub(chunk_offset)?,
    ))
}
