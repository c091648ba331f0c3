//! Fetch-source accounting.
//!
//! Every satisfied xorb fetch is attributed to the source that produced
//! its bytes: the local cache, a peer, or the CDN. Counters are kept
//! per source, in xorb counts and in byte volumes, and only ever grow.
//!
//! Recording is decoupled from reading. Fetch paths hand a
//! [`FetchEvent`] to a [`Recorder`] backed by an mpsc queue, and a
//! background task folds events into the shared [`FetchCounters`], so
//! the waterfall never waits on a counter lock. Readers take snapshots
//! through [`FetchStats`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// One event queues per fetched xorb and the accounting task drains
/// them as fast as they arrive, so the queue only needs to absorb a
/// burst the size of the fetch pipeline.
const EVENT_QUEUE_DEPTH: usize = 64;

/// Where a xorb's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Peer,
    Cdn,
}

/// One satisfied xorb fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchEvent {
    pub source: FetchSource,
    /// Size of the artifact the fetch produced.
    pub bytes: u64,
}

/// Monotonic counters for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceCounters {
    /// Xorb fetches this source satisfied.
    pub xorbs: u64,
    /// Bytes this source produced.
    pub bytes: u64,
}

/// Counters for the three waterfall sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchCounters {
    pub cache: SourceCounters,
    pub peer: SourceCounters,
    pub cdn: SourceCounters,
}

impl FetchCounters {
    fn credit(&mut self, event: FetchEvent) {
        let counters = match event.source {
            FetchSource::Cache => &mut self.cache,
            FetchSource::Peer => &mut self.peer,
            FetchSource::Cdn => &mut self.cdn,
        };
        counters.xorbs += 1;
        counters.bytes += event.bytes;
    }
}

/// Sink the fetch paths record into.
///
/// A trait so the swarm can be exercised with a test double; the one
/// real implementation queues onto the accounting task.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(&self, event: FetchEvent);
}

/// Read handle onto the shared counters.
#[derive(Clone, Default)]
pub struct FetchStats {
    counters: Arc<RwLock<FetchCounters>>,
}

impl FetchStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A point-in-time copy of the counters.
    pub async fn snapshot(&self) -> FetchCounters {
        *self.counters.read().await
    }

    /// Spawns the accounting task and returns the recorder feeding it.
    ///
    /// Must run inside a tokio runtime. The task ends when the last
    /// recorder clone is dropped.
    #[must_use]
    pub fn start_recording(&self) -> Box<dyn Recorder> {
        let (sender, mut receiver) = mpsc::channel::<FetchEvent>(EVENT_QUEUE_DEPTH);
        let counters = Arc::clone(&self.counters);
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                debug!(?event, "crediting fetch");
                counters.write().await.credit(event);
            }
        });
        Box::new(QueueRecorder { sender })
    }
}

struct QueueRecorder {
    sender: mpsc::Sender<FetchEvent>,
}

#[async_trait]
impl Recorder for QueueRecorder {
    async fn record(&self, event: FetchEvent) {
        // Accounting must never fail a fetch; a closed queue only costs
        // the data point.
        if self.sender.send(event).await.is_err() {
            debug!("fetch accounting task is gone; event dropped");
        }
    }
}
