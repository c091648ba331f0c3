//! The crate's own [`ChunkProvider`]: serving peers out of the xorb
//! cache.
//!
//! Whatever the waterfall pulled from the CDN lands in the cache; this
//! adapter is what turns that cache into seedable inventory. The hash a
//! peer asks with is a xorb hash (the two share one content-hash
//! namespace), so a lookup is two cache probes: the full xorb under
//! offset `0`, then a partial entry keyed by the requested range start.

use std::sync::Arc;

use async_trait::async_trait;
use zest_primitives::{ChunkHash, ChunkRange, XorbHash};

use super::{ChunkHit, ChunkProvider, XorbCache};

/// Serves chunk requests from the local xorb cache.
pub struct CacheChunkProvider {
    cache: Arc<dyn XorbCache>,
    /// Chunk payload size the cache's xorbs were cut with; used to tell
    /// how many chunks a cached byte buffer holds.
    chunk_size: usize,
}

impl CacheChunkProvider {
    #[must_use]
    pub fn new(cache: Arc<dyn XorbCache>, chunk_size: usize) -> Self {
        Self {
            cache,
            chunk_size: chunk_size.max(1),
        }
    }

    fn chunks_in(&self, bytes: usize) -> u32 {
        u32::try_from(bytes / self.chunk_size).unwrap_or(u32::MAX)
    }
}

#[async_trait]
impl ChunkProvider for CacheChunkProvider {
    async fn find_chunk(&self, hash: &ChunkHash, range: &ChunkRange) -> Option<ChunkHit> {
        let xorb_hash = XorbHash(hash.0);

        // Full xorb first, then a partial keyed by the range start.
        for probe in [0, range.start] {
            if let Some(cached) = self.cache.get(&xorb_hash, probe).await {
                let held = ChunkRange::new(
                    cached.chunk_offset,
                    cached.chunk_offset.saturating_add(self.chunks_in(cached.data.len())),
                );
                if held.is_superset_of(range) {
                    return Some(ChunkHit {
                        chunk_offset: cached.chunk_offset,
                        data: cached.data,
                    });
                }
            }
        }
        None
    }
}
