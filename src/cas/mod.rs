//! Interfaces consumed from the upstream CAS collaborator.
//!
//! The swarm core never speaks the CAS protocol itself. Authentication,
//! the reconstruction-info format, the chunking algorithm and the xorb
//! binary layout all belong to the collaborator; this module defines the
//! narrow seams the core calls through, plus the data types those calls
//! exchange. Each seam is an object-safe trait held as an `Arc<dyn ..>`
//! so the swarm stays unit-testable with in-memory stubs.

pub mod provider;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zest_primitives::{ChunkHash, ChunkRange, XorbHash};

pub use self::provider::CacheChunkProvider;

/// Error surfaced by the CAS collaborator.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Credentials missing, expired or rejected. Surfaced to the caller
    /// unchanged; no fallback applies.
    #[error("authentication with the CAS failed: {0}")]
    Authentication(String),

    /// The upstream request failed (network, HTTP status, decode).
    #[error("CAS request failed: {0}")]
    Upstream(String),

    /// Caller input the collaborator rejected, e.g. a malformed file
    /// hash.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Local cache read/write failure.
    #[error("xorb cache failure: {0}")]
    Cache(String),

    /// A xorb payload whose framing or chunk hashes did not verify.
    #[error("corrupt xorb payload: {0}")]
    CorruptXorb(String),
}

/// Inclusive byte range into a CDN URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// One slice of a file's reconstruction plan: a chunk range within a
/// xorb. Terms concatenate, in order, into the file bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionTerm {
    pub xorb_hash: XorbHash,
    pub range: ChunkRange,
}

/// One way to obtain (part of) a xorb from the CDN: a URL, the byte
/// range to request from it, and the chunk range those bytes decode to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchEntry {
    pub url: String,
    pub url_range: ByteRange,
    pub chunk_range: ChunkRange,
}

impl FetchEntry {
    /// Whether this entry's payload covers every chunk of `range`.
    #[must_use]
    pub fn covers(&self, range: &ChunkRange) -> bool {
        self.chunk_range.is_superset_of(range)
    }
}

/// A file's full reconstruction plan as returned by the CAS.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reconstruction {
    pub terms: Vec<ReconstructionTerm>,
    pub fetch_info: HashMap<XorbHash, Vec<FetchEntry>>,
}

/// A cache hit: stored bytes plus the chunk index the bytes start at
/// (`0` for a full xorb).
#[derive(Debug, Clone)]
pub struct CachedXorb {
    pub data: Vec<u8>,
    pub chunk_offset: u32,
}

/// A chunk-store hit served to a remote peer: the stored bytes plus the
/// chunk index they start at within the requested content (`0` for a
/// whole hit).
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk_offset: u32,
    pub data: Vec<u8>,
}

/// Reconstruction metadata and CDN access, provided by the CAS service.
#[async_trait]
pub trait CasClient: Send + Sync {
    /// Fetches the reconstruction plan for a file.
    ///
    /// # Errors
    ///
    /// [`Error::Authentication`] when credentials are rejected,
    /// [`Error::InvalidInput`] for a malformed hash,
    /// [`Error::Upstream`] for transport or decode failures.
    async fn get_reconstruction(&self, file_hash: &str) -> Result<Reconstruction, Error>;

    /// Downloads a byte range from a CDN URL.
    ///
    /// # Errors
    ///
    /// [`Error::Upstream`] when the download fails.
    async fn fetch_from_url(&self, url: &str, range: &ByteRange) -> Result<Vec<u8>, Error>;
}

/// Local xorb cache, keyed by `(xorb_hash, chunk_range_start)`.
///
/// A hit on `(hash, start)` yields bytes whose chunk sequence begins at
/// exactly `start`; the cache collaborator owns the on-disk layout and
/// that honesty contract.
#[async_trait]
pub trait XorbCache: Send + Sync {
    /// Looks up a cached xorb or xorb range.
    async fn get(&self, xorb_hash: &XorbHash, chunk_start: u32) -> Option<CachedXorb>;

    /// Stores a full xorb.
    ///
    /// # Errors
    ///
    /// [`Error::Cache`] on persistence failure. Callers treat writes as
    /// best-effort.
    async fn put(&self, xorb_hash: &XorbHash, data: &[u8]) -> Result<(), Error>;

    /// Stores a xorb sub-range beginning at `chunk_offset`.
    ///
    /// # Errors
    ///
    /// [`Error::Cache`] on persistence failure.
    async fn put_partial(&self, xorb_hash: &XorbHash, chunk_offset: u32, data: &[u8]) -> Result<(), Error>;
}

/// Chunk extraction from an opaque xorb payload.
///
/// The collaborator parses the xorb framing, hashes every extracted
/// chunk and rejects on mismatch; the swarm returns bytes verbatim and
/// relies on that check for integrity.
pub trait XorbReader: Send + Sync {
    /// Extracts the bytes of chunks `[local.start, local.end)` from a
    /// xorb (or xorb-range) payload.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptXorb`] when framing or chunk hashes do not
    /// verify.
    fn extract_chunk_range(&self, data: &[u8], local: &ChunkRange) -> Result<Vec<u8>, Error>;
}

/// Lookup of locally held content for seeding remote peers.
///
/// Backed by the xorb cache plus the collaborator's content index; a
/// miss is a normal answer, never an error.
#[async_trait]
pub trait ChunkProvider: Send + Sync {
    /// Finds stored bytes for `hash` covering `range`, if any.
    async fn find_chunk(&self, hash: &ChunkHash, range: &ChunkRange) -> Option<ChunkHit>;
}
