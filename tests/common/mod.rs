//! Shared fixtures: in-memory collaborator stubs and a scripted peer.
//!
//! The stubs model the narrowest possible CAS: xorbs are flat byte
//! buffers whose chunks are all `CHUNK_SIZE` bytes, so extracting a
//! chunk range is a slice. That is enough to drive every waterfall path
//! without a real store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use zest::cas::{
    ByteRange, CachedXorb, CasClient, ChunkHit, ChunkProvider, Error as CasError, Reconstruction, XorbCache,
    XorbReader,
};
use zest::protocol::extended::{ExtendedHandshake, EXTENSION_HANDSHAKE_ID, LOCAL_XET_ID};
use zest::protocol::handshake::Handshake;
use zest::protocol::message::{self, Message};
use zest::protocol::xet::XetMessage;
use zest_primitives::{ChunkHash, ChunkRange, PeerAddr, PeerId, XorbHash};

/// Every test chunk is this many bytes.
pub const CHUNK_SIZE: usize = 4;

/// Deterministic xorb content: `chunk_count` chunks whose bytes encode
/// their chunk index.
pub fn xorb_bytes(seed: u8, chunk_count: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(chunk_count as usize * CHUNK_SIZE);
    for chunk in 0..chunk_count {
        for byte in 0..CHUNK_SIZE {
            data.push(seed ^ (chunk as u8) ^ (byte as u8));
        }
    }
    data
}

pub fn chunk_slice(data: &[u8], range: &ChunkRange) -> Vec<u8> {
    data[range.start as usize * CHUNK_SIZE..range.end as usize * CHUNK_SIZE].to_vec()
}

/// CAS stub: canned reconstruction plan plus a URL-to-bytes map. URLs
/// absent from the map fail like a dead CDN endpoint. Fetch calls are
/// counted so tests can assert "no CDN traffic".
#[derive(Default)]
pub struct StubCas {
    pub reconstruction: Reconstruction,
    pub urls: HashMap<String, Vec<u8>>,
    pub fetch_calls: AtomicUsize,
}

impl StubCas {
    pub fn with_url(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.urls.insert(url.to_string(), bytes);
        self
    }

    pub fn with_reconstruction(mut self, reconstruction: Reconstruction) -> Self {
        self.reconstruction = reconstruction;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CasClient for StubCas {
    async fn get_reconstruction(&self, _file_hash: &str) -> Result<Reconstruction, CasError> {
        Ok(self.reconstruction.clone())
    }

    async fn fetch_from_url(&self, url: &str, range: &ByteRange) -> Result<Vec<u8>, CasError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .urls
            .get(url)
            .ok_or_else(|| CasError::Upstream(format!("no route to {url}")))?;
        let end = (range.end as usize + 1).min(bytes.len());
        Ok(bytes[range.start as usize..end].to_vec())
    }
}

/// In-memory xorb cache keyed exactly like the real one.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(XorbHash, u32), Vec<u8>>>,
}

impl MemoryCache {
    pub async fn seed(&self, hash: XorbHash, chunk_offset: u32, data: Vec<u8>) {
        self.entries.lock().await.insert((hash, chunk_offset), data);
    }

    pub async fn contains(&self, hash: XorbHash, chunk_offset: u32) -> bool {
        self.entries.lock().await.contains_key(&(hash, chunk_offset))
    }
}

#[async_trait]
impl XorbCache for MemoryCache {
    async fn get(&self, xorb_hash: &XorbHash, chunk_start: u32) -> Option<CachedXorb> {
        self.entries
            .lock()
            .await
            .get(&(*xorb_hash, chunk_start))
            .map(|data| CachedXorb {
                data: data.clone(),
                chunk_offset: chunk_start,
            })
    }

    async fn put(&self, xorb_hash: &XorbHash, data: &[u8]) -> Result<(), CasError> {
        self.seed(*xorb_hash, 0, data.to_vec()).await;
        Ok(())
    }

    async fn put_partial(&self, xorb_hash: &XorbHash, chunk_offset: u32, data: &[u8]) -> Result<(), CasError> {
        self.seed(*xorb_hash, chunk_offset, data.to_vec()).await;
        Ok(())
    }
}

/// Fixed-size-chunk xorb reader matching [`xorb_bytes`].
pub struct SliceReader;

impl XorbReader for SliceReader {
    fn extract_chunk_range(&self, data: &[u8], local: &ChunkRange) -> Result<Vec<u8>, CasError> {
        let start = local.start as usize * CHUNK_SIZE;
        let end = local.end as usize * CHUNK_SIZE;
        if end > data.len() || start > end {
            return Err(CasError::CorruptXorb(format!(
                "range {local} outside a {} byte payload",
                data.len()
            )));
        }
        Ok(data[start..end].to_vec())
    }
}

/// Seeding-side store: content hash to (chunk offset, bytes).
#[derive(Default)]
pub struct MemoryProvider {
    entries: Mutex<HashMap<ChunkHash, (u32, Vec<u8>)>>,
}

impl MemoryProvider {
    pub async fn seed(&self, hash: ChunkHash, chunk_offset: u32, data: Vec<u8>) {
        self.entries.lock().await.insert(hash, (chunk_offset, data));
    }
}

#[async_trait]
impl ChunkProvider for MemoryProvider {
    async fn find_chunk(&self, hash: &ChunkHash, range: &ChunkRange) -> Option<ChunkHit> {
        let entries = self.entries.lock().await;
        let (chunk_offset, data) = entries.get(hash)?;
        // Serve only when the stored artifact reaches the requested range.
        let held = ChunkRange::new(*chunk_offset, chunk_offset + (data.len() / CHUNK_SIZE) as u32);
        if !held.is_superset_of(range) {
            return None;
        }
        Some(ChunkHit {
            chunk_offset: *chunk_offset,
            data: data.clone(),
        })
    }
}

/// What a [`ScriptedPeer`] does with each incoming chunk request.
#[derive(Clone)]
pub enum ScriptStep {
    /// Answer with data, echoing the request id.
    Respond { chunk_offset: u32, data: Vec<u8> },
    /// Answer with data but lie about the request id.
    RespondWithRequestId { request_id: u32, chunk_offset: u32, data: Vec<u8> },
    /// Answer `chunk_not_found`.
    NotFound,
    /// Answer `chunk_error`.
    Fail { error_code: u32, message: String },
    /// Write a frame header promising a body, then slam the connection.
    CloseMidResponse,
    /// Queue the request; once `n` requests are queued, answer them in
    /// the given positional order.
    CollectThenRespondInOrder { order: Vec<usize>, data: Vec<Vec<u8>> },
}

/// A real TCP peer that walks the accepting handshake ladder and then
/// follows a script, one step per incoming chunk request.
pub struct ScriptedPeer {
    pub addr: PeerAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl ScriptedPeer {
    pub async fn spawn(script: Vec<ScriptStep>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = PeerAddr::try_from(listener.local_addr().unwrap()).unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let remote = Handshake::read_from(&mut stream).await.unwrap();
            Handshake::new(remote.info_hash, PeerId(*b"-ZS0001-scriptedpeer"))
                .write_to(&mut stream)
                .await
                .unwrap();
            let ext = Message::Extended {
                ext_id: EXTENSION_HANDSHAKE_ID,
                payload: ExtendedHandshake::ours(0, "scripted 0.0.0").to_bytes(),
            };
            message::write_message(&mut stream, &ext).await.unwrap();

            let mut steps = script.into_iter();
            let mut queued: Vec<u32> = Vec::new();
            loop {
                let incoming = match message::read_message(&mut stream).await {
                    Ok(incoming) => incoming,
                    Err(_) => return,
                };
                let Message::Extended { ext_id, payload } = incoming else {
                    continue;
                };
                if ext_id != LOCAL_XET_ID {
                    continue;
                }
                let Ok(XetMessage::ChunkRequest { request_id, .. }) = XetMessage::from_bytes(&payload) else {
                    continue;
                };

                let Some(step) = steps.next() else { return };
                match step {
                    ScriptStep::Respond { chunk_offset, data } => {
                        reply(&mut stream, XetMessage::ChunkResponse { request_id, chunk_offset, data }).await;
                    }
                    ScriptStep::RespondWithRequestId {
                        request_id: forged,
                        chunk_offset,
                        data,
                    } => {
                        reply(
                            &mut stream,
                            XetMessage::ChunkResponse {
                                request_id: forged,
                                chunk_offset,
                                data: data.clone(),
                            },
                        )
                        .await;
                        // Follow with the real answer so the caller's
                        // read loop has something to finish on.
                        reply(&mut stream, XetMessage::ChunkResponse { request_id, chunk_offset, data }).await;
                    }
                    ScriptStep::NotFound => {
                        reply(
                            &mut stream,
                            XetMessage::ChunkNotFound {
                                request_id,
                                chunk_hash: ChunkHash([0; 32]),
                            },
                        )
                        .await;
                    }
                    ScriptStep::Fail { error_code, message } => {
                        reply(&mut stream, XetMessage::ChunkError { request_id, error_code, message }).await;
                    }
                    ScriptStep::CloseMidResponse => {
                        use tokio::io::AsyncWriteExt;
                        // Promise a 64-byte body, deliver the id byte only.
                        stream.write_all(&64u32.to_be_bytes()).await.unwrap();
                        stream.write_all(&[20u8]).await.unwrap();
                        stream.flush().await.unwrap();
                        return;
                    }
                    ScriptStep::CollectThenRespondInOrder { order, data } => {
                        queued.push(request_id);
                        while queued.len() < order.len() {
                            let Ok(next) = message::read_message(&mut stream).await else { return };
                            if let Message::Extended { ext_id, payload } = next {
                                if ext_id == LOCAL_XET_ID {
                                    if let Ok(XetMessage::ChunkRequest { request_id, .. }) =
                                        XetMessage::from_bytes(&payload)
                                    {
                                        queued.push(request_id);
                                    }
                                }
                            }
                        }
                        for position in order {
                            reply(
                                &mut stream,
                                XetMessage::ChunkResponse {
                                    request_id: queued[position],
                                    chunk_offset: 0,
                                    data: data[position].clone(),
                                },
                            )
                            .await;
                        }
                    }
                }
            }
        });

        Self { addr, handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn reply(stream: &mut tokio::net::TcpStream, answer: XetMessage) {
    let frame = Message::Extended {
        ext_id: LOCAL_XET_ID,
        payload: answer.to_bytes(),
    };
    message::write_message(stream, &frame).await.unwrap();
}
