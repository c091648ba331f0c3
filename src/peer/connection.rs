//! The dialing side of a peer connection.
//!
//! Establishing a connection walks a fixed ladder:
//!
//! ```text
//! TCP connect
//!   -> write our BEP 3 handshake
//!   -> read the peer's handshake, check the info-hash
//!        no BEP 10 bit -> connected, chunk traffic impossible
//!        BEP 10 bit    -> send extension handshake + unchoke + interested
//!                      -> read until the peer's extension handshake arrives
//!                           m.ut_xet present -> connected, chunk traffic enabled
//!                           absent           -> connected, chunk traffic impossible
//! ```
//!
//! After that the connection is a request/response machine. One TCP
//! stream is shared by every task holding the handle; a single async
//! mutex serializes complete request/response exchanges so reads and
//! writes never interleave between tasks, and a task that acquires the
//! lock always writes whole frames before releasing it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, trace};
use zest_primitives::{ChunkHash, ChunkRange, InfoHash, PeerAddr, PeerId};

use super::{Error, CLIENT_VERSION};
use crate::protocol::extended::{ExtendedHandshake, EXTENSION_HANDSHAKE_ID, LOCAL_XET_ID};
use crate::protocol::handshake::Handshake;
use crate::protocol::message::{self, Message};
use crate::protocol::xet::XetMessage;

/// Stored bytes returned by a peer for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    /// Chunk index `data` starts at within the addressed content.
    pub chunk_offset: u32,
    pub data: Vec<u8>,
}

/// Terminal answer to one pipelined request, matched by `request_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinedChunk {
    pub request_id: u32,
    pub outcome: ChunkOutcome,
}

/// The three terminal answers a request can get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Received(ChunkData),
    NotFound,
    Failed { error_code: u32, message: String },
}

/// Stream state guarded by the per-peer mutex.
struct PeerIo {
    stream: TcpStream,
    peer_choking: bool,
    peer_interested: bool,
}

impl PeerIo {
    /// Folds a standard control message into local state. Messages with
    /// no chunk-addressed meaning (`have`, `bitfield`, `piece`,
    /// `request`, `cancel`, keepalive) are skipped.
    fn apply_control(&mut self, message: &Message) {
        match message {
            Message::Choke => self.peer_choking = true,
            Message::Unchoke => self.peer_choking = false,
            Message::Interested => self.peer_interested = true,
            Message::NotInterested => self.peer_interested = false,
            _ => {}
        }
        trace!(
            choking = self.peer_choking,
            interested = self.peer_interested,
            "peer control state"
        );
    }
}

/// A connected peer.
///
/// Cheap to share: the pool hands out `Arc<PeerConnection>` and every
/// method takes `&self`.
pub struct PeerConnection {
    addr: PeerAddr,
    info_hash: InfoHash,
    remote_peer_id: PeerId,
    remote_xet_id: Option<u8>,
    io: Mutex<PeerIo>,
    next_request_id: AtomicU32,
}

impl PeerConnection {
    /// Dials `addr` and walks the full handshake ladder.
    ///
    /// `listen_port` is announced in the extension handshake so the
    /// remote can dial back.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectTimeout`] when the ladder does not finish within
    /// `timeout`; transport, protocol and info-hash errors otherwise.
    pub async fn connect(
        addr: PeerAddr,
        info_hash: InfoHash,
        our_peer_id: PeerId,
        listen_port: u16,
        timeout: Duration,
    ) -> Result<Self, Error> {
        time::timeout(timeout, Self::establish(addr, info_hash, our_peer_id, listen_port))
            .await
            .map_err(|_| Error::ConnectTimeout)?
    }

    async fn establish(
        addr: PeerAddr,
        info_hash: InfoHash,
        our_peer_id: PeerId,
        listen_port: u16,
    ) -> Result<Self, Error> {
        let mut stream = TcpStream::connect(addr.socket_addr()).await?;

        Handshake::new(info_hash, our_peer_id).write_to(&mut stream).await?;
        let remote = Handshake::read_from(&mut stream).await?;
        if remote.info_hash != info_hash {
            return Err(Error::InfoHashMismatch {
                expected: info_hash,
                actual: remote.info_hash,
            });
        }

        let mut io = PeerIo {
            stream,
            peer_choking: true,
            peer_interested: false,
        };
        let mut remote_xet_id = None;

        if remote.supports_extension_protocol() {
            // Extension handshake, unchoke and interested go out in one
            // flush; then read until the peer's extension handshake.
            let ours = ExtendedHandshake::ours(listen_port, CLIENT_VERSION);
            let mut buf = Message::Extended {
                ext_id: EXTENSION_HANDSHAKE_ID,
                payload: ours.to_bytes(),
            }
            .to_frame();
            buf.extend_from_slice(&Message::Unchoke.to_frame());
            buf.extend_from_slice(&Message::Interested.to_frame());
            io.stream.write_all(&buf).await?;
            io.stream.flush().await?;

            loop {
                match message::read_message(&mut io.stream).await? {
                    Message::Extended {
                        ext_id: EXTENSION_HANDSHAKE_ID,
                        payload,
                    } => {
                        remote_xet_id = ExtendedHandshake::from_bytes(&payload)?.xet_id();
                        break;
                    }
                    other => io.apply_control(&other),
                }
            }
        }

        debug!(peer = %addr, xet = remote_xet_id.is_some(), "peer connected");

        Ok(Self {
            addr,
            info_hash,
            remote_peer_id: remote.peer_id,
            remote_xet_id,
            io: Mutex::new(io),
            next_request_id: AtomicU32::new(0),
        })
    }

    #[must_use]
    pub fn addr(&self) -> PeerAddr {
        self.addr
    }

    #[must_use]
    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    #[must_use]
    pub fn remote_peer_id(&self) -> PeerId {
        self.remote_peer_id
    }

    /// Whether the remote advertised `ut_xet` with a non-zero id.
    #[must_use]
    pub fn supports_xet(&self) -> bool {
        self.remote_xet_id.is_some()
    }

    /// Requests one chunk range and waits for its terminal answer.
    ///
    /// Standard control messages seen while waiting update local state;
    /// extended messages for other request ids are discarded (another
    /// task's pipelined answer already consumed by this read loop).
    ///
    /// # Errors
    ///
    /// [`Error::ChunkNotFound`] / [`Error::ChunkError`] for negative
    /// answers (connection stays healthy); [`Error::XetNotAdvertised`]
    /// when the remote cannot carry chunk traffic; transport and
    /// protocol errors otherwise.
    pub async fn request_chunk(&self, hash: ChunkHash, range: ChunkRange) -> Result<ChunkData, Error> {
        let remote_xet_id = self.remote_xet_id.ok_or(Error::XetNotAdvertised)?;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let mut io = self.io.lock().await;
        let request = Message::Extended {
            ext_id: remote_xet_id,
            payload: XetMessage::ChunkRequest {
                request_id,
                chunk_hash: hash,
                range,
            }
            .to_bytes(),
        };
        message::write_message(&mut io.stream, &request).await?;

        loop {
            match Self::next_xet_message(&mut io).await? {
                XetMessage::ChunkResponse {
                    request_id: id,
                    chunk_offset,
                    data,
                } if id == request_id => {
                    return Ok(ChunkData { chunk_offset, data });
                }
                XetMessage::ChunkNotFound { request_id: id, .. } if id == request_id => {
                    return Err(Error::ChunkNotFound);
                }
                XetMessage::ChunkError {
                    request_id: id,
                    error_code,
                    message,
                } if id == request_id => {
                    return Err(Error::ChunkError { error_code, message });
                }
                other => {
                    trace!(peer = %self.addr, request_id = other.request_id(), "discarding unmatched ut_xet message");
                }
            }
        }
    }

    /// Sends a batch of chunk requests in one flush and returns their
    /// request ids.
    ///
    /// The caller then calls [`Self::receive_chunk_response`] once per
    /// request; answers arrive in whatever order the peer produces them.
    ///
    /// # Errors
    ///
    /// [`Error::XetNotAdvertised`] or transport errors.
    pub async fn send_chunk_requests(&self, requests: &[(ChunkHash, ChunkRange)]) -> Result<Vec<u32>, Error> {
        let remote_xet_id = self.remote_xet_id.ok_or(Error::XetNotAdvertised)?;

        let mut io = self.io.lock().await;
        let mut ids = Vec::with_capacity(requests.len());
        let mut buf = Vec::new();
        for (hash, range) in requests {
            let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            ids.push(request_id);
            let frame = Message::Extended {
                ext_id: remote_xet_id,
                payload: XetMessage::ChunkRequest {
                    request_id,
                    chunk_hash: *hash,
                    range: *range,
                }
                .to_bytes(),
            }
            .to_frame();
            buf.extend_from_slice(&frame);
        }
        io.stream.write_all(&buf).await?;
        io.stream.flush().await?;
        Ok(ids)
    }

    /// Reads the next terminal answer, whichever outstanding request it
    /// belongs to. The caller matches by `request_id`.
    ///
    /// # Errors
    ///
    /// Transport and protocol errors. Negative answers are data here,
    /// not errors: they land in [`ChunkOutcome`].
    pub async fn receive_chunk_response(&self) -> Result<PipelinedChunk, Error> {
        let mut io = self.io.lock().await;
        loop {
            match Self::next_xet_message(&mut io).await? {
                XetMessage::ChunkResponse {
                    request_id,
                    chunk_offset,
                    data,
                } => {
                    return Ok(PipelinedChunk {
                        request_id,
                        outcome: ChunkOutcome::Received(ChunkData { chunk_offset, data }),
                    });
                }
                XetMessage::ChunkNotFound { request_id, .. } => {
                    return Ok(PipelinedChunk {
                        request_id,
                        outcome: ChunkOutcome::NotFound,
                    });
                }
                XetMessage::ChunkError {
                    request_id,
                    error_code,
                    message,
                } => {
                    return Ok(PipelinedChunk {
                        request_id,
                        outcome: ChunkOutcome::Failed { error_code, message },
                    });
                }
                XetMessage::ChunkRequest { .. } => {
                    trace!(peer = %self.addr, "ignoring chunk_request on a dialing connection");
                }
            }
        }
    }

    /// Reads messages until a `ut_xet` sub-message arrives, folding
    /// control messages into state and skipping other extensions.
    async fn next_xet_message(io: &mut PeerIo) -> Result<XetMessage, Error> {
        loop {
            match message::read_message(&mut io.stream).await? {
                Message::Extended { ext_id, payload } if ext_id == LOCAL_XET_ID => {
                    return Ok(XetMessage::from_bytes(&payload)?);
                }
                Message::Extended { ext_id, .. } => {
                    trace!(ext_id, "skipping extended message for another extension");
                }
                other => io.apply_control(&other),
            }
        }
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("addr", &self.addr)
            .field("info_hash", &self.info_hash)
            .field("xet", &self.remote_xet_id)
            .finish_non_exhaustive()
    }
}
