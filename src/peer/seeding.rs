//! The accepting side of a peer connection: seeding local content.
//!
//! The seeder accepts inbound `BitTorrent` connections, mirrors the
//! dialing handshake ladder with the roles swapped (read the peer's
//! handshake first, echo its info-hash back), then settles into a serve
//! loop answering `chunk_request` sub-messages from local storage.
//!
//! Each accepted connection runs on its own task and owns its stream
//! exclusively, so the serve loop needs no lock: all reads and writes
//! on the stream happen from the one task driving it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use zest_primitives::PeerId;

use super::Error;
use crate::cas::ChunkProvider;
use crate::protocol::extended::{ExtendedHandshake, EXTENSION_HANDSHAKE_ID, LOCAL_XET_ID};
use crate::protocol::handshake::Handshake;
use crate::protocol::message::{self, Message};
use crate::protocol::xet::XetMessage;
use crate::protocol::Error as WireError;

/// Seeding listener: accepts peers and serves chunks while running.
pub struct Seeder {
    listener: TcpListener,
    provider: Arc<dyn ChunkProvider>,
    peer_id: PeerId,
    advertised_port: u16,
}

/// Handle to a spawned seeder; dropping it leaves the seeder running.
pub struct SeederHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SeederHandle {
    /// Signals the accept loop to stop and waits for it to finish.
    /// Connections being served finish their current exchange and end
    /// when their peer hangs up.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

impl Seeder {
    /// Binds the seeding listener.
    ///
    /// `advertised_port` is the port announced in extension handshakes;
    /// it may differ from the bound port when a forwarder sits in front.
    ///
    /// # Errors
    ///
    /// Fails when the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        provider: Arc<dyn ChunkProvider>,
        peer_id: PeerId,
        advertised_port: u16,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "seeding listener bound");
        Ok(Self {
            listener,
            provider,
            peer_id,
            advertised_port,
        })
    }

    /// The address the listener actually bound.
    ///
    /// # Errors
    ///
    /// Propagates the socket's local-address lookup failure.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns the accept loop onto the runtime.
    #[must_use]
    pub fn spawn(self) -> SeederHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = self.listener.accept() => {
                        let Ok((stream, remote)) = accepted else { continue };
                        let provider = Arc::clone(&self.provider);
                        let peer_id = self.peer_id;
                        let advertised_port = self.advertised_port;
                        tokio::spawn(async move {
                            if let Err(err) = serve_peer(stream, provider, peer_id, advertised_port).await {
                                debug!(peer = %remote, %err, "seeding connection ended with error");
                            }
                        });
                    }
                }
            }
        });
        SeederHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

/// Drives one inbound connection: handshake mirror, then serve loop.
async fn serve_peer(
    mut stream: TcpStream,
    provider: Arc<dyn ChunkProvider>,
    our_peer_id: PeerId,
    advertised_port: u16,
) -> Result<(), Error> {
    let remote = Handshake::read_from(&mut stream).await?;

    // Seeding serves any swarm whose content we hold; echo the peer's
    // info-hash rather than insisting on one of our own.
    Handshake::new(remote.info_hash, our_peer_id).write_to(&mut stream).await?;

    if remote.supports_extension_protocol() {
        let ours = ExtendedHandshake::ours(advertised_port, super::CLIENT_VERSION);
        let handshake = Message::Extended {
            ext_id: EXTENSION_HANDSHAKE_ID,
            payload: ours.to_bytes(),
        };
        message::write_message(&mut stream, &handshake).await?;
    }

    serve_loop(&mut stream, provider.as_ref()).await
}

/// Reads messages until the peer hangs up, answering chunk requests and
/// skipping everything else.
async fn serve_loop(stream: &mut TcpStream, provider: &dyn ChunkProvider) -> Result<(), Error> {
    // Until the peer's extension handshake names its ut_xet id, replies
    // use the conventional id 1.
    let mut reply_xet_id = LOCAL_XET_ID;

    loop {
        let incoming = match message::read_message(stream).await {
            Ok(incoming) => incoming,
            Err(WireError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        match incoming {
            Message::Extended {
                ext_id: EXTENSION_HANDSHAKE_ID,
                payload,
            } => {
                if let Some(id) = ExtendedHandshake::from_bytes(&payload)?.xet_id() {
                    reply_xet_id = id;
                }
            }
            Message::Extended { ext_id, payload } if ext_id == LOCAL_XET_ID => {
                if let XetMessage::ChunkRequest {
                    request_id,
                    chunk_hash,
                    range,
                } = XetMessage::from_bytes(&payload)?
                {
                    let answer = match provider.find_chunk(&chunk_hash, &range).await {
                        Some(hit) => XetMessage::ChunkResponse {
                            request_id,
                            chunk_offset: hit.chunk_offset,
                            data: hit.data,
                        },
                        // A miss is an answer, never a reason to hang up.
                        None => XetMessage::ChunkNotFound {
                            request_id,
                            chunk_hash,
                        },
                    };
                    let reply = Message::Extended {
                        ext_id: reply_xet_id,
                        payload: answer.to_bytes(),
                    };
                    message::write_message(stream, &reply).await?;
                }
            }
            Message::Extended { ext_id, .. } => {
                debug!(ext_id, "ignoring extended message for an unknown extension");
            }
            // Standard control messages carry no meaning for
            // chunk-addressed seeding.
            _ => {}
        }
    }
}
