//! The BEP 3 connection handshake.
//!
//! First bytes on every peer connection, fixed 68-byte layout:
//!
//! ```text
//! [1  pstrlen = 19]
//! [19 "BitTorrent protocol"]
//! [8  reserved]
//! [20 info_hash]
//! [20 peer_id]
//! ```
//!
//! Reserved byte 5, mask `0x10`, advertises the BEP 10 extension
//! protocol. Zest always sets it; a remote that leaves it clear cannot
//! carry `ut_xet` traffic.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zest_primitives::{InfoHash, PeerId};

use super::{Error, PROTOCOL_STRING};

/// Total size of a serialized handshake.
pub const HANDSHAKE_LEN: usize = 68;

/// Index into the reserved bytes carrying the extension-protocol bit.
const EXTENSION_BYTE: usize = 5;

/// BEP 10 extension-protocol bit within reserved byte 5.
const EXTENSION_BIT: u8 = 0x10;

/// A decoded BEP 3 handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
}

impl Handshake {
    /// Builds our side of the handshake, advertising BEP 10.
    #[must_use]
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        let mut reserved = [0u8; 8];
        reserved[EXTENSION_BYTE] |= EXTENSION_BIT;
        Self {
            reserved,
            info_hash,
            peer_id,
        }
    }

    /// Whether the remote advertised the BEP 10 extension protocol.
    #[must_use]
    pub fn supports_extension_protocol(&self) -> bool {
        self.reserved[EXTENSION_BYTE] & EXTENSION_BIT != 0
    }

    /// Serializes into the fixed 68-byte wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = u8::try_from(PROTOCOL_STRING.len()).expect("protocol string fits a byte");
        buf[1..20].copy_from_slice(PROTOCOL_STRING.as_bytes());
        buf[20..28].copy_from_slice(&self.reserved);
        buf[28..48].copy_from_slice(self.info_hash.as_slice());
        buf[48..68].copy_from_slice(&self.peer_id.bytes());
        buf
    }

    /// Parses the fixed 68-byte wire layout.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidProtocolString`] when pstrlen or pstr differ from
    /// the BEP 3 constants.
    pub fn from_bytes(buf: &[u8; HANDSHAKE_LEN]) -> Result<Self, Error> {
        if usize::from(buf[0]) != PROTOCOL_STRING.len() || &buf[1..20] != PROTOCOL_STRING.as_bytes() {
            return Err(Error::InvalidProtocolString);
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&buf[20..28]);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);

        Ok(Self {
            reserved,
            info_hash: info_hash.into(),
            peer_id: peer_id.into(),
        })
    }

    /// Writes the handshake to the stream in one flush.
    ///
    /// # Errors
    ///
    /// Fails on transport errors.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut W) -> Result<(), Error> {
        stream.write_all(&self.to_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Reads and validates a handshake from the stream.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or an invalid protocol string.
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Self, Error> {
        let mut buf = [0u8; HANDSHAKE_LEN];
        stream.read_exact(&mut buf).await?;
        Self::from_bytes(&buf)
    }
}
