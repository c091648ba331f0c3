use thiserror::Error;

/// Error raised while reading or writing the `BitTorrent` wire.
///
/// Transport failures surface as [`Error::Io`]; everything else means
/// the remote sent bytes that do not decode, which callers treat as a
/// protocol violation and drop the connection over.
#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o failure on the wire: {0}")]
    Io(#[from] std::io::Error),

    /// A handshake whose pstrlen or pstr is not the BEP 3 constant.
    #[error("handshake does not identify the BitTorrent protocol")]
    InvalidProtocolString,

    /// A frame announcing more bytes than the configured maximum.
    #[error("message of {size} bytes exceeds the frame cap")]
    InvalidMessageSize { size: u32 },

    /// A frame or sub-message whose payload does not match its layout.
    #[error("malformed {what}")]
    Malformed { what: &'static str },

    /// A bencoded payload the strict decoder rejected.
    #[error("malformed bencoded payload: {0}")]
    Bencode(#[from] zest_bencode::Error),
}
