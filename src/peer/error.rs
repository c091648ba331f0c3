use zest_primitives::InfoHash;

use crate::protocol;

/// Error raised by a peer connection.
///
/// Two families matter to callers. *Connection* errors (transport and
/// protocol violations) mean the peer is broken: the pool entry gets
/// removed. *Negative responses* ([`Error::ChunkNotFound`] and
/// [`Error::ChunkError`]) are well-formed answers over a healthy
/// connection: the caller tries another source and keeps the peer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] protocol::Error),

    /// The remote answered the handshake for a different swarm.
    #[error("peer answered for a different swarm: expected {expected}, got {actual}")]
    InfoHashMismatch { expected: InfoHash, actual: InfoHash },

    /// The remote never advertised `ut_xet`; chunk traffic is
    /// impossible on this connection.
    #[error("peer did not advertise ut_xet")]
    XetNotAdvertised,

    /// Connecting plus handshaking did not finish in time.
    #[error("timed out establishing the peer connection")]
    ConnectTimeout,

    /// The peer does not hold the requested content.
    #[error("peer does not have the requested content")]
    ChunkNotFound,

    /// The peer failed while serving the request.
    #[error("peer failed serving the request ({error_code}): {message}")]
    ChunkError { error_code: u32, message: String },
}

impl Error {
    /// Whether this is a well-formed negative answer rather than a
    /// broken connection.
    #[must_use]
    pub fn is_negative_response(&self) -> bool {
        matches!(self, Error::ChunkNotFound | Error::ChunkError { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Wire(protocol::Error::Io(err))
    }
}
