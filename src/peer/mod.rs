//! The peer connection plane.
//!
//! - [`connection`]: the dialing side, a handshake state machine plus
//!   chunk requests and pipelined responses over one shared TCP stream.
//! - [`seeding`]: the accepting side, a listener that answers
//!   `chunk_request` sub-messages from local storage.
//! - [`pool`]: persistent connections keyed by peer address, bounded
//!   with LRU eviction.

pub mod connection;
pub mod error;
pub mod pool;
pub mod seeding;

pub use self::connection::{ChunkData, ChunkOutcome, PeerConnection, PipelinedChunk};
pub use self::error::Error;
pub use self::pool::PeerPool;
pub use self::seeding::{Seeder, SeederHandle};

/// Version string announced in the BEP 10 extension handshake.
pub const CLIENT_VERSION: &str = concat!("zest ", env!("CARGO_PKG_VERSION"));
