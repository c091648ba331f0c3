//! The `BitTorrent` wire protocol.
//!
//! Three layers, bottom up:
//!
//! - [`handshake`]: the fixed 68-byte BEP 3 handshake that opens every
//!   connection and negotiates BEP 10 support via a reserved bit.
//! - [`message`]: length-prefixed message framing and the standard
//!   message ids `0..=8` plus `20` (extended).
//! - [`extended`] and [`xet`]: the BEP 10 extension handshake and the
//!   `ut_xet` chunk-transfer sub-messages riding on it.
//!
//! Everything here is a pure codec over `AsyncRead`/`AsyncWrite` plus
//! byte buffers; connection state machines live in [`crate::peer`].

pub mod error;
pub mod extended;
pub mod handshake;
pub mod message;
pub mod xet;

pub use self::error::Error;

/// The BEP 3 protocol identifier sent in every handshake.
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";
