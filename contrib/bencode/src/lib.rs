//! Strict bencode codec for the zest wire planes.
//!
//! Bencoding is the wire format shared by the BEP 10 extended handshake,
//! the DHT KRPC messages and the HTTP tracker announce response. Four
//! value kinds exist:
//!
//! - signed 64-bit integers: `i42e`
//! - byte strings: `4:spam`
//! - lists: `l4:spami42ee`
//! - dictionaries with byte-string keys: `d3:cow3:mooe`
//!
//! The decoder only accepts canonical input: dictionary keys must appear
//! in strictly increasing lexicographic order, integers may not carry
//! leading zeros and `-0` is rejected. Because of that, every accepted
//! input has exactly one in-memory representation and
//! `encode(decode(input)) == input` holds byte for byte.
//!
//! The encoder writes dictionary entries in the caller-supplied order and
//! never sorts; callers building messages are responsible for providing
//! sorted keys.

mod decode;
mod encode;
mod error;
mod value;

pub use crate::decode::{decode, decode_prefix};
pub use crate::encode::encode;
pub use crate::error::Error;
pub use crate::value::Value;

pub(crate) const BEN_END: u8 = b'e';
pub(crate) const DICT_START: u8 = b'd';
pub(crate) const LIST_START: u8 = b'l';
pub(crate) const INT_START: u8 = b'i';
pub(crate) const BYTE_LEN_END: u8 = b':';

/// Nesting depth after which the decoder bails out instead of recursing.
pub(crate) const MAX_DEPTH: usize = 64;
