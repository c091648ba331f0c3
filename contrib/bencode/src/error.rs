use thiserror::Error;

/// Decoding error, carrying the byte position the decoder gave up at.
///
/// All of these are recoverable: the input buffer is untouched and the
/// caller can report, skip or retry as it sees fit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A byte that cannot start or continue a value at this position.
    #[error("invalid bencode format at byte {pos}")]
    InvalidFormat { pos: usize },

    /// The input ended in the middle of a value.
    #[error("unexpected end of input at byte {pos}")]
    UnexpectedEnd { pos: usize },

    /// An integer with no digits, a lone `-`, or digits that do not fit
    /// in an `i64`.
    #[error("invalid integer at byte {pos}")]
    InvalidInteger { pos: usize },

    /// A zero-padded integer such as `i03e` (also covers `-03`).
    #[error("leading zero in integer at byte {pos}")]
    LeadingZero { pos: usize },

    /// The integer `-0`, which has no canonical meaning.
    #[error("negative zero integer at byte {pos}")]
    NegativeZero { pos: usize },

    /// A byte-string length that does not fit within the remaining input.
    #[error("string length at byte {pos} exceeds remaining input")]
    InvalidStringLength { pos: usize },

    /// A dictionary key that is not strictly greater than its predecessor.
    #[error("dictionary keys out of order at byte {pos}")]
    UnsortedDictKeys { pos: usize },

    /// The decoder could not reserve memory for a container.
    #[error("out of memory while decoding at byte {pos}")]
    OutOfMemory { pos: usize },
}

impl Error {
    /// Byte offset into the input at which decoding failed.
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Error::InvalidFormat { pos }
            | Error::UnexpectedEnd { pos }
            | Error::InvalidInteger { pos }
            | Error::LeadingZero { pos }
            | Error::NegativeZero { pos }
            | Error::InvalidStringLength { pos }
            | Error::UnsortedDictKeys { pos }
            | Error::OutOfMemory { pos } => *pos,
        }
    }
}
