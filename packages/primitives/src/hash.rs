//! Content hashes for xorbs and chunks.
//!
//! Both are 32-byte BLAKE3 values computed by the upstream CAS; this
//! crate never hashes content itself, it only carries, parses and
//! formats the identifiers. They are distinct types on purpose: a chunk
//! hash is never a valid xorb hash and the compiler should say so.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub(crate) const HASH_BYTES_LEN: usize = 32;

/// Error returned when parsing a 64-char hex string into a hash fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseHashError {
    #[error("expected 64 hex characters, got {0}")]
    InvalidLength(usize),
    #[error("invalid hexadecimal input")]
    InvalidHex,
}

macro_rules! hash_32 {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
        pub struct $name(pub [u8; HASH_BYTES_LEN]);

        impl $name {
            /// Returns the internal byte array.
            #[must_use]
            pub fn bytes(&self) -> [u8; HASH_BYTES_LEN] {
                self.0
            }

            #[must_use]
            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            /// Returns the hash as a lowercased hex string.
            #[must_use]
            pub fn to_hex_string(&self) -> String {
                self.to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut chars = [0u8; HASH_BYTES_LEN * 2];
                binascii::bin2hex(&self.0, &mut chars).expect("failed to hexlify");
                write!(f, "{}", std::str::from_utf8(&chars).unwrap())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseHashError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.len() != HASH_BYTES_LEN * 2 {
                    return Err(ParseHashError::InvalidLength(s.len()));
                }
                let mut hash = Self([0u8; HASH_BYTES_LEN]);
                binascii::hex2bin(s.as_bytes(), &mut hash.0).map_err(|_| ParseHashError::InvalidHex)?;
                Ok(hash)
            }
        }

        impl From<[u8; HASH_BYTES_LEN]> for $name {
            fn from(bytes: [u8; HASH_BYTES_LEN]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = ParseHashError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                let array: [u8; HASH_BYTES_LEN] =
                    bytes.try_into().map_err(|_| ParseHashError::InvalidLength(bytes.len() * 2))?;
                Ok(Self(array))
            }
        }

        impl serde::ser::Serialize for $name {
            fn serialize<S: serde::ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> serde::de::Deserialize<'de> for $name {
            fn deserialize<D: serde::de::Deserializer<'de>>(des: D) -> Result<Self, D::Error> {
                let s = <String as serde::de::Deserialize>::deserialize(des)?;
                s.parse()
                    .map_err(|_| serde::de::Error::invalid_value(serde::de::Unexpected::Str(&s), &"a 64 char hex string"))
            }
        }
    };
}

hash_32! {
    /// Identifier of a xorb: the BLAKE3 Merkle hash over its chunks.
    XorbHash
}

hash_32! {
    /// Identifier of a single deduplicated chunk: its BLAKE3 hash.
    ChunkHash
}

/// Xorbs and chunks share one content-hash namespace: a peer chunk
/// request addressed with a xorb's hash asks for that xorb's chunk
/// sequence, the same way a chunk's own hash asks for the single chunk.
impl From<XorbHash> for ChunkHash {
    fn from(hash: XorbHash) -> Self {
        Self(hash.0)
    }
}
