//! The `BitTorrent` swarm identifier for a xorb.
//!
//! Standard `BitTorrent` derives the info-hash from a torrent's info
//! dictionary. Zest has no torrent files: each xorb is its own swarm,
//! and the 20-byte identifier is derived from the 32-byte xorb hash by
//!
//! ```text
//! info_hash = SHA-1("zest-xet-v1:" || xorb_hash)
//! ```
//!
//! The derivation prefix is a fixed wire constant; any client that uses
//! the same prefix lands in the same swarm for the same xorb.

use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};

use crate::hash::ParseHashError;
use crate::XorbHash;

const INFO_HASH_BYTES_LEN: usize = 20;

/// Domain-separation prefix for the xorb-hash to info-hash derivation.
pub const INFO_HASH_DERIVATION_PREFIX: &[u8] = b"zest-xet-v1:";

/// `BitTorrent` swarm identifier derived from a xorb hash.
#[derive(PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct InfoHash(pub [u8; INFO_HASH_BYTES_LEN]);

impl InfoHash {
    /// Derives the swarm identifier for a xorb.
    ///
    /// Deterministic: the same xorb hash always maps to the same swarm.
    #[must_use]
    pub fn from_xorb_hash(xorb_hash: &XorbHash) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(INFO_HASH_DERIVATION_PREFIX);
        hasher.update(xorb_hash.as_slice());
        Self(hasher.finalize().into())
    }

    /// Returns the internal byte array.
    #[must_use]
    pub fn bytes(&self) -> [u8; INFO_HASH_BYTES_LEN] {
        self.0
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [0u8; INFO_HASH_BYTES_LEN * 2];
        binascii::bin2hex(&self.0, &mut chars).expect("failed to hexlify");
        write!(f, "{}", std::str::from_utf8(&chars).unwrap())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({self})")
    }
}

impl FromStr for InfoHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != INFO_HASH_BYTES_LEN * 2 {
            return Err(ParseHashError::InvalidLength(s.len()));
        }
        let mut hash = Self([0u8; INFO_HASH_BYTES_LEN]);
        binascii::hex2bin(s.as_bytes(), &mut hash.0).map_err(|_| ParseHashError::InvalidHex)?;
        Ok(hash)
    }
}

impl From<[u8; INFO_HASH_BYTES_LEN]> for InfoHash {
    fn from(bytes: [u8; INFO_HASH_BYTES_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use sha1::{Digest, Sha1};

    use super::{InfoHash, INFO_HASH_DERIVATION_PREFIX};
    use crate::XorbHash;

    #[test]
    fn derivation_is_deterministic_and_prefix_separated() {
        let xorb_hash = XorbHash([0x42; 32]);

        let derived = InfoHash::from_xorb_hash(&xorb_hash);
        let again = InfoHash::from_xorb_hash(&xorb_hash);
        assert_eq!(derived, again);

        let mut hasher = Sha1::new();
        hasher.update(INFO_HASH_DERIVATION_PREFIX);
        hasher.update([0x42; 32]);
        let expected: [u8; 20] = hasher.finalize().into();
        assert_eq!(derived.bytes(), expected);
    }

    #[test]
    fn distinct_xorb_hashes_derive_distinct_info_hashes() {
        let all_zeros = InfoHash::from_xorb_hash(&XorbHash([0x00; 32]));
        let all_ones = InfoHash::from_xorb_hash(&XorbHash([0xff; 32]));

        assert_ne!(all_zeros, all_ones);
    }

    #[test]
    fn an_info_hash_round_trips_through_its_hex_form() {
        let info_hash = InfoHash::from_xorb_hash(&XorbHash([0x07; 32]));
        let parsed: InfoHash = info_hash.to_string().parse().unwrap();

        assert_eq!(parsed, info_hash);
    }
}
