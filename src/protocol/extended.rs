//! The BEP 10 extension handshake.
//!
//! Sent by both sides as extended message `0` right after the BEP 3
//! handshake when both advertised the extension-protocol bit. The
//! payload is a bencoded dict:
//!
//! - `m`: mapping from extension name to the sender's assigned id; an
//!   id of `0` retracts the extension.
//! - `p`: the sender's TCP listen port.
//! - `v`: the sender's client version string.
//!
//! Zest registers one extension, `ut_xet`, under local id `1`. Whatever
//! id the remote assigns in its own `m` is the id used when addressing
//! sub-messages to it.

use zest_bencode::Value;

use super::Error;

/// Extended message id reserved for the handshake itself.
pub const EXTENSION_HANDSHAKE_ID: u8 = 0;

/// Name of the chunk-transfer extension.
pub const XET_EXTENSION_NAME: &str = "ut_xet";

/// The id this process assigns to `ut_xet` in its own handshake.
pub const LOCAL_XET_ID: u8 = 1;

/// A decoded BEP 10 extension handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedHandshake {
    /// Extension name to assigned id, in wire order.
    pub extensions: Vec<(String, u8)>,
    /// TCP listen port, when the sender announced one.
    pub port: Option<u16>,
    /// Client version string, when the sender announced one.
    pub version: Option<String>,
}

impl ExtendedHandshake {
    /// Builds our handshake: `ut_xet` under [`LOCAL_XET_ID`], our listen
    /// port and client version.
    #[must_use]
    pub fn ours(listen_port: u16, version: &str) -> Self {
        Self {
            extensions: vec![(XET_EXTENSION_NAME.to_string(), LOCAL_XET_ID)],
            port: Some(listen_port),
            version: Some(version.to_string()),
        }
    }

    /// The id the sender assigned to `ut_xet`, if it advertised the
    /// extension with a non-zero id.
    #[must_use]
    pub fn xet_id(&self) -> Option<u8> {
        self.extensions
            .iter()
            .find(|(name, _)| name == XET_EXTENSION_NAME)
            .map(|(_, id)| *id)
            .filter(|id| *id != 0)
    }

    /// Encodes the handshake dict. Keys are emitted pre-sorted
    /// (`m` < `p` < `v`) because the encoder writes them verbatim.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut extensions: Vec<(Vec<u8>, Value)> = self
            .extensions
            .iter()
            .map(|(name, id)| (name.clone().into_bytes(), Value::Int(i64::from(*id))))
            .collect();
        extensions.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut entries = vec![(b"m".to_vec(), Value::Dict(extensions))];
        if let Some(port) = self.port {
            entries.push((b"p".to_vec(), Value::Int(i64::from(port))));
        }
        if let Some(version) = &self.version {
            entries.push((b"v".to_vec(), Value::bytes(version.as_str())));
        }

        zest_bencode::encode(&Value::Dict(entries))
    }

    /// Decodes a handshake dict.
    ///
    /// # Errors
    ///
    /// [`Error::Bencode`] when the payload is not canonical bencode,
    /// [`Error::Malformed`] when the dict shape is wrong.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, Error> {
        let root = zest_bencode::decode(payload)?;
        let dict = root.as_dict().ok_or(Error::Malformed {
            what: "extension handshake",
        })?;

        let mut extensions = Vec::new();
        if let Some(m) = root.lookup(b"m") {
            let entries = m.as_dict().ok_or(Error::Malformed {
                what: "extension handshake `m` entry",
            })?;
            for (name, id) in entries {
                let id = id.as_int().ok_or(Error::Malformed {
                    what: "extension handshake `m` entry",
                })?;
                let id = u8::try_from(id).map_err(|_| Error::Malformed {
                    what: "extension handshake `m` entry",
                })?;
                let name = String::from_utf8(name.clone()).map_err(|_| Error::Malformed {
                    what: "extension handshake `m` entry",
                })?;
                extensions.push((name, id));
            }
        }

        let port = match dict.iter().find(|(k, _)| k == b"p") {
            Some((_, value)) => Some(
                value
                    .as_int()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or(Error::Malformed {
                        what: "extension handshake `p` entry",
                    })?,
            ),
            None => None,
        };

        let version = root
            .lookup(b"v")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        Ok(Self {
            extensions,
            port,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtendedHandshake, LOCAL_XET_ID};
    use crate::protocol::Error;

    #[test]
    fn our_handshake_advertises_ut_xet_port_and_version() {
        let bytes = ExtendedHandshake::ours(6881, "zest 0.1.0").to_bytes();

        assert_eq!(bytes, b"d1:md6:ut_xeti1eee1:pi6881e1:v10:zest 0.1.0e");
    }

    #[test]
    fn a_handshake_round_trips() {
        let ours = ExtendedHandshake::ours(6881, "zest 0.1.0");
        let parsed = ExtendedHandshake::from_bytes(&ours.to_bytes()).unwrap();

        assert_eq!(parsed, ours);
        assert_eq!(parsed.xet_id(), Some(LOCAL_XET_ID));
        assert_eq!(parsed.port, Some(6881));
    }

    #[test]
    fn a_remote_advertising_ut_xet_under_another_id_is_honored() {
        let parsed = ExtendedHandshake::from_bytes(b"d1:md6:ut_xeti3eee").unwrap();

        assert_eq!(parsed.xet_id(), Some(3));
    }

    #[test]
    fn a_zero_id_retracts_the_extension() {
        let parsed = ExtendedHandshake::from_bytes(b"d1:md6:ut_xeti0eee").unwrap();

        assert_eq!(parsed.xet_id(), None);
    }

    #[test]
    fn a_handshake_without_ut_xet_reports_no_extension() {
        let parsed = ExtendedHandshake::from_bytes(b"d1:md11:ut_metadatai2eee").unwrap();

        assert_eq!(parsed.xet_id(), None);
        assert_eq!(parsed.extensions, vec![("ut_metadata".to_string(), 2)]);
    }

    #[test]
    fn a_non_dict_payload_is_malformed() {
        assert!(matches!(
            ExtendedHandshake::from_bytes(b"i42e"),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            ExtendedHandshake::from_bytes(b"not bencode"),
            Err(Error::Bencode(_))
        ));
    }
}
