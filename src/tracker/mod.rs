//! HTTP tracker announce client (BEP 3).
//!
//! One request shape:
//!
//! ```text
//! GET {base}/announce?info_hash=<pct>&peer_id=<pct>&port=<p>
//!     &uploaded=0&downloaded=0&left=0&compact=1[&event=started]
//! ```
//!
//! Binary query values (the info-hash and the peer id) are
//! percent-encoded leaving only the RFC 3986 unreserved characters
//! bare. The response is a bencoded dict: a `failure reason` string
//! means the announce failed; otherwise `interval` (default 1800 s) and
//! a compact `peers` byte string come back.

use std::fmt;
use std::time::Duration;

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;
use thiserror::Error as ThisError;
use tracing::debug;
use zest_bencode::Value;
use zest_primitives::{InfoHash, PeerAddr, PeerId};

/// Seconds until the next announce when the tracker does not say.
const DEFAULT_ANNOUNCE_INTERVAL: u64 = 1800;

/// Everything but the RFC 3986 unreserved characters gets
/// percent-encoded. `NON_ALPHANUMERIC` already spares alphanumerics;
/// the four unreserved punctuation marks are carved out here.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("announce request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tracker base URL is invalid: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("tracker response is not canonical bencode: {0}")]
    Bencode(#[from] zest_bencode::Error),

    #[error("tracker response is missing or misshaping `{what}`")]
    Malformed { what: &'static str },

    /// The tracker answered with a `failure reason`.
    #[error("tracker refused the announce: {reason}")]
    Failure { reason: String },
}

/// The optional `event` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    Started,
    Stopped,
    Completed,
}

impl fmt::Display for AnnounceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnounceEvent::Started => write!(f, "started"),
            AnnounceEvent::Stopped => write!(f, "stopped"),
            AnnounceEvent::Completed => write!(f, "completed"),
        }
    }
}

/// A successful announce: when to come back, and who else is here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announce {
    pub interval: Duration,
    pub peers: Vec<PeerAddr>,
}

/// HTTP tracker client. One instance per download session.
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
    peer_id: PeerId,
}

impl Client {
    /// Builds a client for the tracker at `base_url`.
    ///
    /// # Errors
    ///
    /// Fails when the URL does not parse or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, peer_id: PeerId) -> Result<Self, Error> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            http: reqwest::Client::builder().build()?,
            peer_id,
        })
    }

    /// Announces this process to the tracker and returns the swarm's
    /// peer list.
    ///
    /// # Errors
    ///
    /// [`Error::Failure`] when the tracker answers with a
    /// `failure reason`; transport, bencode and shape errors otherwise.
    pub async fn announce(
        &self,
        info_hash: InfoHash,
        port: u16,
        event: Option<AnnounceEvent>,
    ) -> Result<Announce, Error> {
        let url = self.build_announce_url(info_hash, port, event);
        debug!(%url, "announcing to tracker");

        let response = self.http.get(url).send().await?;
        let body = response.bytes().await?;
        parse_announce_response(&body)
    }

    /// Assembles the announce URL by hand: binary query values cannot go
    /// through a typed query serializer, they are raw bytes.
    fn build_announce_url(&self, info_hash: InfoHash, port: u16, event: Option<AnnounceEvent>) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = format!(
            "{base}/announce?info_hash={}&peer_id={}&port={port}&compact=1&uploaded=0&downloaded=0&left=0",
            percent_encode(info_hash.as_slice(), QUERY_VALUE),
            percent_encode(&self.peer_id.bytes(), QUERY_VALUE),
        );
        if let Some(event) = event {
            url.push_str(&format!("&event={event}"));
        }
        url
    }
}

fn parse_announce_response(body: &[u8]) -> Result<Announce, Error> {
    let root = zest_bencode::decode(body)?;
    if root.as_dict().is_none() {
        return Err(Error::Malformed { what: "response dict" });
    }

    if let Some(reason) = root.lookup(b"failure reason") {
        let reason = reason
            .as_str()
            .ok_or(Error::Malformed { what: "failure reason" })?
            .to_string();
        return Err(Error::Failure { reason });
    }

    let interval = root
        .lookup(b"interval")
        .map(|value| {
            value
                .as_int()
                .and_then(|secs| u64::try_from(secs).ok())
                .ok_or(Error::Malformed { what: "interval" })
        })
        .transpose()?
        .unwrap_or(DEFAULT_ANNOUNCE_INTERVAL);

    let peers = match root.lookup(b"peers") {
        None => Vec::new(),
        Some(Value::Bytes(compact)) => {
            if compact.len() % 6 != 0 {
                return Err(Error::Malformed { what: "compact peers" });
            }
            compact
                .chunks_exact(6)
                .map(|chunk| PeerAddr::from_compact(chunk).expect("chunk is 6 bytes"))
                .collect()
        }
        // Dictionary-model peer lists are a different tracker dialect;
        // this client only speaks compact.
        Some(_) => return Err(Error::Malformed { what: "peers" }),
    };

    Ok(Announce {
        interval: Duration::from_secs(interval),
        peers,
    })
}

#[cfg(test)]
mod tests {
    use zest_primitives::{InfoHash, PeerId};

    use super::{parse_announce_response, AnnounceEvent, Client, Error};

    fn client() -> Client {
        Client::new("http://tracker.example.com", PeerId(*b"-ZS0001-aaaaaaaaaaaa")).unwrap()
    }

    #[test]
    fn the_announce_url_percent_encodes_binary_values() {
        let url = client().build_announce_url(InfoHash([0x9C; 20]), 6881, Some(AnnounceEvent::Started));

        assert!(url.starts_with("http://tracker.example.com/announce?info_hash=%9C%9C"));
        assert!(url.contains("&peer_id=-ZS0001-aaaaaaaaaaaa"));
        assert!(url.contains("&port=6881"));
        assert!(url.contains("&compact=1"));
        assert!(url.contains("&uploaded=0&downloaded=0&left=0"));
        assert!(url.ends_with("&event=started"));
    }

    #[test]
    fn unreserved_characters_stay_bare_and_others_do_not() {
        let mut hash = [b'~'; 20];
        hash[0] = 0x00;
        hash[1] = b' ';
        let url = client().build_announce_url(InfoHash(hash), 1, None);

        assert!(url.contains("info_hash=%00%20~~"));
        assert!(!url.contains("&event="));
    }

    #[test]
    fn a_compact_response_parses_interval_and_peers() {
        let body = b"d8:intervali900e5:peers6:\x0A\x00\x00\x01\x1F\x90e";

        let announce = parse_announce_response(body).unwrap();

        assert_eq!(announce.interval.as_secs(), 900);
        assert_eq!(announce.peers.len(), 1);
        assert_eq!(announce.peers[0].to_string(), "10.0.0.1:8080");
    }

    #[test]
    fn a_missing_interval_defaults_to_1800_seconds() {
        let announce = parse_announce_response(b"d5:peers0:e").unwrap();

        assert_eq!(announce.interval.as_secs(), 1800);
        assert!(announce.peers.is_empty());
    }

    #[test]
    fn a_failure_reason_surfaces_as_a_tracker_error() {
        let result = parse_announce_response(b"d14:failure reason15:unknown torrente");

        assert!(matches!(result, Err(Error::Failure { reason }) if reason == "unknown torrent"));
    }

    #[test]
    fn non_compact_peer_lists_are_rejected() {
        let body = b"d8:intervali900e5:peersld2:ip8:10.0.0.14:porti8080eeee";

        assert!(matches!(
            parse_announce_response(body),
            Err(Error::Malformed { what: "peers" })
        ));
    }

    #[test]
    fn a_ragged_compact_peers_string_is_rejected() {
        assert!(parse_announce_response(b"d5:peers5:aaaaae").is_err());
    }
}
