//! Crate configuration.
//!
//! One flat section covering the peer plane, discovery and fetch
//! behavior. Loaded from a TOML file or built in code; every field has
//! a default so an empty file is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zest_primitives::PeerAddr;

/// Default TCP port the seeding listener binds; also the default UDP
/// port for the DHT node.
const DEFAULT_PORT: u16 = 6881;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Configuration {
    /// TCP port the seeding listener binds and the port announced to
    /// trackers and the DHT.
    pub listen_port: u16,

    /// Maximum number of simultaneously pooled peer connections.
    pub max_peers: usize,

    /// Peers tried before any discovery, in the order given.
    pub direct_peers: Vec<PeerAddr>,

    /// UDP port the DHT node binds. `0` picks an ephemeral port.
    pub dht_port: u16,

    /// Well-known DHT nodes pinged at startup to seed the routing table.
    pub dht_bootstrap_nodes: Vec<PeerAddr>,

    /// Seconds to wait for DHT responses before a lookup round returns
    /// with whatever arrived.
    pub dht_timeout_secs: u64,

    /// Base URL of the HTTP tracker, e.g. `http://tracker.example.com`.
    /// `None` disables tracker discovery.
    pub tracker_url: Option<String>,

    /// Seconds allowed for a TCP connect plus full peer handshake.
    pub peer_connect_timeout_secs: u64,

    /// Number of reconstruction terms fetched concurrently.
    pub fetch_concurrency: usize,

    /// Run term fetches inline on the calling task instead of as a
    /// concurrent batch. The output is identical; only scheduling
    /// changes.
    pub sequential_fetch: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            max_peers: 50,
            direct_peers: Vec::new(),
            dht_port: DEFAULT_PORT,
            dht_bootstrap_nodes: Vec::new(),
            dht_timeout_secs: 3,
            tracker_url: None,
            peer_connect_timeout_secs: 10,
            fetch_concurrency: 4,
            sequential_fetch: false,
        }
    }
}

impl Configuration {
    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not parse.
    pub fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::Configuration;

    #[test]
    fn default_configuration_is_complete() {
        let config = Configuration::default();

        assert_eq!(config.listen_port, 6881);
        assert_eq!(config.max_peers, 50);
        assert_eq!(config.dht_timeout_secs, 3);
        assert!(config.direct_peers.is_empty());
        assert!(!config.sequential_fetch);
    }

    #[test]
    fn a_partial_toml_file_fills_the_rest_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "listen_port = 7070\ndirect_peers = [\"10.0.0.1:6881\"]\ntracker_url = \"http://tracker.example.com\"\n"
        )
        .unwrap();

        let config = Configuration::load_from_file(file.path()).unwrap();

        assert_eq!(config.listen_port, 7070);
        assert_eq!(config.direct_peers.len(), 1);
        assert_eq!(config.direct_peers[0].to_string(), "10.0.0.1:6881");
        assert_eq!(config.tracker_url.as_deref(), Some("http://tracker.example.com"));
        assert_eq!(config.max_peers, Configuration::default().max_peers);
    }

    #[test]
    fn an_empty_file_is_the_default_configuration() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let config = Configuration::load_from_file(file.path()).unwrap();

        assert_eq!(config, Configuration::default());
    }
}
