//! The KRPC message format from BEP 5.
//!
//! Bencoded dicts over UDP. Every message carries `t` (a 2-byte
//! transaction id echoed by the responder) and `y` (`q`, `r` or `e`).
//! Queries add `q` (method name) and `a` (arguments); responses add
//! `r`; errors add `e` as a `[code, message]` list.
//!
//! Encoding goes through the strict bencoder, so every dict below lists
//! its keys in sorted order on purpose.

use rand::Rng;
use zest_bencode::Value;
use zest_primitives::{InfoHash, NodeId, PeerAddr};

use super::compact::{decode_nodes, encode_nodes};
use super::routing_table::NodeEntry;
use super::Error;

/// 2-byte transaction id correlating a response with its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub [u8; 2]);

impl TransactionId {
    /// A fresh random transaction id.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// The four queries this node sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Ping {
        id: NodeId,
    },
    FindNode {
        id: NodeId,
        target: NodeId,
    },
    GetPeers {
        id: NodeId,
        info_hash: InfoHash,
    },
    AnnouncePeer {
        id: NodeId,
        info_hash: InfoHash,
        port: u16,
        token: Vec<u8>,
        implied_port: bool,
    },
}

impl Query {
    #[must_use]
    pub fn method_name(&self) -> &'static str {
        match self {
            Query::Ping { .. } => "ping",
            Query::FindNode { .. } => "find_node",
            Query::GetPeers { .. } => "get_peers",
            Query::AnnouncePeer { .. } => "announce_peer",
        }
    }

    /// The `a` arguments dict, keys pre-sorted.
    fn arguments(&self) -> Value {
        match self {
            Query::Ping { id } => Value::Dict(vec![(b"id".to_vec(), Value::from(id.as_slice()))]),
            Query::FindNode { id, target } => Value::Dict(vec![
                (b"id".to_vec(), Value::from(id.as_slice())),
                (b"target".to_vec(), Value::from(target.as_slice())),
            ]),
            Query::GetPeers { id, info_hash } => Value::Dict(vec![
                (b"id".to_vec(), Value::from(id.as_slice())),
                (b"info_hash".to_vec(), Value::from(info_hash.as_slice())),
            ]),
            Query::AnnouncePeer {
                id,
                info_hash,
                port,
                token,
                implied_port,
            } => Value::Dict(vec![
                (b"id".to_vec(), Value::from(id.as_slice())),
                (b"implied_port".to_vec(), Value::Int(i64::from(*implied_port))),
                (b"info_hash".to_vec(), Value::from(info_hash.as_slice())),
                (b"port".to_vec(), Value::Int(i64::from(*port))),
                (b"token".to_vec(), Value::Bytes(token.clone())),
            ]),
        }
    }
}

/// Body of a response: the responder's id plus whichever of the
/// optional fields it chose to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub id: Option<NodeId>,
    /// Compact nodes closer to the target, from `find_node`/`get_peers`.
    pub nodes: Vec<NodeEntry>,
    /// Compact peers for the requested info-hash, from `get_peers`.
    pub peers: Vec<PeerAddr>,
    /// Token to echo in a later `announce_peer`.
    pub token: Option<Vec<u8>>,
}

/// A complete KRPC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Query {
        transaction_id: TransactionId,
        query: Query,
    },
    Response {
        transaction_id: TransactionId,
        response: Response,
    },
    Error {
        transaction_id: TransactionId,
        code: i64,
        message: String,
    },
}

impl Message {
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            Message::Query { transaction_id, .. }
            | Message::Response { transaction_id, .. }
            | Message::Error { transaction_id, .. } => *transaction_id,
        }
    }

    /// Encodes the message into a datagram payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let entries = match self {
            Message::Query { transaction_id, query } => vec![
                (b"a".to_vec(), query.arguments()),
                (b"q".to_vec(), Value::from(query.method_name())),
                (b"t".to_vec(), Value::from(transaction_id.as_slice())),
                (b"y".to_vec(), Value::from("q")),
            ],
            Message::Response {
                transaction_id,
                response,
            } => {
                let mut body = Vec::new();
                if let Some(id) = response.id {
                    body.push((b"id".to_vec(), Value::from(id.as_slice())));
                }
                if !response.nodes.is_empty() {
                    body.push((b"nodes".to_vec(), Value::Bytes(encode_nodes(&response.nodes))));
                }
                if let Some(token) = &response.token {
                    body.push((b"token".to_vec(), Value::Bytes(token.clone())));
                }
                if !response.peers.is_empty() {
                    let values = response
                        .peers
                        .iter()
                        .map(|peer| Value::Bytes(peer.to_compact().to_vec()))
                        .collect();
                    body.push((b"values".to_vec(), Value::List(values)));
                }
                vec![
                    (b"r".to_vec(), Value::Dict(body)),
                    (b"t".to_vec(), Value::from(transaction_id.as_slice())),
                    (b"y".to_vec(), Value::from("r")),
                ]
            }
            Message::Error {
                transaction_id,
                code,
                message,
            } => vec![
                (
                    b"e".to_vec(),
                    Value::List(vec![Value::Int(*code), Value::from(message.as_str())]),
                ),
                (b"t".to_vec(), Value::from(transaction_id.as_slice())),
                (b"y".to_vec(), Value::from("e")),
            ],
        };
        zest_bencode::encode(&Value::Dict(entries))
    }

    /// Decodes a datagram payload.
    ///
    /// # Errors
    ///
    /// [`Error::Bencode`] for non-canonical bencode, [`Error::Malformed`]
    /// for a dict that is not a KRPC message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let root = zest_bencode::decode(bytes)?;

        let transaction_id = root
            .lookup(b"t")
            .and_then(Value::as_bytes)
            .and_then(|t| <[u8; 2]>::try_from(t).ok())
            .map(TransactionId)
            .ok_or(Error::Malformed { what: "transaction id" })?;

        match root.lookup(b"y").and_then(Value::as_bytes) {
            Some(b"q") => {
                let query = decode_query(&root)?;
                Ok(Message::Query { transaction_id, query })
            }
            Some(b"r") => {
                let response = decode_response(&root)?;
                Ok(Message::Response {
                    transaction_id,
                    response,
                })
            }
            Some(b"e") => {
                let body = root
                    .lookup(b"e")
                    .and_then(Value::as_list)
                    .ok_or(Error::Malformed { what: "error body" })?;
                let code = body.first().and_then(Value::as_int).unwrap_or(0);
                let message = body
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Message::Error {
                    transaction_id,
                    code,
                    message,
                })
            }
            _ => Err(Error::Malformed { what: "message kind" }),
        }
    }
}

fn decode_query(root: &Value) -> Result<Query, Error> {
    let method = root
        .lookup(b"q")
        .and_then(Value::as_bytes)
        .ok_or(Error::Malformed { what: "query method" })?;
    let args = root
        .lookup(b"a")
        .ok_or(Error::Malformed { what: "query arguments" })?;

    let id = node_id_arg(args, b"id")?;
    match method {
        b"ping" => Ok(Query::Ping { id }),
        b"find_node" => Ok(Query::FindNode {
            id,
            target: node_id_arg(args, b"target")?,
        }),
        b"get_peers" => Ok(Query::GetPeers {
            id,
            info_hash: info_hash_arg(args)?,
        }),
        b"announce_peer" => {
            let port = args
                .lookup(b"port")
                .and_then(Value::as_int)
                .and_then(|p| u16::try_from(p).ok())
                .ok_or(Error::Malformed { what: "announce port" })?;
            let token = args
                .lookup(b"token")
                .and_then(Value::as_bytes)
                .ok_or(Error::Malformed { what: "announce token" })?
                .to_vec();
            let implied_port = args
                .lookup(b"implied_port")
                .and_then(Value::as_int)
                .unwrap_or(0)
                != 0;
            Ok(Query::AnnouncePeer {
                id,
                info_hash: info_hash_arg(args)?,
                port,
                token,
                implied_port,
            })
        }
        _ => Err(Error::Malformed { what: "query method" }),
    }
}

fn decode_response(root: &Value) -> Result<Response, Error> {
    let body = root
        .lookup(b"r")
        .ok_or(Error::Malformed { what: "response body" })?;

    let id = body
        .lookup(b"id")
        .and_then(Value::as_bytes)
        .and_then(|id| <[u8; 20]>::try_from(id).ok())
        .map(NodeId);

    let nodes = match body.lookup(b"nodes").and_then(Value::as_bytes) {
        Some(bytes) => decode_nodes(bytes)?,
        None => Vec::new(),
    };

    let mut peers = Vec::new();
    if let Some(values) = body.lookup(b"values").and_then(Value::as_list) {
        for value in values {
            let compact = value
                .as_bytes()
                .ok_or(Error::Malformed { what: "compact peer" })?;
            let peer = PeerAddr::from_compact(compact).map_err(|_| Error::Malformed { what: "compact peer" })?;
            peers.push(peer);
        }
    }

    let token = body.lookup(b"token").and_then(Value::as_bytes).map(<[u8]>::to_vec);

    Ok(Response {
        id,
        nodes,
        peers,
        token,
    })
}

fn node_id_arg(args: &Value, key: &[u8]) -> Result<NodeId, Error> {
    args.lookup(key)
        .and_then(Value::as_bytes)
        .and_then(|id| <[u8; 20]>::try_from(id).ok())
        .map(NodeId)
        .ok_or(Error::Malformed { what: "node id" })
}

fn info_hash_arg(args: &Value) -> Result<InfoHash, Error> {
    args.lookup(b"info_hash")
        .and_then(Value::as_bytes)
        .and_then(|hash| <[u8; 20]>::try_from(hash).ok())
        .map(InfoHash)
        .ok_or(Error::Malformed { what: "info hash" })
}
