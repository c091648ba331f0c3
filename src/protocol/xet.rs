//! The `ut_xet` chunk-transfer sub-messages.
//!
//! Each rides inside a BEP 10 extended message: after the negotiated
//! extension id comes a 1-byte sub-message type and a fixed big-endian
//! header.
//!
//! | Type | Name              | Payload after the type byte |
//! |-----:|-------------------|-----------------------------|
//! | 0x01 | `chunk_request`   | `request_id u32, chunk_hash [32], range_start u32, range_end u32` |
//! | 0x02 | `chunk_response`  | `request_id u32, chunk_offset u32, data_len u32, data` |
//! | 0x03 | `chunk_not_found` | `request_id u32, chunk_hash [32]` |
//! | 0x04 | `chunk_error`     | `request_id u32, error_code u32, message` |
//!
//! `request_id` is a per-connection counter assigned by the requester;
//! responses echo it, which is what lets pipelined responses arrive out
//! of order.

use zest_primitives::{ChunkHash, ChunkRange};

use super::Error;

const TYPE_CHUNK_REQUEST: u8 = 0x01;
const TYPE_CHUNK_RESPONSE: u8 = 0x02;
const TYPE_CHUNK_NOT_FOUND: u8 = 0x03;
const TYPE_CHUNK_ERROR: u8 = 0x04;

/// A decoded `ut_xet` sub-message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XetMessage {
    /// Ask for the chunks `range` of the content addressed by
    /// `chunk_hash`.
    ChunkRequest {
        request_id: u32,
        chunk_hash: ChunkHash,
        range: ChunkRange,
    },
    /// Stored bytes for a request. `chunk_offset` is the chunk index
    /// `data` starts at: `0` for a whole hit, the covering range's
    /// start for a sub-range hit.
    ChunkResponse {
        request_id: u32,
        chunk_offset: u32,
        data: Vec<u8>,
    },
    /// The serving peer does not hold the content.
    ChunkNotFound {
        request_id: u32,
        chunk_hash: ChunkHash,
    },
    /// The serving peer failed while producing the content.
    ChunkError {
        request_id: u32,
        error_code: u32,
        message: String,
    },
}

impl XetMessage {
    /// The request id this message belongs to.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        match self {
            XetMessage::ChunkRequest { request_id, .. }
            | XetMessage::ChunkResponse { request_id, .. }
            | XetMessage::ChunkNotFound { request_id, .. }
            | XetMessage::ChunkError { request_id, .. } => *request_id,
        }
    }

    /// Serializes the sub-message (type byte plus header plus body).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            XetMessage::ChunkRequest {
                request_id,
                chunk_hash,
                range,
            } => {
                out.push(TYPE_CHUNK_REQUEST);
                out.extend_from_slice(&request_id.to_be_bytes());
                out.extend_from_slice(chunk_hash.as_slice());
                out.extend_from_slice(&range.start.to_be_bytes());
                out.extend_from_slice(&range.end.to_be_bytes());
            }
            XetMessage::ChunkResponse {
                request_id,
                chunk_offset,
                data,
            } => {
                out.push(TYPE_CHUNK_RESPONSE);
                out.extend_from_slice(&request_id.to_be_bytes());
                out.extend_from_slice(&chunk_offset.to_be_bytes());
                out.extend_from_slice(&u32::try_from(data.len()).expect("chunk data fits u32").to_be_bytes());
                out.extend_from_slice(data);
            }
            XetMessage::ChunkNotFound {
                request_id,
                chunk_hash,
            } => {
                out.push(TYPE_CHUNK_NOT_FOUND);
                out.extend_from_slice(&request_id.to_be_bytes());
                out.extend_from_slice(chunk_hash.as_slice());
            }
            XetMessage::ChunkError {
                request_id,
                error_code,
                message,
            } => {
                out.push(TYPE_CHUNK_ERROR);
                out.extend_from_slice(&request_id.to_be_bytes());
                out.extend_from_slice(&error_code.to_be_bytes());
                out.extend_from_slice(message.as_bytes());
            }
        }
        out
    }

    /// Parses a sub-message from an extended-message payload.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] when the type byte is unknown or a header
    /// field is truncated.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, Error> {
        let Some((&message_type, rest)) = payload.split_first() else {
            return Err(Error::Malformed { what: "ut_xet message" });
        };

        match message_type {
            TYPE_CHUNK_REQUEST => {
                if rest.len() != 4 + 32 + 4 + 4 {
                    return Err(Error::Malformed { what: "chunk_request" });
                }
                Ok(XetMessage::ChunkRequest {
                    request_id: read_u32(rest, 0),
                    chunk_hash: read_hash(rest, 4),
                    range: ChunkRange::new(read_u32(rest, 36), read_u32(rest, 40)),
                })
            }
            TYPE_CHUNK_RESPONSE => {
                if rest.len() < 12 {
                    return Err(Error::Malformed { what: "chunk_response" });
                }
                let data_len = read_u32(rest, 8) as usize;
                if rest.len() - 12 != data_len {
                    return Err(Error::Malformed { what: "chunk_response" });
                }
                Ok(XetMessage::ChunkResponse {
                    request_id: read_u32(rest, 0),
                    chunk_offset: read_u32(rest, 4),
                    data: rest[12..].to_vec(),
                })
            }
            TYPE_CHUNK_NOT_FOUND => {
                if rest.len() != 4 + 32 {
                    return Err(Error::Malformed { what: "chunk_not_found" });
                }
                Ok(XetMessage::ChunkNotFound {
                    request_id: read_u32(rest, 0),
                    chunk_hash: read_hash(rest, 4),
                })
            }
            TYPE_CHUNK_ERROR => {
                if rest.len() < 8 {
                    return Err(Error::Malformed { what: "chunk_error" });
                }
                Ok(XetMessage::ChunkError {
                    request_id: read_u32(rest, 0),
                    error_code: read_u32(rest, 4),
                    message: String::from_utf8_lossy(&rest[8..]).into_owned(),
                })
            }
            _ => Err(Error::Malformed { what: "ut_xet message type" }),
        }
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(bytes[at..at + 4].try_into().expect("caller checked the length"))
}

fn read_hash(bytes: &[u8], at: usize) -> ChunkHash {
    let array: [u8; 32] = bytes[at..at + 32].try_into().expect("caller checked the length");
    ChunkHash(array)
}
