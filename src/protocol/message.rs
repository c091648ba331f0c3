//! Length-prefixed message framing.
//!
//! Every message after the handshake is framed as
//! `[4-byte big-endian length N][1 byte id][N-1 bytes payload]`. A
//! length of zero is a keepalive with no body. Ids `0..=8` are the BEP 3
//! control messages; `20` carries BEP 10 extended payloads.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Error;

/// Largest frame accepted: a whole 64 MiB xorb plus header slack.
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024 + 1024;

/// Message id carrying BEP 10 extended payloads.
pub const EXTENDED_ID: u8 = 20;

/// A decoded wire message.
///
/// The standard control messages the swarm never acts on (`have`,
/// `bitfield`, `request`, `piece`, `cancel`) are still decoded so the
/// read loops can skip them without tearing the framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Vec<u8>),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, data: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    Extended { ext_id: u8, payload: Vec<u8> },
}

impl Message {
    /// Wire id of the message; `None` for keepalive, which has no body.
    #[must_use]
    pub fn id(&self) -> Option<u8> {
        match self {
            Message::KeepAlive => None,
            Message::Choke => Some(0),
            Message::Unchoke => Some(1),
            Message::Interested => Some(2),
            Message::NotInterested => Some(3),
            Message::Have(_) => Some(4),
            Message::Bitfield(_) => Some(5),
            Message::Request { .. } => Some(6),
            Message::Piece { .. } => Some(7),
            Message::Cancel { .. } => Some(8),
            Message::Extended { .. } => Some(EXTENDED_ID),
        }
    }

    /// Serializes the message into a complete frame, length prefix
    /// included.
    #[must_use]
    pub fn to_frame(&self) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(id) = self.id() {
            body.push(id);
        }
        match self {
            Message::KeepAlive
            | Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => {}
            Message::Have(index) => body.extend_from_slice(&index.to_be_bytes()),
            Message::Bitfield(bits) => body.extend_from_slice(bits),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                body.extend_from_slice(&index.to_be_bytes());
                body.extend_from_slice(&begin.to_be_bytes());
                body.extend_from_slice(&length.to_be_bytes());
            }
            Message::Piece { index, begin, data } => {
                body.extend_from_slice(&index.to_be_bytes());
                body.extend_from_slice(&begin.to_be_bytes());
                body.extend_from_slice(data);
            }
            Message::Extended { ext_id, payload } => {
                body.push(*ext_id);
                body.extend_from_slice(payload);
            }
        }

        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&u32::try_from(body.len()).expect("frame fits u32").to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Parses a frame body (id byte plus payload, length prefix already
    /// stripped). An empty body is a keepalive.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] when the id is unknown or the payload does
    /// not match the id's layout.
    pub fn from_body(body: &[u8]) -> Result<Self, Error> {
        let Some((&id, payload)) = body.split_first() else {
            return Ok(Message::KeepAlive);
        };

        match id {
            0 => expect_empty(payload, Message::Choke),
            1 => expect_empty(payload, Message::Unchoke),
            2 => expect_empty(payload, Message::Interested),
            3 => expect_empty(payload, Message::NotInterested),
            4 => Ok(Message::Have(read_u32(payload, 0, "have payload")?)),
            5 => Ok(Message::Bitfield(payload.to_vec())),
            6 => Ok(Message::Request {
                index: read_u32(payload, 0, "request payload")?,
                begin: read_u32(payload, 4, "request payload")?,
                length: read_u32(payload, 8, "request payload")?,
            }),
            7 => {
                if payload.len() < 8 {
                    return Err(Error::Malformed { what: "piece payload" });
                }
                Ok(Message::Piece {
                    index: read_u32(payload, 0, "piece payload")?,
                    begin: read_u32(payload, 4, "piece payload")?,
                    data: payload[8..].to_vec(),
                })
            }
            8 => Ok(Message::Cancel {
                index: read_u32(payload, 0, "cancel payload")?,
                begin: read_u32(payload, 4, "cancel payload")?,
                length: read_u32(payload, 8, "cancel payload")?,
            }),
            EXTENDED_ID => {
                let Some((&ext_id, rest)) = payload.split_first() else {
                    return Err(Error::Malformed { what: "extended payload" });
                };
                Ok(Message::Extended {
                    ext_id,
                    payload: rest.to_vec(),
                })
            }
            _ => Err(Error::Malformed { what: "message id" }),
        }
    }
}

fn expect_empty(payload: &[u8], message: Message) -> Result<Message, Error> {
    if payload.is_empty() {
        Ok(message)
    } else {
        Err(Error::Malformed { what: "control payload" })
    }
}

fn read_u32(payload: &[u8], at: usize, what: &'static str) -> Result<u32, Error> {
    let bytes: [u8; 4] = payload
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::Malformed { what })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Reads one framed message from the stream.
///
/// # Errors
///
/// [`Error::InvalidMessageSize`] when the length prefix exceeds
/// [`MAX_MESSAGE_SIZE`]; transport and layout errors otherwise.
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Message, Error> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);

    if len == 0 {
        return Ok(Message::KeepAlive);
    }
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessageSize { size: len });
    }

    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Message::from_body(&body)
}

/// Writes one framed message to the stream in a single flush.
///
/// # Errors
///
/// Fails on transport errors.
pub async fn write_message<W: AsyncWrite + Unpin>(stream: &mut W, message: &Message) -> Result<(), Error> {
    stream.write_all(&message.to_frame()).await?;
    stream.flush().await?;
    Ok(())
}
