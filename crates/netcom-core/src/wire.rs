//! Netcom wire format: the payload carried inside one length-prefixed frame.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! byte 0       : kind tag (u8, 0 = Unknown)
//! bytes 1-2    : reply_port (u16, 0 if absent)
//! bytes 3-4    : client_count (u16, 0 if absent)
//! client_count times:
//!   u16 address_len, address_len bytes UTF-8 address,
//!   u16 port, i64 registered_at (epoch milliseconds)
//! ```
//!
//! `reply_port` and `client_count` are optional trailing fields on the way
//! in: payloads of 1 and 3 bytes are accepted and the missing fields read
//! as zero. Encoding always writes the full 5-byte header.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of the tag byte. The smallest payload that can decode.
pub const MIN_PAYLOAD: usize = 1;

/// Full header: tag + reply_port + client_count.
pub const HEADER_LEN: usize = 5;

/// Fixed part of one client record: address_len + port + registered_at.
const CLIENT_FIXED_LEN: usize = 2 + 2 + 8;

// ── Message kind ──────────────────────────────────────────────────────────────

/// Discriminator carried in byte 0 of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MessageKind {
    /// Zero value and the decode-failure sentinel. Never produced by a
    /// successful decode.
    #[default]
    Unknown = 0,
    Subscribe = 1,
    Unsubscribe = 2,
    Ping = 3,
    InfoRequest = 4,
    InfoResponse = 5,
}

impl TryFrom<u8> for MessageKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageKind::Subscribe),
            2 => Ok(MessageKind::Unsubscribe),
            3 => Ok(MessageKind::Ping),
            4 => Ok(MessageKind::InfoRequest),
            5 => Ok(MessageKind::InfoResponse),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(k: MessageKind) -> u8 {
        k as u8
    }
}

// ── Client record ─────────────────────────────────────────────────────────────

/// One registered client as reported in an InfoResponse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ClientRecord {
    pub address: String,
    pub port: u16,
    /// Registration time in milliseconds since the Unix epoch.
    pub registered_at: i64,
}

impl ClientRecord {
    pub fn new(address: impl Into<String>, port: u16, registered_at: i64) -> Self {
        Self {
            address: address.into(),
            port,
            registered_at,
        }
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// A single logical message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub kind: MessageKind,
    /// Port the sender wants replies on. Only meaningful for Subscribe over UDP.
    pub reply_port: u16,
    /// Only meaningful for InfoResponse.
    pub clients: Vec<ClientRecord>,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn subscribe(reply_port: u16) -> Self {
        Self {
            kind: MessageKind::Subscribe,
            reply_port,
            clients: Vec::new(),
        }
    }

    pub fn info_response(clients: Vec<ClientRecord>) -> Self {
        Self {
            kind: MessageKind::InfoResponse,
            reply_port: 0,
            clients,
        }
    }

    /// Serialize into a payload. Total and deterministic.
    ///
    /// A list longer than `u16::MAX` entries is cut at `u16::MAX`; an address
    /// longer than `u16::MAX` bytes is cut at the last char boundary that fits.
    pub fn encode(&self) -> Bytes {
        let count = self.clients.len().min(u16::MAX as usize);
        let body: usize = self.clients[..count]
            .iter()
            .map(|c| CLIENT_FIXED_LEN + clamp_address(&c.address).len())
            .sum();

        let mut out = BytesMut::with_capacity(HEADER_LEN + body);
        out.put_u8(self.kind.into());
        out.put_u16(self.reply_port);
        out.put_u16(count as u16);
        for client in &self.clients[..count] {
            let address = clamp_address(&client.address);
            out.put_u16(address.len() as u16);
            out.put_slice(address.as_bytes());
            out.put_u16(client.port);
            out.put_i64(client.registered_at);
        }
        out.freeze()
    }

    /// Parse a payload. Never reads past the slice.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut buf = payload;

        need(buf, MIN_PAYLOAD)?;
        let kind = MessageKind::try_from(buf.get_u8())?;

        let reply_port = if buf.is_empty() {
            0
        } else {
            need(buf, 2)?;
            buf.get_u16()
        };

        let count = if buf.is_empty() {
            0
        } else {
            need(buf, 2)?;
            buf.get_u16() as usize
        };

        // Each record needs at least its fixed part; reject an impossible
        // count before allocating for it.
        need(buf, count.saturating_mul(CLIENT_FIXED_LEN))?;

        let mut clients = Vec::with_capacity(count);
        for _ in 0..count {
            need(buf, 2)?;
            let address_len = buf.get_u16() as usize;
            need(buf, address_len)?;
            let address = std::str::from_utf8(&buf[..address_len])
                .map_err(|_| WireError::InvalidAddress)?
                .to_owned();
            buf.advance(address_len);

            need(buf, 2 + 8)?;
            let port = buf.get_u16();
            let registered_at = buf.get_i64();
            clients.push(ClientRecord {
                address,
                port,
                registered_at,
            });
        }

        if !buf.is_empty() {
            return Err(WireError::TrailingBytes(buf.len()));
        }

        Ok(Message {
            kind,
            reply_port,
            clients,
        })
    }
}

fn need(buf: &[u8], needed: usize) -> Result<(), WireError> {
    if buf.len() < needed {
        Err(WireError::Truncated {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

fn clamp_address(address: &str) -> &str {
    let max = u16::MAX as usize;
    if address.len() <= max {
        return address;
    }
    let mut end = max;
    while !address.is_char_boundary(end) {
        end -= 1;
    }
    &address[..end]
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Reasons a payload fails to decode. Any of these means the message is
/// treated as `MessageKind::Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("payload truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("unknown message kind: {0}")]
    UnknownKind(u8),

    #[error("client address is not valid UTF-8")]
    InvalidAddress,

    #[error("{0} bytes left over after the declared client list")]
    TrailingBytes(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
