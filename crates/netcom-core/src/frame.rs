//! Outer framing: `[u32 big-endian length][length bytes of payload]`.
//!
//! `FrameReassembler` turns an arbitrary sequence of byte chunks (TCP reads,
//! UDP datagrams) back into discrete payloads. After every call to
//! `next_frame` the buffer holds at most one partial frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::wire::Message;

/// Size of the length prefix.
pub const LEN_PREFIX: usize = 4;

/// Default cap on a single declared payload length (1 MiB).
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

/// Wrap an already-encoded payload in a length prefix.
pub fn frame_payload(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(LEN_PREFIX + payload.len());
    out.put_u32(payload.len() as u32);
    out.put_slice(payload);
    out.freeze()
}

/// Encode a message and frame it, ready to hit the wire.
pub fn encode_frame(message: &Message) -> Bytes {
    frame_payload(&message.encode())
}

/// Per-peer byte accumulator.
#[derive(Debug)]
pub struct FrameReassembler {
    buf: BytesMut,
    max_frame: usize,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete payload, if one is buffered.
    ///
    /// `Ok(None)` means more bytes are needed. On error the buffer is
    /// cleared: the stream is desynchronised and nothing in it can be
    /// trusted any more.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.buf.len() < LEN_PREFIX {
            return Ok(None);
        }

        let declared = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
            as usize;
        if declared == 0 {
            self.buf.clear();
            return Err(FrameError::EmptyFrame);
        }
        if declared > self.max_frame {
            self.buf.clear();
            return Err(FrameError::TooLarge {
                declared,
                max: self.max_frame,
            });
        }

        if self.buf.len() - LEN_PREFIX < declared {
            return Ok(None);
        }

        self.buf.advance(LEN_PREFIX);
        Ok(Some(self.buf.split_to(declared).freeze()))
    }

    /// Extract every complete payload currently buffered, in arrival order.
    ///
    /// Frames found before a framing error are discarded along with the
    /// rest of the buffer; callers that need them use `next_frame`.
    pub fn drain(&mut self) -> Result<Vec<Bytes>, FrameError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Framing violations. Either one is fatal to the connection or peer that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("zero-length frame")]
    EmptyFrame,

    #[error("declared frame length {declared} exceeds maximum {max}")]
    TooLarge { declared: usize, max: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
