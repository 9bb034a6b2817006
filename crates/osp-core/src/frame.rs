//! Length-prefixed frame envelope
//!
//! OSP frame format:
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ varint:  body length L (bytes that follow, 1..=MAX_FRAME_SIZE)  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ varint:  message type                                           │
//! │ payload: message fields (see codec)                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The prefix counts exactly the bytes of discriminator + payload, so a
//! reader always knows how much to consume before decoding. A malformed body
//! never leaves the reader misaligned with the next frame.

use crate::varint::{decode_varint, encode_varint, varint_len};
use crate::{CodecError, Result};
use bytes::{Bytes, BytesMut};

/// Maximum body size accepted by readers (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// One framed message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type discriminator followed by the payload
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame around an encoded body
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Total encoded size, prefix included
    pub fn size(&self) -> usize {
        varint_len(self.body.len() as u64) + self.body.len()
    }

    /// Encode frame to bytes.
    ///
    /// The body length is known before anything is written, so the prefix is
    /// always exact.
    pub fn encode(&self) -> Result<Bytes> {
        check_length(self.body.len() as u64)?;

        let mut buf = BytesMut::with_capacity(self.size());
        encode_varint(&mut buf, self.body.len() as u64);
        buf.extend_from_slice(&self.body);
        Ok(buf.freeze())
    }

    /// Decode one frame from the head of `buf`, returning it together with the
    /// number of bytes consumed
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (len, prefix) = decode_varint(buf)?;
        check_length(len)?;

        let len = len as usize;
        let total = prefix + len;
        if buf.len() < total {
            return Err(CodecError::Truncated {
                needed: total,
                have: buf.len(),
            });
        }

        let body = Bytes::copy_from_slice(&buf[prefix..total]);
        Ok((Self { body }, total))
    }

    /// Check if buffer starts with a complete frame.
    ///
    /// Returns the frame size when complete, `None` when more bytes are
    /// needed, and an error when the prefix itself is invalid.
    pub fn check_complete(buf: &[u8]) -> Result<Option<usize>> {
        let (len, prefix) = match decode_varint(buf) {
            Ok(decoded) => decoded,
            Err(CodecError::Truncated { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        check_length(len)?;

        let total = prefix + len as usize;
        if buf.len() >= total {
            Ok(Some(total))
        } else {
            Ok(None)
        }
    }
}

/// Bodies are never empty (the discriminator takes at least one byte) and
/// never larger than [`MAX_FRAME_SIZE`].
pub(crate) fn check_length(len: u64) -> Result<()> {
    if len == 0 {
        return Err(CodecError::EmptyFrame);
    }
    if len > MAX_FRAME_SIZE as u64 {
        return Err(CodecError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}
