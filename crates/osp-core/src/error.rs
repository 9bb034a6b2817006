//! Error types for the OSP message codec

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Codec errors.
///
/// Always local to one frame or stream; none of these is fatal to a process.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Input ended before a complete value was read
    #[error("truncated input: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    /// Varint ran past ten bytes or set bits above bit 63
    #[error("varint overflow")]
    VarintOverflow,

    /// Frame length prefix exceeds the permitted maximum
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: usize },

    /// Empty frame, nothing to read a discriminator from
    #[error("empty frame")]
    EmptyFrame,

    /// No decoder registered for this discriminator
    #[error("unknown message type: {0}")]
    UnknownMessageType(u64),

    /// Bytes remain after all fields of the message were decoded
    #[error("{remaining} trailing bytes after {message} payload")]
    TrailingBytes {
        message: &'static str,
        remaining: usize,
    },

    /// A text field is not valid UTF-8
    #[error("invalid utf-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    /// A required field is empty
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    /// A numeric code does not map to any known value
    #[error("invalid {field} code: {value}")]
    InvalidCode { field: &'static str, value: u64 },

    /// Underlying stream failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True when the error comes from a peer sending malformed bytes rather
    /// than from the stream itself.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, CodecError::Io(_))
    }
}
