//! OSP message codec
//!
//! A message body is `varint(message type) || payload`. Payload fields:
//! - integers: varint
//! - strings: `varint(byte length) || UTF-8 bytes`
//! - lists: `varint(count) || items`
//!
//! Decoding is strict: an unknown message type, missing bytes, or bytes left
//! over after the last field are all errors. See [`crate::frame`] for the
//! length-prefixed envelope that carries a body on a stream.

use crate::types::*;
use crate::varint::{decode_varint, encode_varint};
use crate::{CodecError, Frame, Result};
use bytes::{Buf, Bytes, BytesMut};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Encode a message body (discriminator + payload, no length prefix)
pub fn encode_message(message: &Message) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(estimate_message_size(message));
    encode_varint(&mut buf, message.message_type().code());

    match message {
        Message::PresentationStartRequest(m) => encode_start_request(&mut buf, m)?,
        Message::PresentationStartResponse(m) => encode_start_response(&mut buf, m),
        Message::UrlAvailabilityRequest(m) => encode_availability_request(&mut buf, m)?,
        Message::UrlAvailabilityResponse(m) => encode_availability_response(&mut buf, m),
    }

    Ok(buf.freeze())
}

/// Decode a complete message body
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyFrame);
    }

    let mut buf = bytes;
    let message_type = MessageType::try_from(decode_uint(&mut buf)?)?;

    let message = match message_type {
        MessageType::PresentationStartRequest => decode_start_request(&mut buf)?,
        MessageType::PresentationStartResponse => decode_start_response(&mut buf)?,
        MessageType::UrlAvailabilityRequest => decode_availability_request(&mut buf)?,
        MessageType::UrlAvailabilityResponse => decode_availability_response(&mut buf)?,
    };

    if buf.has_remaining() {
        return Err(CodecError::TrailingBytes {
            message: message_type.name(),
            remaining: buf.remaining(),
        });
    }

    Ok(message)
}

/// Encode a message into a complete length-prefixed frame
pub fn encode(message: &Message) -> Result<Bytes> {
    Frame::new(encode_message(message)?).encode()
}

/// Decode one frame from the head of `bytes`, returning the message and the
/// number of bytes the frame occupied
pub fn decode(bytes: &[u8]) -> Result<(Message, usize)> {
    let (frame, consumed) = Frame::decode(bytes)?;
    let message = decode_message(&frame.body)?;
    Ok((message, consumed))
}

/// Pre-allocation hint, avoids regrowing the buffer for typical messages
fn estimate_message_size(msg: &Message) -> usize {
    match msg {
        Message::PresentationStartRequest(m) => {
            1 + 10 + 2 + m.presentation_id.len() + 2 + m.url.len()
        }
        Message::PresentationStartResponse(_) => 1 + 10 + 2,
        Message::UrlAvailabilityRequest(m) => {
            1 + 10 + 2 + m.urls.iter().map(|u| u.len() + 2).sum::<usize>()
        }
        Message::UrlAvailabilityResponse(m) => 1 + 10 + 2 + m.availabilities.len() * 2,
    }
}

// ============================================================================
// ENCODING
// ============================================================================

fn encode_start_request(buf: &mut BytesMut, msg: &PresentationStartRequest) -> Result<()> {
    encode_varint(buf, msg.request_id);
    encode_string(buf, &msg.presentation_id, "presentation_id")?;
    encode_string(buf, &msg.url, "url")?;
    Ok(())
}

fn encode_start_response(buf: &mut BytesMut, msg: &PresentationStartResponse) {
    encode_varint(buf, msg.request_id);
    encode_varint(buf, msg.result.code());
}

fn encode_availability_request(buf: &mut BytesMut, msg: &UrlAvailabilityRequest) -> Result<()> {
    if msg.urls.is_empty() {
        return Err(CodecError::EmptyField { field: "urls" });
    }
    encode_varint(buf, msg.request_id);
    encode_varint(buf, msg.urls.len() as u64);
    for url in &msg.urls {
        encode_string(buf, url, "url")?;
    }
    Ok(())
}

fn encode_availability_response(buf: &mut BytesMut, msg: &UrlAvailabilityResponse) {
    encode_varint(buf, msg.request_id);
    encode_varint(buf, msg.availabilities.len() as u64);
    for availability in &msg.availabilities {
        encode_varint(buf, availability.code());
    }
}

#[inline]
fn encode_string(buf: &mut BytesMut, s: &str, field: &'static str) -> Result<()> {
    if s.is_empty() {
        return Err(CodecError::EmptyField { field });
    }
    encode_varint(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

// ============================================================================
// DECODING
// ============================================================================

fn decode_start_request(buf: &mut &[u8]) -> Result<Message> {
    let request_id = decode_uint(buf)?;
    let presentation_id = decode_string(buf, "presentation_id")?;
    let url = decode_string(buf, "url")?;

    Ok(Message::PresentationStartRequest(PresentationStartRequest {
        request_id,
        presentation_id,
        url,
    }))
}

fn decode_start_response(buf: &mut &[u8]) -> Result<Message> {
    let request_id = decode_uint(buf)?;
    let code = decode_uint(buf)?;
    let result = ResultCode::from_u64(code).ok_or(CodecError::InvalidCode {
        field: "result",
        value: code,
    })?;

    Ok(Message::PresentationStartResponse(PresentationStartResponse {
        request_id,
        result,
    }))
}

fn decode_availability_request(buf: &mut &[u8]) -> Result<Message> {
    let request_id = decode_uint(buf)?;
    let count = decode_count(buf)?;
    if count == 0 {
        return Err(CodecError::EmptyField { field: "urls" });
    }

    let mut urls = Vec::with_capacity(count);
    for _ in 0..count {
        urls.push(decode_string(buf, "url")?);
    }

    Ok(Message::UrlAvailabilityRequest(UrlAvailabilityRequest {
        request_id,
        urls,
    }))
}

fn decode_availability_response(buf: &mut &[u8]) -> Result<Message> {
    let request_id = decode_uint(buf)?;
    let count = decode_count(buf)?;

    let mut availabilities = Vec::with_capacity(count);
    for _ in 0..count {
        let code = decode_uint(buf)?;
        let availability = UrlAvailability::from_u64(code).ok_or(CodecError::InvalidCode {
            field: "availability",
            value: code,
        })?;
        availabilities.push(availability);
    }

    Ok(Message::UrlAvailabilityResponse(UrlAvailabilityResponse {
        request_id,
        availabilities,
    }))
}

// ============================================================================
// VALUE DECODING HELPERS
// ============================================================================

#[inline]
fn decode_uint(buf: &mut &[u8]) -> Result<u64> {
    let (value, consumed) = decode_varint(buf)?;
    buf.advance(consumed);
    Ok(value)
}

/// Every list item takes at least one byte, so a count larger than what is
/// left can be rejected before allocating.
fn decode_count(buf: &mut &[u8]) -> Result<usize> {
    let count = decode_uint(buf)?;
    if count > buf.remaining() as u64 {
        return Err(CodecError::Truncated {
            needed: usize::try_from(count).unwrap_or(usize::MAX),
            have: buf.remaining(),
        });
    }
    Ok(count as usize)
}

fn decode_string(buf: &mut &[u8], field: &'static str) -> Result<String> {
    let len = decode_uint(buf)?;
    if len == 0 {
        return Err(CodecError::EmptyField { field });
    }
    if len > buf.remaining() as u64 {
        return Err(CodecError::Truncated {
            needed: usize::try_from(len).unwrap_or(usize::MAX),
            have: buf.remaining(),
        });
    }

    let len = len as usize;
    let text = std::str::from_utf8(&buf[..len])
        .map_err(|_| CodecError::InvalidUtf8 { field })?
        .to_owned();
    buf.advance(len);
    Ok(text)
}

// ============================================================================
// TESTS
// ============================================================================
