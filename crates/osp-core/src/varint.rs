//! Variable-length unsigned integers (LEB128)
//!
//! Each byte carries 7 value bits in its low bits and a continuation flag in
//! bit 7. Groups are emitted least-significant first:
//! - 0-127: 1 byte
//! - 128-16383: 2 bytes
//! - 16384-2097151: 3 bytes
//! - ...
//! - u64::MAX: 10 bytes

use crate::{CodecError, Result};
use bytes::BufMut;

/// Longest possible encoding of a `u64`
pub const MAX_VARINT_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const VALUE_MASK: u8 = 0x7F;

/// Append the varint encoding of `value` to `buf`, returning the bytes written
pub fn encode_varint<B: BufMut>(buf: &mut B, mut value: u64) -> usize {
    let mut written = 0;
    loop {
        let mut byte = (value & VALUE_MASK as u64) as u8;
        value >>= 7;
        if value != 0 {
            byte |= CONTINUATION;
        }
        buf.put_u8(byte);
        written += 1;
        if value == 0 {
            return written;
        }
    }
}

/// Encode `value` into a freshly allocated vector
pub fn encode_varint_vec(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(varint_len(value));
    encode_varint(&mut buf, value);
    buf
}

/// Decode a varint from the head of `data`, returning `(value, bytes_consumed)`
///
/// Fails with [`CodecError::Truncated`] if `data` ends before a byte with the
/// continuation flag clear, and with [`CodecError::VarintOverflow`] if the
/// encoding runs past ten bytes or sets bits above bit 63.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut decoder = VarintDecoder::new();
    for (i, &byte) in data.iter().enumerate() {
        if let Some(value) = decoder.push(byte)? {
            return Ok((value, i + 1));
        }
    }
    Err(CodecError::Truncated {
        needed: data.len() + 1,
        have: data.len(),
    })
}

/// Number of bytes `value` occupies once encoded
pub fn varint_len(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    let bits = 64 - value.leading_zeros() as usize;
    (bits + 6) / 7
}

/// Incremental decoder, fed one byte at a time.
///
/// Used where bytes arrive from an async source and the full encoding is not
/// available up front.
#[derive(Debug, Default, Clone)]
pub struct VarintDecoder {
    value: u64,
    consumed: usize,
}

impl VarintDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next byte. Returns the value once the terminating byte is seen.
    pub fn push(&mut self, byte: u8) -> Result<Option<u64>> {
        if self.consumed == MAX_VARINT_LEN {
            return Err(CodecError::VarintOverflow);
        }

        let group = (byte & VALUE_MASK) as u64;
        let shift = 7 * self.consumed as u32;

        // The tenth group only has room for bit 63.
        if self.consumed == MAX_VARINT_LEN - 1 && group > 1 {
            return Err(CodecError::VarintOverflow);
        }

        self.value |= group << shift;
        self.consumed += 1;

        if byte & CONTINUATION == 0 {
            Ok(Some(self.value))
        } else if self.consumed == MAX_VARINT_LEN {
            Err(CodecError::VarintOverflow)
        } else {
            Ok(None)
        }
    }

    /// Bytes consumed so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_known_encodings() {
        assert_eq!(encode_varint_vec(0), vec![0x00]);
        assert_eq!(encode_varint_vec(1), vec![0x01]);
        assert_eq!(encode_varint_vec(127), vec![0x7F]);
        assert_eq!(encode_varint_vec(128), vec![0x80, 0x01]);
        assert_eq!(encode_varint_vec(300), vec![0xAC, 0x02]);
        assert_eq!(
            encode_varint_vec(u64::MAX),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
        );
    }

    #[test]
    fn test_varint_roundtrip_boundaries() {
        let values = [
            0,
            1,
            127,
            128,
            16383,
            16384,
            2097151,
            2097152,
            (1u64 << 63) - 1,
            1u64 << 63,
            u64::MAX,
        ];

        for value in values {
            let encoded = encode_varint_vec(value);
            assert_eq!(encoded.len(), varint_len(value), "length for {}", value);

            let (decoded, consumed) = decode_varint(&encoded).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn test_varint_minimal_length() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(16383), 2);
        assert_eq!(varint_len(16384), 3);
        assert_eq!(varint_len((1u64 << 63) - 1), 9);
        assert_eq!(varint_len(1u64 << 63), 10);
        assert_eq!(varint_len(u64::MAX), MAX_VARINT_LEN);
    }

    #[test]
    fn test_varint_decode_stops_at_terminator() {
        let mut buf = encode_varint_vec(12345);
        buf.extend_from_slice(b"trailing");

        let (value, consumed) = decode_varint(&buf).unwrap();
        assert_eq!(value, 12345);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_varint_truncated() {
        assert!(matches!(
            decode_varint(&[]),
            Err(CodecError::Truncated { needed: 1, have: 0 })
        ));
        assert!(matches!(
            decode_varint(&[0x80, 0x80]),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_varint_overflow() {
        // Eleven continuation bytes never terminate within the limit.
        let too_long = [0xFFu8; 11];
        assert!(matches!(
            decode_varint(&too_long),
            Err(CodecError::VarintOverflow)
        ));

        // Ten bytes whose last group sets bits past 63.
        let mut wide = vec![0xFFu8; 9];
        wide.push(0x02);
        assert!(matches!(decode_varint(&wide), Err(CodecError::VarintOverflow)));
    }

    #[test]
    fn test_incremental_decoder() {
        let encoded = encode_varint_vec(2097152);
        let mut decoder = VarintDecoder::new();

        for &byte in &encoded[..encoded.len() - 1] {
            assert_eq!(decoder.push(byte).unwrap(), None);
        }
        assert_eq!(decoder.push(encoded[encoded.len() - 1]).unwrap(), Some(2097152));
        assert_eq!(decoder.consumed(), encoded.len());
    }
}
