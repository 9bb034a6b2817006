//! OSP Core
//!
//! Wire primitives for the OSP presentation protocol.
//!
//! This crate provides:
//! - Variable-length integer encoding ([`varint`])
//! - Protocol message types ([`Message`], [`MessageType`])
//! - Message body encoding/decoding ([`codec`])
//! - The length-prefixed frame envelope ([`Frame`])
//! - Framed reads and writes on async streams ([`read_message`], [`write_message`])

pub mod codec;
pub mod error;
pub mod frame;
pub mod io;
pub mod types;
pub mod varint;

pub use codec::{decode, decode_message, encode, encode_message};
pub use error::{CodecError, Result};
pub use frame::{Frame, MAX_FRAME_SIZE};
pub use io::{read_message, write_message};
pub use types::*;

/// Default mDNS service type for OSP receivers
pub const SERVICE_TYPE: &str = "_openscreen._udp.local.";

/// ALPN protocol identifier for OSP over QUIC
pub const OSP_ALPN: &[u8] = b"osp";
