//! OSP Transport Layer
//!
//! Authenticated, encrypted sessions between a sender and a receiver:
//! - QUIC sessions secured by TLS 1.3 (ALPN `osp`)
//! - Many independent bidirectional streams per session
//! - A listener that shares one TLS identity across all sessions
//!
//! Streams carry raw bytes; message framing lives in `osp-core`.

pub mod error;
pub mod identity;
pub mod quic;
pub mod traits;

pub use error::{Result, TransportError};
pub use identity::TlsIdentity;
pub use quic::{
    dial, dial_host, CertVerification, PendingSession, QuicConfig, QuicListener, QuicSession,
    QuicStream,
};
pub use traits::Session;
