//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport failures.
///
/// Each is fatal to the attempted operation and never retried here. Stream
/// read/write errors end that stream only, not its session.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("endpoint setup failed: {0}")]
    Endpoint(String),

    #[error("invalid tls identity: {0}")]
    InvalidIdentity(String),

    #[error("tls configuration failed: {0}")]
    Tls(String),

    #[error("dial failed: {0}")]
    DialFailed(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("stream open failed: {0}")]
    StreamOpenFailed(String),

    #[error("stream accept failed: {0}")]
    StreamAcceptFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("address resolution failed for {0}")]
    Resolve(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
