//! Discovery error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Failures returned once, synchronously, when advertise or browse starts.
///
/// Individual malformed records seen while browsing are never errors.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid service type: {0}")]
    InvalidServiceType(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
