//! Presentation error types

use crate::sender::SenderState;
use osp_core::{CodecError, ResultCode};
use osp_discovery::DiscoveryError;
use osp_transport::TransportError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PresentationError>;

#[derive(Error, Debug)]
pub enum PresentationError {
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("receiver '{0}' not found")]
    TargetNotFound(String),

    #[error("receiver '{0}' has no usable address")]
    Unreachable(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("receiver rejected request: {0}")]
    Rejected(ResultCode),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid state transition {from:?} -> {to:?}")]
    InvalidTransition { from: SenderState, to: SenderState },

    #[error("cancelled")]
    Cancelled,
}
