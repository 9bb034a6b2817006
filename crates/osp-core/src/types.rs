//! Protocol message types

use crate::{CodecError, Result};

/// Message discriminators.
///
/// The single registration point for message variants: adding a type here
/// forces every exhaustive match in the codec and in dispatchers to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum MessageType {
    PresentationStartRequest = 1,
    PresentationStartResponse = 2,
    UrlAvailabilityRequest = 3,
    UrlAvailabilityResponse = 4,
}

impl MessageType {
    pub const ALL: [MessageType; 4] = [
        MessageType::PresentationStartRequest,
        MessageType::PresentationStartResponse,
        MessageType::UrlAvailabilityRequest,
        MessageType::UrlAvailabilityResponse,
    ];

    pub fn from_u64(value: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == value)
    }

    pub fn code(self) -> u64 {
        self as u64
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::PresentationStartRequest => "presentation-start-request",
            MessageType::PresentationStartResponse => "presentation-start-response",
            MessageType::UrlAvailabilityRequest => "url-availability-request",
            MessageType::UrlAvailabilityResponse => "url-availability-response",
        }
    }
}

impl TryFrom<u64> for MessageType {
    type Error = CodecError;

    fn try_from(value: u64) -> Result<Self> {
        Self::from_u64(value).ok_or(CodecError::UnknownMessageType(value))
    }
}

/// All OSP messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    PresentationStartRequest(PresentationStartRequest),
    PresentationStartResponse(PresentationStartResponse),
    UrlAvailabilityRequest(UrlAvailabilityRequest),
    UrlAvailabilityResponse(UrlAvailabilityResponse),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::PresentationStartRequest(_) => MessageType::PresentationStartRequest,
            Message::PresentationStartResponse(_) => MessageType::PresentationStartResponse,
            Message::UrlAvailabilityRequest(_) => MessageType::UrlAvailabilityRequest,
            Message::UrlAvailabilityResponse(_) => MessageType::UrlAvailabilityResponse,
        }
    }

    /// Request id used to correlate requests with responses
    pub fn request_id(&self) -> u64 {
        match self {
            Message::PresentationStartRequest(m) => m.request_id,
            Message::PresentationStartResponse(m) => m.request_id,
            Message::UrlAvailabilityRequest(m) => m.request_id,
            Message::UrlAvailabilityResponse(m) => m.request_id,
        }
    }

    pub fn name(&self) -> &'static str {
        self.message_type().name()
    }
}

/// Ask a receiver to start presenting `url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationStartRequest {
    pub request_id: u64,
    pub presentation_id: String,
    pub url: String,
}

/// Receiver's answer to a [`PresentationStartRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationStartResponse {
    pub request_id: u64,
    pub result: ResultCode,
}

/// Ask which of `urls` a receiver can present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlAvailabilityRequest {
    pub request_id: u64,
    pub urls: Vec<String>,
}

/// One availability per URL of the originating request, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlAvailabilityResponse {
    pub request_id: u64,
    pub availabilities: Vec<UrlAvailability>,
}

/// Outcome codes carried by responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum ResultCode {
    Success = 1,
    InvalidUrl = 10,
    InvalidPresentationId = 11,
    Timeout = 100,
    TransientError = 101,
    PermanentError = 102,
    UnknownError = 199,
}

impl ResultCode {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(ResultCode::Success),
            10 => Some(ResultCode::InvalidUrl),
            11 => Some(ResultCode::InvalidPresentationId),
            100 => Some(ResultCode::Timeout),
            101 => Some(ResultCode::TransientError),
            102 => Some(ResultCode::PermanentError),
            199 => Some(ResultCode::UnknownError),
            _ => None,
        }
    }

    pub fn code(self) -> u64 {
        self as u64
    }

    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResultCode::Success => "success",
            ResultCode::InvalidUrl => "invalid-url",
            ResultCode::InvalidPresentationId => "invalid-presentation-id",
            ResultCode::Timeout => "timeout",
            ResultCode::TransientError => "transient-error",
            ResultCode::PermanentError => "permanent-error",
            ResultCode::UnknownError => "unknown-error",
        };
        f.write_str(name)
    }
}

/// Whether a receiver can present a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum UrlAvailability {
    Compatible = 0,
    NotCompatible = 1,
    NotValid = 10,
}

impl UrlAvailability {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(UrlAvailability::Compatible),
            1 => Some(UrlAvailability::NotCompatible),
            10 => Some(UrlAvailability::NotValid),
            _ => None,
        }
    }

    pub fn code(self) -> u64 {
        self as u64
    }
}
