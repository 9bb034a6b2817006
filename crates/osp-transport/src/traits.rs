//! Transport trait definitions

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// One authenticated, multiplexed connection between two endpoints.
///
/// Streams are payload-agnostic byte channels; framing belongs to the layer
/// above.
#[async_trait]
pub trait Session: Send + Sync {
    /// Bidirectional byte stream carried by this session
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a new outbound stream
    async fn open_stream(&self) -> Result<Self::Stream>;

    /// Wait for the peer's next stream. `None` once the session has closed
    /// cleanly.
    async fn accept_stream(&self) -> Result<Option<Self::Stream>>;

    /// Peer address
    fn remote_addr(&self) -> SocketAddr;

    /// Close the session
    fn close(&self, reason: &str);
}
