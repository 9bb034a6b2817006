//! Common test helpers and utilities for OSP tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - A renderer that records what it was asked to present
//! - A loopback receiver that shuts down on drop

use osp_discovery::ServiceDiscovery;
use osp_presentation::{PresentationReceiver, ReceiverConfig, Renderer};
use osp_transport::TlsIdentity;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

// ============================================================================
// TLS
// ============================================================================

/// Self-signed identity valid for localhost
pub fn test_identity() -> TlsIdentity {
    TlsIdentity::self_signed(&["localhost", "127.0.0.1"]).expect("Cert generation failed")
}

// ============================================================================
// Recording Renderer
// ============================================================================

/// Renderer that records every URL it is asked to present
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    urls: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of render calls so far
    pub fn count(&self) -> usize {
        self.urls.lock().len()
    }

    /// Wait until at least `n` render calls were made
    pub async fn wait_for_count(&self, n: usize, max_wait: Duration) -> bool {
        wait_for(|| async { self.count() >= n }, DEFAULT_CHECK_INTERVAL, max_wait).await
    }

    /// URLs rendered, in call order
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, url: &str) {
        self.urls.lock().push(url.to_string());
    }
}

// ============================================================================
// Test Receiver - RAII wrapper with proper cleanup
// ============================================================================

/// A loopback receiver that shuts down when dropped
pub struct TestReceiver {
    receiver: Option<PresentationReceiver>,
    renderer: RecordingRenderer,
    token: CancellationToken,
}

impl TestReceiver {
    /// Start a receiver named `name` on an ephemeral loopback port
    pub fn start<D: ServiceDiscovery + ?Sized>(name: &str, discovery: &D) -> Self {
        let config = ReceiverConfig {
            bind_addr: Ipv4Addr::LOCALHOST.into(),
            port: 0,
            ..ReceiverConfig::new(name)
        };
        let renderer = RecordingRenderer::new();
        let token = CancellationToken::new();
        let receiver = PresentationReceiver::start(
            config,
            &test_identity(),
            discovery,
            renderer.clone(),
            &token,
        )
        .expect("Failed to start test receiver");

        Self {
            receiver: Some(receiver),
            renderer,
            token,
        }
    }

    pub fn renderer(&self) -> &RecordingRenderer {
        &self.renderer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.receiver
            .as_ref()
            .map(|r| r.local_addr())
            .expect("receiver already stopped")
    }

    /// Shut down and wait for the accept loop to exit
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(receiver) = self.receiver.take() {
            receiver.join().await;
        }
    }
}

impl Drop for TestReceiver {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
