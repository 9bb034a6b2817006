//! QUIC Transport Tests (osp-transport)
//!
//! Tests for the QUIC session layer including:
//! - Listener binding
//! - Dialing and handshake
//! - Stream echo and ordering
//! - Concurrent streams on one session

use std::net::SocketAddr;
use std::time::Duration;

use osp_transport::{dial, dial_host, QuicConfig, QuicListener, Session, TlsIdentity};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// ============================================================================
// Helper Functions
// ============================================================================

fn identity() -> TlsIdentity {
    TlsIdentity::self_signed(&["localhost", "127.0.0.1"]).expect("Cert generation failed")
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Spawn a listener that echoes every stream back until the peer finishes it
fn spawn_echo_listener() -> SocketAddr {
    let listener = QuicListener::bind(loopback(), &identity(), &QuicConfig::default()).unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Some(pending) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(session) = pending.handshake().await else {
                    return;
                };
                while let Ok(Some(mut stream)) = session.accept_stream().await {
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        if stream.read_to_end(&mut buf).await.is_ok() {
                            let _ = stream.write_all(&buf).await;
                            let _ = stream.finish();
                        }
                    });
                }
            });
        }
    });

    addr
}

// ============================================================================
// Listener Tests
// ============================================================================

#[tokio::test]
async fn test_listener_bind() {
    let listener = QuicListener::bind(loopback(), &identity(), &QuicConfig::default()).unwrap();
    let addr = listener.local_addr().unwrap();
    assert_ne!(addr.port(), 0, "listener should bind an ephemeral port");
    listener.close();
}

#[tokio::test]
async fn test_listener_accept_after_close_returns_none() {
    let listener = QuicListener::bind(loopback(), &identity(), &QuicConfig::default()).unwrap();
    listener.close();

    let result = tokio::time::timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("accept should not hang after close");
    assert!(result.is_none());
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_dial_and_echo() {
    let addr = spawn_echo_listener();

    let session = dial(addr, "localhost", &QuicConfig::default()).await.unwrap();
    assert_eq!(session.remote_addr(), addr);

    let mut stream = session.open_stream().await.unwrap();
    stream.write_all(b"hello receiver").await.unwrap();
    stream.finish().unwrap();

    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("echo timed out")
        .unwrap();
    assert_eq!(reply, b"hello receiver");

    session.close("done");
}

#[tokio::test]
async fn test_dial_host_resolves() {
    let addr = spawn_echo_listener();

    let session = dial_host("127.0.0.1", addr.port(), &QuicConfig::default())
        .await
        .unwrap();
    assert_eq!(session.remote_addr(), addr);

    assert!(dial_host("no-such-host.invalid", addr.port(), &QuicConfig::default())
        .await
        .is_err());
}

#[tokio::test]
async fn test_dial_refused_without_listener() {
    // Bind and immediately drop a UDP socket to get a port nobody listens on.
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();
    drop(socket);

    let config = QuicConfig {
        idle_timeout_ms: 500,
        ..Default::default()
    };
    let result = tokio::time::timeout(Duration::from_secs(5), dial(addr, "localhost", &config))
        .await
        .expect("dial should give up on its own");
    assert!(result.is_err());
}

#[tokio::test]
async fn test_concurrent_streams() {
    let addr = spawn_echo_listener();
    let session = dial(addr, "localhost", &QuicConfig::default()).await.unwrap();

    let mut first = session.open_stream().await.unwrap();
    let mut second = session.open_stream().await.unwrap();
    assert_ne!(first.id(), second.id());

    // Interleave writes; each stream must see only its own bytes in order.
    first.write_all(b"one-").await.unwrap();
    second.write_all(b"two-").await.unwrap();
    first.write_all(b"alpha").await.unwrap();
    second.write_all(b"beta").await.unwrap();
    first.finish().unwrap();
    second.finish().unwrap();

    let (a, b) = tokio::join!(
        async {
            let mut buf = Vec::new();
            first.read_to_end(&mut buf).await.map(|_| buf)
        },
        async {
            let mut buf = Vec::new();
            second.read_to_end(&mut buf).await.map(|_| buf)
        }
    );
    assert_eq!(a.unwrap(), b"one-alpha");
    assert_eq!(b.unwrap(), b"two-beta");
}

#[tokio::test]
async fn test_accept_stream_none_after_peer_close() {
    let listener = QuicListener::bind(loopback(), &identity(), &QuicConfig::default()).unwrap();
    let addr = listener.local_addr().unwrap();
    let (accepted_tx, accepted_rx) = tokio::sync::oneshot::channel();

    let server = tokio::spawn(async move {
        let session = listener.accept().await.unwrap().handshake().await.unwrap();
        let _ = accepted_tx.send(());
        session.accept_stream().await
    });

    let session = dial(addr, "localhost", &QuicConfig::default()).await.unwrap();
    accepted_rx.await.unwrap();
    session.close("bye");

    let accepted = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server task timed out")
        .unwrap();
    assert!(matches!(accepted, Ok(None)));
}
