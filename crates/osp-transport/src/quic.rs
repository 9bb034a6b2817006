//! QUIC transport implementation
//!
//! OSP sessions run over QUIC using the quinn crate:
//! - TLS 1.3 handshake authenticated by the listener's certificate
//! - Any number of independent bidirectional streams per session
//! - Per-stream ordering; no ordering across streams
//!
//! The listener shares one TLS identity read-only across every session it
//! accepts. Dialers currently accept any server certificate; the policy is
//! selected through [`CertVerification`].

use async_trait::async_trait;
use osp_core::OSP_ALPN;
use quinn::{
    ClientConfig, Connection, ConnectionError, Endpoint, IdleTimeout, RecvStream, SendStream,
    ServerConfig, TransportConfig,
};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::identity::TlsIdentity;
use crate::traits::Session;

/// Certificate verification mode for dialers
#[derive(Debug, Clone, Default)]
pub enum CertVerification {
    /// Accept any server certificate. Handshake signatures are still checked,
    /// so the peer must hold the key of the certificate it presents.
    #[default]
    AcceptAny,
    /// Trust only certificates chaining to these roots (DER-encoded)
    CustomRoots(Vec<Vec<u8>>),
}

/// QUIC transport configuration
#[derive(Debug, Clone)]
pub struct QuicConfig {
    /// Keep-alive interval in milliseconds (0 to disable)
    pub keep_alive_ms: u64,
    /// Maximum idle timeout in milliseconds
    pub idle_timeout_ms: u64,
    /// Certificate verification mode
    pub cert_verification: CertVerification,
}

impl Default for QuicConfig {
    fn default() -> Self {
        Self {
            keep_alive_ms: 5000,
            idle_timeout_ms: 30000,
            cert_verification: CertVerification::default(),
        }
    }
}

impl QuicConfig {
    /// Create a config that trusts only the given roots
    pub fn with_custom_roots(certs: Vec<Vec<u8>>) -> Self {
        Self {
            cert_verification: CertVerification::CustomRoots(certs),
            ..Default::default()
        }
    }

    fn transport_config(&self) -> Result<TransportConfig> {
        let mut transport = TransportConfig::default();
        if self.keep_alive_ms > 0 {
            transport.keep_alive_interval(Some(Duration::from_millis(self.keep_alive_ms)));
        }
        let idle = IdleTimeout::try_from(Duration::from_millis(self.idle_timeout_ms))
            .map_err(|e| TransportError::Endpoint(format!("invalid idle timeout: {}", e)))?;
        transport.max_idle_timeout(Some(idle));
        Ok(transport)
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Server endpoint producing inbound sessions
pub struct QuicListener {
    endpoint: Endpoint,
}

impl QuicListener {
    /// Bind a listener presenting `identity` to dialers
    pub fn bind(bind_addr: SocketAddr, identity: &TlsIdentity, config: &QuicConfig) -> Result<Self> {
        let server_config = build_server_config(identity, config)?;

        let endpoint = Endpoint::server(server_config, bind_addr)
            .map_err(|e| TransportError::Endpoint(format!("server bind {} failed: {}", bind_addr, e)))?;

        info!("QUIC listener bound on {}", endpoint.local_addr()?);
        Ok(Self { endpoint })
    }

    /// Wait for the next inbound connection attempt.
    ///
    /// `None` once the listener has been closed. The TLS handshake has not
    /// run yet; drive it with [`PendingSession::handshake`], usually from a
    /// task of its own so a stalled peer holds up nobody else.
    pub async fn accept(&self) -> Option<PendingSession> {
        let incoming = self.endpoint.accept().await?;
        debug!("QUIC connection attempt from {}", incoming.remote_address());
        Some(PendingSession { incoming })
    }

    /// Get the local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Stop accepting and close every session of this listener
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"listener closed");
    }
}

/// Inbound connection whose handshake has not completed
pub struct PendingSession {
    incoming: quinn::Incoming,
}

impl PendingSession {
    pub fn remote_addr(&self) -> SocketAddr {
        self.incoming.remote_address()
    }

    /// Complete the TLS handshake.
    ///
    /// Bounded by the idle timeout when the peer stops responding.
    pub async fn handshake(self) -> Result<QuicSession> {
        let remote = self.incoming.remote_address();
        let connection = self
            .incoming
            .await
            .map_err(|e| TransportError::Handshake(format!("{}: {}", remote, e)))?;

        info!("QUIC accepted session from {}", remote);
        Ok(QuicSession::new(connection, None))
    }
}

// ============================================================================
// Dialer
// ============================================================================

/// Connect to a listener at `addr`.
///
/// A client endpoint of the matching address family is bound for the
/// session and lives as long as it does.
pub async fn dial(addr: SocketAddr, server_name: &str, config: &QuicConfig) -> Result<QuicSession> {
    let bind: SocketAddr = if addr.is_ipv6() {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    };

    let mut endpoint = Endpoint::client(bind)
        .map_err(|e| TransportError::Endpoint(format!("client bind failed: {}", e)))?;
    endpoint.set_default_client_config(build_client_config(config)?);

    let connecting = endpoint
        .connect(addr, server_name)
        .map_err(|e| TransportError::DialFailed(format!("{} ({}): {}", server_name, addr, e)))?;

    let connection = connecting
        .await
        .map_err(|e| TransportError::Handshake(format!("{} ({}): {}", server_name, addr, e)))?;

    info!("QUIC connected to {} ({})", server_name, addr);
    Ok(QuicSession::new(connection, Some(endpoint)))
}

/// Resolve `host` and dial the first address it maps to
pub async fn dial_host(host: &str, port: u16, config: &QuicConfig) -> Result<QuicSession> {
    let host = host.trim_end_matches('.');
    let addr = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TransportError::Resolve(format!("{}: {}", host, e)))?
        .next()
        .ok_or_else(|| TransportError::Resolve(host.to_string()))?;

    dial(addr, host, config).await
}

// ============================================================================
// Session
// ============================================================================

/// One QUIC connection
pub struct QuicSession {
    connection: Connection,
    // Client sessions own their endpoint; server sessions share the listener's.
    _endpoint: Option<Endpoint>,
}

impl QuicSession {
    fn new(connection: Connection, endpoint: Option<Endpoint>) -> Self {
        Self {
            connection,
            _endpoint: endpoint,
        }
    }
}

#[async_trait]
impl Session for QuicSession {
    type Stream = QuicStream;

    async fn open_stream(&self) -> Result<QuicStream> {
        let (send, recv) = self
            .connection
            .open_bi()
            .await
            .map_err(|e| TransportError::StreamOpenFailed(e.to_string()))?;

        debug!("QUIC opened stream {} to {}", send.id(), self.remote_addr());
        Ok(QuicStream { send, recv })
    }

    async fn accept_stream(&self) -> Result<Option<QuicStream>> {
        match self.connection.accept_bi().await {
            Ok((send, recv)) => {
                debug!("QUIC accepted stream {} from {}", send.id(), self.remote_addr());
                Ok(Some(QuicStream { send, recv }))
            }
            Err(ConnectionError::ApplicationClosed(_))
            | Err(ConnectionError::ConnectionClosed(_))
            | Err(ConnectionError::LocallyClosed) => Ok(None),
            Err(e) => Err(TransportError::StreamAcceptFailed(e.to_string())),
        }
    }

    fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    fn close(&self, reason: &str) {
        self.connection.close(0u32.into(), reason.as_bytes());
    }
}

// ============================================================================
// Stream
// ============================================================================

/// Bidirectional QUIC stream.
///
/// Bytes arrive in write order. Errors end this stream only.
pub struct QuicStream {
    send: SendStream,
    recv: RecvStream,
}

impl QuicStream {
    pub fn id(&self) -> quinn::StreamId {
        self.send.id()
    }

    /// Signal that nothing more will be written on this stream
    pub fn finish(&mut self) -> Result<()> {
        self.send
            .finish()
            .map_err(|e| TransportError::WriteFailed(format!("stream finish failed: {}", e)))
    }
}

impl AsyncRead for QuicStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        AsyncRead::poll_read(Pin::new(&mut self.recv), cx, buf)
    }
}

impl AsyncWrite for QuicStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        AsyncWrite::poll_write(Pin::new(&mut self.send), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        AsyncWrite::poll_flush(Pin::new(&mut self.send), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        AsyncWrite::poll_shutdown(Pin::new(&mut self.send), cx)
    }
}

// ============================================================================
// TLS configuration
// ============================================================================

fn build_server_config(identity: &TlsIdentity, config: &QuicConfig) -> Result<ServerConfig> {
    let mut server_crypto = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![identity.certificate()], identity.private_key())
        .map_err(|e| TransportError::InvalidIdentity(e.to_string()))?;
    server_crypto.alpn_protocols = vec![OSP_ALPN.to_vec()];

    let quic_crypto = quinn::crypto::rustls::QuicServerConfig::try_from(server_crypto)
        .map_err(|e| TransportError::Tls(format!("server crypto: {}", e)))?;

    let mut server_config = ServerConfig::with_crypto(Arc::new(quic_crypto));
    server_config.transport_config(Arc::new(config.transport_config()?));
    Ok(server_config)
}

fn build_client_config(config: &QuicConfig) -> Result<ClientConfig> {
    let mut crypto = match &config.cert_verification {
        CertVerification::AcceptAny => {
            warn!("QUIC dialer accepts any server certificate");
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
                .with_no_client_auth()
        }
        CertVerification::CustomRoots(certs) => {
            let mut root_store = rustls::RootCertStore::empty();
            for cert_der in certs {
                let cert = rustls::pki_types::CertificateDer::from(cert_der.clone());
                if let Err(e) = root_store.add(cert) {
                    warn!("Failed to add custom root: {}", e);
                }
            }

            if root_store.is_empty() {
                return Err(TransportError::Tls("no valid custom roots provided".into()));
            }

            debug!("Using {} custom root certificates", root_store.len());
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        }
    };
    crypto.alpn_protocols = vec![OSP_ALPN.to_vec()];

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TransportError::Tls(format!("client crypto: {}", e)))?;

    let mut client_config = ClientConfig::new(Arc::new(quic_crypto));
    client_config.transport_config(Arc::new(config.transport_config()?));
    Ok(client_config)
}

/// Accepts any certificate but still verifies handshake signatures against it
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self {
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quic_config_default() {
        let config = QuicConfig::default();
        assert_eq!(config.keep_alive_ms, 5000);
        assert_eq!(config.idle_timeout_ms, 30000);
        assert!(matches!(config.cert_verification, CertVerification::AcceptAny));
    }

    #[test]
    fn test_custom_roots_require_valid_certs() {
        let config = QuicConfig::with_custom_roots(vec![vec![0u8; 4]]);
        assert!(build_client_config(&config).is_err());
    }

    #[test]
    fn test_keep_alive_disabled() {
        let config = QuicConfig {
            keep_alive_ms: 0,
            ..Default::default()
        };
        assert!(config.transport_config().is_ok());
    }
}
