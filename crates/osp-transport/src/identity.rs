//! TLS identity supplied by the listening side

use crate::error::{Result, TransportError};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// Certificate and private key (DER) a receiver presents to senders.
///
/// Generation is not this crate's concern; callers load or create one and
/// the listener shares it read-only across every session it accepts.
#[derive(Clone)]
pub struct TlsIdentity {
    cert_der: Vec<u8>,
    key_der: Vec<u8>,
}

impl TlsIdentity {
    /// Wrap an existing DER certificate and PKCS#8 private key
    pub fn from_der(cert_der: Vec<u8>, key_der: Vec<u8>) -> Result<Self> {
        if cert_der.is_empty() {
            return Err(TransportError::InvalidIdentity("empty certificate".into()));
        }
        if key_der.is_empty() {
            return Err(TransportError::InvalidIdentity("empty private key".into()));
        }
        Ok(Self { cert_der, key_der })
    }

    /// Generate a throwaway self-signed identity for the given names
    pub fn self_signed(names: &[&str]) -> Result<Self> {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names)
            .map_err(|e| TransportError::InvalidIdentity(format!("generation failed: {}", e)))?;

        Self::from_der(cert.der().to_vec(), key_pair.serialize_der())
    }

    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    pub(crate) fn certificate(&self) -> CertificateDer<'static> {
        CertificateDer::from(self.cert_der.clone())
    }

    pub(crate) fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.clone()))
    }
}

impl std::fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("cert_der", &format_args!("{} bytes", self.cert_der.len()))
            .field("key_der", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_signed_identity() {
        let identity = TlsIdentity::self_signed(&["localhost"]).unwrap();
        assert!(!identity.cert_der().is_empty());
        assert!(format!("{:?}", identity).contains("<redacted>"));
    }

    #[test]
    fn test_empty_der_rejected() {
        assert!(TlsIdentity::from_der(vec![], vec![1]).is_err());
        assert!(TlsIdentity::from_der(vec![1], vec![]).is_err());
    }
}
