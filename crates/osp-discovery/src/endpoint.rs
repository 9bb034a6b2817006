//! Receiver endpoint records

use crate::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// A receiver as advertised or discovered on the local network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Unique human-readable label, e.g. "Living Room TV"
    pub instance_name: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
    pub port: u16,
    /// Certificate fingerprint from the `fp` TXT key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Metadata version from the `mv` TXT key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_version: Option<u64>,
}

impl ServiceEndpoint {
    pub fn new(instance_name: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            instance_name: instance_name.into(),
            hostname: hostname.into(),
            ipv4: None,
            ipv6: None,
            port,
            fingerprint: None,
            metadata_version: None,
        }
    }

    /// Record an address; the first of each family wins
    pub fn with_addr(mut self, addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => {
                self.ipv4.get_or_insert(v4);
            }
            IpAddr::V6(v6) => {
                self.ipv6.get_or_insert(v6);
            }
        }
        self
    }

    /// Check that the record can actually be dialed
    pub fn validate(&self) -> Result<()> {
        if self.instance_name.is_empty() {
            return Err(DiscoveryError::InvalidEndpoint("empty instance name".into()));
        }
        if self.ipv4.is_none() && self.ipv6.is_none() {
            return Err(DiscoveryError::InvalidEndpoint(format!(
                "{} has no address",
                self.instance_name
            )));
        }
        if self.port == 0 {
            return Err(DiscoveryError::InvalidEndpoint(format!(
                "{} has port 0",
                self.instance_name
            )));
        }
        Ok(())
    }

    /// Address to dial, preferring IPv4
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ipv4
            .map(IpAddr::V4)
            .or(self.ipv6.map(IpAddr::V6))
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl std::fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.socket_addr() {
            Some(addr) => write!(f, "{} ({}, {})", self.instance_name, self.hostname, addr),
            None => write!(f, "{} ({}:{})", self.instance_name, self.hostname, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let endpoint = ServiceEndpoint::new("TV", "tv.local.", 4433);
        assert!(endpoint.validate().is_err(), "no address");

        let endpoint = endpoint.with_addr(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(endpoint.validate().is_ok());

        let mut zero_port = endpoint.clone();
        zero_port.port = 0;
        assert!(zero_port.validate().is_err());

        let mut unnamed = endpoint;
        unnamed.instance_name.clear();
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_socket_addr_prefers_ipv4() {
        let endpoint = ServiceEndpoint::new("TV", "tv.local.", 4433)
            .with_addr(IpAddr::V6(Ipv6Addr::LOCALHOST))
            .with_addr(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)));

        assert_eq!(
            endpoint.socket_addr(),
            Some("192.168.1.20:4433".parse().unwrap())
        );
    }

    #[test]
    fn test_first_address_per_family_wins() {
        let endpoint = ServiceEndpoint::new("TV", "tv.local.", 1)
            .with_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
            .with_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(endpoint.ipv4, Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let endpoint = ServiceEndpoint::new("TV", "tv.local.", 4433)
            .with_addr(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let json = serde_json::to_string(&endpoint).unwrap();

        assert!(json.contains("\"instance_name\":\"TV\""));
        assert!(!json.contains("fingerprint"));
        assert!(!json.contains("ipv6"));

        let back: ServiceEndpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, endpoint);
    }
}
