//! Role configuration

use osp_core::SERVICE_TYPE;
use osp_transport::QuicConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default receiver port
pub const DEFAULT_PORT: u16 = 10000;

/// Sender configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Service type browsed for receivers
    pub service_type: String,
    /// How long to browse for the target before giving up
    pub resolve_timeout: Duration,
    /// How long to wait for the receiver's response
    pub response_timeout: Duration,
    pub quic: QuicConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            resolve_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
            quic: QuicConfig::default(),
        }
    }
}

/// Receiver configuration
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Instance name advertised to senders
    pub instance_name: String,
    pub bind_addr: IpAddr,
    /// Port to listen on (0 for an ephemeral port)
    pub port: u16,
    pub service_type: String,
    pub quic: QuicConfig,
}

impl ReceiverConfig {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            ..Default::default()
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            instance_name: "OSP Receiver".to_string(),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            service_type: SERVICE_TYPE.to_string(),
            quic: QuicConfig::default(),
        }
    }
}
