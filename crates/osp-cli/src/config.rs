//! CLI configuration file
//!
//! Read from `--config`, or from `<config dir>/osp/config.toml` when that
//! file exists. Every field is optional; command-line flags win.

use anyhow::{Context, Result};
use osp_core::SERVICE_TYPE;
use osp_presentation::{ControllerConfig, ReceiverConfig, DEFAULT_PORT};
use osp_transport::QuicConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub service_type: String,
    pub quic: QuicSection,
    pub receiver: ReceiverSection,
    pub sender: SenderSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuicSection {
    pub keep_alive_ms: u64,
    pub idle_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverSection {
    /// Instance name used when none is given on the command line
    pub name: Option<String>,
    pub bind: IpAddr,
    pub port: u16,
    /// DER certificate; a self-signed one is generated when absent
    pub cert_file: Option<PathBuf>,
    /// DER (PKCS#8) private key for `cert_file`
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SenderSection {
    pub resolve_timeout_ms: u64,
    pub response_timeout_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            quic: QuicSection::default(),
            receiver: ReceiverSection::default(),
            sender: SenderSection::default(),
        }
    }
}

impl Default for QuicSection {
    fn default() -> Self {
        let defaults = QuicConfig::default();
        Self {
            keep_alive_ms: defaults.keep_alive_ms,
            idle_timeout_ms: defaults.idle_timeout_ms,
        }
    }
}

impl Default for ReceiverSection {
    fn default() -> Self {
        Self {
            name: None,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            cert_file: None,
            key_file: None,
        }
    }
}

impl Default for SenderSection {
    fn default() -> Self {
        let defaults = ControllerConfig::default();
        Self {
            resolve_timeout_ms: defaults.resolve_timeout.as_millis() as u64,
            response_timeout_ms: defaults.response_timeout.as_millis() as u64,
        }
    }
}

impl CliConfig {
    /// Load `path`, or the default file if present, or built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = default_config_file();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn quic_config(&self) -> QuicConfig {
        QuicConfig {
            keep_alive_ms: self.quic.keep_alive_ms,
            idle_timeout_ms: self.quic.idle_timeout_ms,
            ..Default::default()
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            service_type: self.service_type.clone(),
            resolve_timeout: Duration::from_millis(self.sender.resolve_timeout_ms),
            response_timeout: Duration::from_millis(self.sender.response_timeout_ms),
            quic: self.quic_config(),
        }
    }

    pub fn receiver_config(&self, instance_name: String) -> ReceiverConfig {
        ReceiverConfig {
            instance_name,
            bind_addr: self.receiver.bind,
            port: self.receiver.port,
            service_type: self.service_type.clone(),
            quic: self.quic_config(),
        }
    }
}

/// Get the default config file path
pub fn default_config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("osp")
        .join("config.toml")
}
