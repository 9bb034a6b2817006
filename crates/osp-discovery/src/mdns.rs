//! mDNS/DNS-SD discovery

use crate::{check_service_type, Advertisement, DiscoveryError, Result, ServiceDiscovery, ServiceEndpoint};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// TXT key carrying the receiver's certificate fingerprint
pub const TXT_FINGERPRINT: &str = "fp";
/// TXT key carrying the receiver's metadata version
pub const TXT_METADATA_VERSION: &str = "mv";

/// Discovery over multicast DNS.
///
/// Owns its own daemon; two instances never share resolver state. One browse
/// per service type is active at a time: browsing a type again replaces the
/// earlier browse, whose channel then closes.
pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
}

impl MdnsDiscovery {
    /// Start a resolver daemon
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        Ok(Self { daemon })
    }

    /// Stop the daemon; outstanding browses close and advertisements vanish
    pub fn shutdown(&self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("mDNS daemon shutdown: {}", e);
        }
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ServiceDiscovery for MdnsDiscovery {
    fn advertise(
        &self,
        instance_name: &str,
        service_type: &str,
        port: u16,
        token: &CancellationToken,
    ) -> Result<Advertisement> {
        check_service_type(service_type)?;
        if instance_name.is_empty() || port == 0 {
            return Err(DiscoveryError::InvalidEndpoint(format!(
                "cannot advertise '{}' on port {}",
                instance_name, port
            )));
        }

        let host = format!("{}.local.", hostname::get()?.to_string_lossy());
        let service_info = ServiceInfo::new(
            service_type,
            instance_name,
            &host,
            "",
            port,
            None::<HashMap<String, String>>,
        )
        .map_err(|e| DiscoveryError::Mdns(e.to_string()))?
        .enable_addr_auto();

        let fullname = service_info.get_fullname().to_string();
        self.daemon
            .register(service_info)
            .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

        info!("Advertising {} on port {}", fullname, port);

        let daemon = self.daemon.clone();
        Ok(Advertisement::new(instance_name, port, token, move || {
            match daemon.unregister(&fullname) {
                Ok(_) => info!("Withdrew advertisement {}", fullname),
                Err(e) => debug!("mDNS unregister {}: {}", fullname, e),
            }
        }))
    }

    fn browse(
        &self,
        service_type: &str,
        token: &CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<ServiceEndpoint>> {
        check_service_type(service_type)?;

        let receiver = self
            .daemon
            .browse(service_type)
            .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

        info!("Starting mDNS browse for {}", service_type);

        let (tx, rx) = mpsc::unbounded_channel();
        let daemon = self.daemon.clone();
        let service_type = service_type.to_string();
        let token = token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv_async() => event,
                };

                match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        let record = ResolvedRecord::from_info(&info);
                        match parse_record(&service_type, record) {
                            Ok(endpoint) => {
                                debug!("mDNS resolved {}", endpoint);
                                if tx.send(endpoint).is_err() {
                                    break;
                                }
                            }
                            Err(reason) => {
                                debug!("Dropping mDNS record {}: {}", info.get_fullname(), reason);
                            }
                        }
                    }
                    Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                        debug!("mDNS record removed: {}", fullname);
                    }
                    Ok(ServiceEvent::SearchStopped(_)) => {
                        debug!("mDNS search stopped");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("mDNS receive error: {:?}", e);
                        break;
                    }
                }
            }

            if let Err(e) = daemon.stop_browse(&service_type) {
                debug!("mDNS stop_browse {}: {}", service_type, e);
            }
            debug!("mDNS browse for {} finished", service_type);
        });

        Ok(rx)
    }
}

/// The parts of a resolved mDNS record an endpoint is built from
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedRecord {
    pub fullname: String,
    pub hostname: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
    pub fingerprint: Option<String>,
    pub metadata_version: Option<String>,
}

impl ResolvedRecord {
    fn from_info(info: &ServiceInfo) -> Self {
        let mut addresses: Vec<IpAddr> = info
            .get_addresses()
            .iter()
            .filter_map(|addr| addr.to_string().parse().ok())
            .collect();
        addresses.sort();

        let properties = info.get_properties();
        Self {
            fullname: info.get_fullname().to_string(),
            hostname: info.get_hostname().to_string(),
            port: info.get_port(),
            addresses,
            fingerprint: properties
                .get_property_val_str(TXT_FINGERPRINT)
                .map(str::to_string),
            metadata_version: properties
                .get_property_val_str(TXT_METADATA_VERSION)
                .map(str::to_string),
        }
    }
}

/// Turn a record into an endpoint, or say why it is unusable
pub(crate) fn parse_record(
    service_type: &str,
    record: ResolvedRecord,
) -> std::result::Result<ServiceEndpoint, &'static str> {
    let instance_name = record
        .fullname
        .strip_suffix(service_type)
        .and_then(|name| name.strip_suffix('.'))
        .filter(|name| !name.is_empty())
        .ok_or("fullname not in browsed service type")?;

    let mut endpoint = ServiceEndpoint::new(instance_name, record.hostname, record.port);
    for addr in record.addresses {
        endpoint = endpoint.with_addr(addr);
    }
    endpoint.fingerprint = record.fingerprint.filter(|fp| !fp.is_empty());
    endpoint.metadata_version = record.metadata_version.and_then(|mv| mv.parse().ok());

    if endpoint.ipv4.is_none() && endpoint.ipv6.is_none() {
        return Err("no address");
    }
    if endpoint.port == 0 {
        return Err("port 0");
    }
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const TYPE: &str = "_openscreen._udp.local.";

    fn record() -> ResolvedRecord {
        ResolvedRecord {
            fullname: format!("TV.{}", TYPE),
            hostname: "tv.local.".into(),
            port: 4433,
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_record() {
        let endpoint = parse_record(TYPE, record()).unwrap();
        assert_eq!(endpoint.instance_name, "TV");
        assert_eq!(endpoint.port, 4433);
        assert_eq!(endpoint.ipv4, Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(endpoint.fingerprint, None);
    }

    #[test]
    fn test_parse_record_with_dots_in_name() {
        let mut r = record();
        r.fullname = format!("Living.Room TV.{}", TYPE);
        assert_eq!(parse_record(TYPE, r).unwrap().instance_name, "Living.Room TV");
    }

    #[test]
    fn test_parse_record_txt_keys() {
        let mut r = record();
        r.fingerprint = Some("ab:cd".into());
        r.metadata_version = Some("7".into());
        let endpoint = parse_record(TYPE, r).unwrap();
        assert_eq!(endpoint.fingerprint.as_deref(), Some("ab:cd"));
        assert_eq!(endpoint.metadata_version, Some(7));

        let mut r = record();
        r.metadata_version = Some("seven".into());
        assert_eq!(parse_record(TYPE, r).unwrap().metadata_version, None);
    }

    #[test]
    fn test_malformed_records_dropped() {
        let mut no_addr = record();
        no_addr.addresses.clear();
        assert_eq!(parse_record(TYPE, no_addr).unwrap_err(), "no address");

        let mut no_port = record();
        no_port.port = 0;
        assert_eq!(parse_record(TYPE, no_port).unwrap_err(), "port 0");

        let mut other_type = record();
        other_type.fullname = "TV._googlecast._tcp.local.".into();
        assert!(parse_record(TYPE, other_type).is_err());

        let mut bare_type = record();
        bare_type.fullname = TYPE.into();
        assert!(parse_record(TYPE, bare_type).is_err());
    }
}
