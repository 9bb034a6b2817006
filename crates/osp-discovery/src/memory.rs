//! In-process discovery registry

use crate::{check_service_type, Advertisement, Result, ServiceDiscovery, ServiceEndpoint};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type Key = (String, String);

struct Registry {
    records: Mutex<HashMap<Key, ServiceEndpoint>>,
    events: broadcast::Sender<(String, ServiceEndpoint)>,
    address: IpAddr,
    hostname: String,
}

/// Discovery without a network.
///
/// Clones share one registry, so a receiver and a sender in the same process
/// see each other. Advertised records carry the configured address (loopback
/// by default).
#[derive(Clone)]
pub struct InMemoryDiscovery {
    registry: Arc<Registry>,
}

impl InMemoryDiscovery {
    pub fn new() -> Self {
        Self::with_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    /// Advertise records at `address` instead of loopback
    pub fn with_address(address: IpAddr) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            registry: Arc::new(Registry {
                records: Mutex::new(HashMap::new()),
                events,
                address,
                hostname: "localhost".to_string(),
            }),
        }
    }

    /// Add a record by hand, replacing any record with the same instance name
    pub fn register(&self, service_type: &str, endpoint: ServiceEndpoint) -> Result<()> {
        check_service_type(service_type)?;
        endpoint.validate()?;

        let key = (service_type.to_string(), endpoint.instance_name.clone());
        self.registry.records.lock().insert(key, endpoint.clone());
        debug!("Registered {} for {}", endpoint, service_type);

        // No browsers is fine.
        let _ = self.registry.events.send((service_type.to_string(), endpoint));
        Ok(())
    }

    /// Remove a record; returns whether it existed
    pub fn remove(&self, service_type: &str, instance_name: &str) -> bool {
        self.registry
            .records
            .lock()
            .remove(&(service_type.to_string(), instance_name.to_string()))
            .is_some()
    }

    // Only while the record is still the one registered on `port`; a newer
    // advertisement under the same name stays.
    fn withdraw(&self, service_type: &str, instance_name: &str, port: u16) -> bool {
        let mut records = self.registry.records.lock();
        let key = (service_type.to_string(), instance_name.to_string());
        match records.get(&key) {
            Some(endpoint) if endpoint.port == port => records.remove(&key).is_some(),
            _ => false,
        }
    }

    /// Current records of a service type
    pub fn endpoints(&self, service_type: &str) -> Vec<ServiceEndpoint> {
        let mut endpoints: Vec<ServiceEndpoint> = self
            .registry
            .records
            .lock()
            .iter()
            .filter(|((ty, _), _)| ty == service_type)
            .map(|(_, endpoint)| endpoint.clone())
            .collect();
        endpoints.sort_by(|a, b| a.instance_name.cmp(&b.instance_name));
        endpoints
    }
}

impl Default for InMemoryDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDiscovery for InMemoryDiscovery {
    fn advertise(
        &self,
        instance_name: &str,
        service_type: &str,
        port: u16,
        token: &CancellationToken,
    ) -> Result<Advertisement> {
        let endpoint = ServiceEndpoint::new(instance_name, self.registry.hostname.clone(), port)
            .with_addr(self.registry.address);
        self.register(service_type, endpoint)?;
        info!("Advertising {} ({}) on port {}", instance_name, service_type, port);

        let this = self.clone();
        let service_type = service_type.to_string();
        let name = instance_name.to_string();
        Ok(Advertisement::new(instance_name, port, token, move || {
            if this.withdraw(&service_type, &name, port) {
                info!("Withdrew advertisement {} ({})", name, service_type);
            }
        }))
    }

    fn browse(
        &self,
        service_type: &str,
        token: &CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<ServiceEndpoint>> {
        check_service_type(service_type)?;

        let (tx, rx) = mpsc::unbounded_channel();

        // Subscribe before the snapshot so nothing registered in between is missed.
        let mut events = self.registry.events.subscribe();
        for endpoint in self.endpoints(service_type) {
            let _ = tx.send(endpoint);
        }

        let service_type = service_type.to_string();
        let token = token.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => event,
                };

                match event {
                    Ok((ty, endpoint)) if ty == service_type => {
                        if tx.send(endpoint).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("In-memory browse lagged by {} records", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("In-memory browse for {} finished", service_type);
        });

        Ok(rx)
    }
}
