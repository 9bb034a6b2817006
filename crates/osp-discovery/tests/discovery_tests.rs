//! Discovery Tests (osp-discovery)
//!
//! Tests for receiver discovery including:
//! - In-memory advertise/browse through the ServiceDiscovery trait
//! - Advertisement lifecycle and cancellation
//! - Note: mDNS tests require multicast networking and are ignored by default

use osp_discovery::{InMemoryDiscovery, MdnsDiscovery, ServiceDiscovery, ServiceEndpoint};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SERVICE_TYPE: &str = "_openscreen._udp.local.";

async fn find_instance(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<ServiceEndpoint>,
    name: &str,
    timeout: Duration,
) -> Option<ServiceEndpoint> {
    tokio::time::timeout(timeout, async {
        while let Some(endpoint) = rx.recv().await {
            if endpoint.instance_name == name {
                return Some(endpoint);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

// ============================================================================
// Trait Object Tests
// ============================================================================

#[tokio::test]
async fn test_discovery_as_trait_object() {
    let discovery: Arc<dyn ServiceDiscovery> = Arc::new(InMemoryDiscovery::new());
    let token = CancellationToken::new();

    let ad = discovery.advertise("TV", SERVICE_TYPE, 4433, &token).unwrap();
    assert_eq!(ad.instance_name(), "TV");
    assert_eq!(ad.port(), 4433);

    let mut rx = discovery.browse(SERVICE_TYPE, &token).unwrap();
    let endpoint = find_instance(&mut rx, "TV", Duration::from_secs(1))
        .await
        .expect("TV should be discovered");
    assert_eq!(endpoint.port, 4433);
}

#[tokio::test]
async fn test_invalid_service_type_rejected() {
    let discovery = InMemoryDiscovery::new();
    let token = CancellationToken::new();

    assert!(discovery.browse("openscreen", &token).is_err());
    assert!(discovery.advertise("TV", "openscreen", 4433, &token).is_err());
}

// ============================================================================
// In-Memory Registry Tests
// ============================================================================

#[tokio::test]
async fn test_clones_share_registry() {
    let receiver_side = InMemoryDiscovery::with_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
    let sender_side = receiver_side.clone();
    let token = CancellationToken::new();

    let _ad = receiver_side
        .advertise("Kitchen", SERVICE_TYPE, 9000, &token)
        .unwrap();
    let mut rx = sender_side.browse(SERVICE_TYPE, &token).unwrap();

    let endpoint = find_instance(&mut rx, "Kitchen", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(
        endpoint.socket_addr(),
        Some("10.0.0.5:9000".parse().unwrap())
    );
}

#[tokio::test]
async fn test_manual_registration() {
    let discovery = InMemoryDiscovery::new();
    let endpoint = ServiceEndpoint::new("Projector", "projector.local.", 4433)
        .with_addr(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 40)));
    discovery.register(SERVICE_TYPE, endpoint.clone()).unwrap();

    let token = CancellationToken::new();
    let mut rx = discovery.browse(SERVICE_TYPE, &token).unwrap();
    assert_eq!(rx.recv().await, Some(endpoint));

    assert!(discovery.remove(SERVICE_TYPE, "Projector"));
    assert!(!discovery.remove(SERVICE_TYPE, "Projector"));
}

#[tokio::test]
async fn test_parent_cancel_withdraws_advertisement() {
    let discovery = InMemoryDiscovery::new();
    let token = CancellationToken::new();

    let ad = discovery.advertise("TV", SERVICE_TYPE, 4433, &token).unwrap();
    token.cancel();

    tokio::time::timeout(Duration::from_secs(1), async {
        while !discovery.endpoints(SERVICE_TYPE).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("record should be withdrawn after cancellation");
    assert!(!ad.is_active());
}

// ============================================================================
// mDNS Tests
// ============================================================================

#[tokio::test]
#[ignore = "requires multicast networking"]
async fn test_mdns_advertise_browse_roundtrip() {
    let advertiser = MdnsDiscovery::new().unwrap();
    let browser = MdnsDiscovery::new().unwrap();
    let token = CancellationToken::new();

    let _ad = advertiser
        .advertise("TV", SERVICE_TYPE, 4433, &token)
        .unwrap();
    let mut rx = browser.browse(SERVICE_TYPE, &token).unwrap();

    let endpoint = find_instance(&mut rx, "TV", Duration::from_secs(10))
        .await
        .expect("TV should be discovered over mDNS");
    assert_eq!(endpoint.port, 4433);
    assert!(endpoint.socket_addr().is_some());

    token.cancel();
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while rx.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "browse channel should close after cancel");
}

#[tokio::test]
#[ignore = "requires multicast networking"]
async fn test_mdns_rejects_port_zero() {
    let discovery = MdnsDiscovery::new().unwrap();
    let token = CancellationToken::new();
    assert!(discovery.advertise("TV", SERVICE_TYPE, 0, &token).is_err());
}
