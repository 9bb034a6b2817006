//! Subcommand implementations

use anyhow::{Context, Result};
use colored::Colorize;
use osp_core::UrlAvailability;
use osp_discovery::{InMemoryDiscovery, MdnsDiscovery, ServiceDiscovery, ServiceEndpoint};
use osp_presentation::{ControllerConfig, PresentationController, PresentationReceiver, ReceiverConfig};
use osp_transport::TlsIdentity;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run a receiver until Ctrl+C
pub async fn receive(
    config: ReceiverConfig,
    tls_files: Option<(PathBuf, PathBuf)>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let identity = load_identity(tls_files)?;
    let discovery = MdnsDiscovery::new().context("Failed to start mDNS")?;

    let renderer = |url: &str| {
        println!("{} {}", "PRESENT".green().bold(), url.yellow());
    };
    let receiver = PresentationReceiver::start(config, &identity, &discovery, renderer, shutdown)
        .context("Failed to start receiver")?;

    println!(
        "{} Receiver '{}' listening on {}",
        "OSP".cyan().bold(),
        receiver.instance_name(),
        receiver.local_addr()
    );

    shutdown.cancelled().await;
    receiver.shutdown();
    receiver.join().await;
    println!("{}", "Receiver stopped".yellow());

    Ok(())
}

/// Print receivers as they are discovered
pub async fn browse(
    service_type: &str,
    timeout: Option<u64>,
    json: bool,
    shutdown: &CancellationToken,
) -> Result<()> {
    let discovery = MdnsDiscovery::new().context("Failed to start mDNS")?;
    let token = shutdown.child_token();
    let mut endpoints = discovery.browse(service_type, &token)?;

    if let Some(secs) = timeout {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            token.cancel();
        });
    }

    if !json {
        println!("{} Browsing for {}", "OSP".cyan().bold(), service_type);
    }

    // Records repeat; show each instance once.
    let mut seen = HashSet::new();
    while let Some(endpoint) = endpoints.recv().await {
        if !seen.insert(endpoint.instance_name.clone()) {
            continue;
        }
        if json {
            println!("{}", serde_json::to_string(&endpoint)?);
        } else {
            print_endpoint(&endpoint);
        }
    }

    info!("Browse finished with {} receivers", seen.len());
    Ok(())
}

/// Fling `url` to `target`
pub async fn fling(
    config: ControllerConfig,
    target: &str,
    url: &str,
    addr: Option<SocketAddr>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let controller = PresentationController::new(discovery_for(&config, target, addr)?, config);

    println!(
        "{} Flinging {} to {}",
        "OSP".cyan().bold(),
        url.yellow(),
        target.green()
    );

    let outcome = controller
        .fling(target, url, shutdown)
        .await
        .with_context(|| format!("Fling to '{}' failed", target))?;

    println!(
        "{} Presentation {} started on {}",
        "OK".green().bold(),
        outcome.presentation_id,
        outcome.endpoint
    );
    Ok(())
}

/// Print which of `urls` the receiver can present
pub async fn availability(
    config: ControllerConfig,
    target: &str,
    urls: &[String],
    addr: Option<SocketAddr>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let controller = PresentationController::new(discovery_for(&config, target, addr)?, config);

    let availabilities = controller
        .check_availability(target, urls, shutdown)
        .await
        .with_context(|| format!("Availability check on '{}' failed", target))?;

    for (url, availability) in urls.iter().zip(availabilities) {
        let label = match availability {
            UrlAvailability::Compatible => "compatible".green(),
            UrlAvailability::NotCompatible => "not compatible".yellow(),
            UrlAvailability::NotValid => "not valid".red(),
        };
        println!("  {} {}", label, url);
    }
    Ok(())
}

/// mDNS, or a one-entry registry when the address is already known
fn discovery_for(
    config: &ControllerConfig,
    target: &str,
    addr: Option<SocketAddr>,
) -> Result<Arc<dyn ServiceDiscovery>> {
    match addr {
        Some(addr) => {
            let discovery = InMemoryDiscovery::new();
            let endpoint = ServiceEndpoint::new(target, addr.ip().to_string(), addr.port())
                .with_addr(addr.ip());
            discovery.register(&config.service_type, endpoint)?;
            Ok(Arc::new(discovery))
        }
        None => Ok(Arc::new(
            MdnsDiscovery::new().context("Failed to start mDNS")?,
        )),
    }
}

fn load_identity(tls_files: Option<(PathBuf, PathBuf)>) -> Result<TlsIdentity> {
    match tls_files {
        Some((cert, key)) => {
            let cert_der = std::fs::read(&cert)
                .with_context(|| format!("Failed to read certificate {}", cert.display()))?;
            let key_der = std::fs::read(&key)
                .with_context(|| format!("Failed to read private key {}", key.display()))?;
            Ok(TlsIdentity::from_der(cert_der, key_der)?)
        }
        None => {
            info!("No certificate configured, generating a self-signed one");
            Ok(TlsIdentity::self_signed(&["localhost"])?)
        }
    }
}

fn print_endpoint(endpoint: &ServiceEndpoint) {
    let addr = endpoint
        .socket_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "?".to_string());
    println!(
        "  {} {} ({})",
        endpoint.instance_name.green().bold(),
        addr,
        endpoint.hostname.trim_end_matches('.')
    );
    if let Some(fp) = &endpoint.fingerprint {
        println!("    fingerprint {}", fp);
    }
}
