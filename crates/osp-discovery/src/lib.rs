//! OSP Discovery
//!
//! Maps receiver instance names to dialable endpoints:
//! - mDNS/DNS-SD advertisement and browsing on the local network
//! - An in-process registry for tests and manually entered receivers
//!
//! Both implement [`ServiceDiscovery`] and are injected into the presentation
//! roles; there is no process-wide resolver state.

pub mod endpoint;
pub mod error;
pub mod mdns;
pub mod memory;

pub use endpoint::ServiceEndpoint;
pub use error::{DiscoveryError, Result};
pub use mdns::MdnsDiscovery;
pub use memory::InMemoryDiscovery;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Advertise and browse receivers of a service type.
///
/// Both calls return as soon as background work has started. Failing to
/// start is reported once here; nothing is reported per record afterwards.
pub trait ServiceDiscovery: Send + Sync + 'static {
    /// Announce `instance_name` on `port` until the returned handle is stopped
    /// or dropped, or `token` is cancelled.
    fn advertise(
        &self,
        instance_name: &str,
        service_type: &str,
        port: u16,
        token: &CancellationToken,
    ) -> Result<Advertisement>;

    /// Yield every matching endpoint as it is seen. The same instance may be
    /// yielded more than once. The channel closes when `token` is cancelled.
    fn browse(
        &self,
        service_type: &str,
        token: &CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<ServiceEndpoint>>;
}

type Withdraw = Box<dyn FnOnce() + Send>;

/// Handle to an active advertisement.
///
/// The record is withdrawn exactly once: on [`stop`](Self::stop), on drop, or
/// when the token passed to `advertise` is cancelled.
pub struct Advertisement {
    instance_name: String,
    port: u16,
    token: CancellationToken,
    withdraw: Arc<Mutex<Option<Withdraw>>>,
}

impl Advertisement {
    /// Wrap a registered record. `withdraw` removes it again.
    pub fn new(
        instance_name: impl Into<String>,
        port: u16,
        parent: &CancellationToken,
        withdraw: impl FnOnce() + Send + 'static,
    ) -> Self {
        let token = parent.child_token();
        let withdraw: Arc<Mutex<Option<Withdraw>>> =
            Arc::new(Mutex::new(Some(Box::new(withdraw))));

        let watch_token = token.clone();
        let watch_withdraw = withdraw.clone();
        tokio::spawn(async move {
            watch_token.cancelled().await;
            run_withdraw(&watch_withdraw);
        });

        Self {
            instance_name: instance_name.into(),
            port,
            token,
            withdraw,
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Withdraw the record now
    pub fn stop(&self) {
        self.token.cancel();
        run_withdraw(&self.withdraw);
    }
}

impl Drop for Advertisement {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Advertisement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advertisement")
            .field("instance_name", &self.instance_name)
            .field("port", &self.port)
            .field("active", &self.is_active())
            .finish()
    }
}

fn run_withdraw(withdraw: &Mutex<Option<Withdraw>>) {
    let f = withdraw.lock().take();
    if let Some(f) = f {
        f();
    }
}

pub(crate) fn check_service_type(service_type: &str) -> Result<()> {
    if service_type.starts_with('_') && service_type.ends_with(".local.") {
        Ok(())
    } else {
        Err(DiscoveryError::InvalidServiceType(service_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_advertisement(
        parent: &CancellationToken,
    ) -> (Advertisement, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let ad = Advertisement::new("TV", 4433, parent, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (ad, count)
    }

    #[tokio::test]
    async fn test_stop_withdraws_once() {
        let parent = CancellationToken::new();
        let (ad, count) = counting_advertisement(&parent);
        assert!(ad.is_active());

        ad.stop();
        ad.stop();
        assert!(!ad.is_active());
        drop(ad);
        tokio::task::yield_now().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_parent_cancel_withdraws() {
        let parent = CancellationToken::new();
        let (ad, count) = counting_advertisement(&parent);

        parent.cancel();
        for _ in 0..10 {
            if count.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!ad.is_active());
    }

    #[tokio::test]
    async fn test_drop_withdraws() {
        let parent = CancellationToken::new();
        let (ad, count) = counting_advertisement(&parent);
        drop(ad);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!parent.is_cancelled(), "child stop must not cancel the parent");
    }

    #[test]
    fn test_service_type_check() {
        assert!(check_service_type("_openscreen._udp.local.").is_ok());
        assert!(check_service_type("openscreen").is_err());
        assert!(check_service_type("_openscreen._udp.local").is_err());
    }
}
