//! Sender role: resolve a receiver by name and ask it to present a URL

use osp_core::{
    read_message, write_message, Message, PresentationStartRequest, UrlAvailability,
    UrlAvailabilityRequest,
};
use osp_discovery::{ServiceDiscovery, ServiceEndpoint};
use osp_transport::{dial, QuicSession, QuicStream, Session};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ControllerConfig;
use crate::error::{PresentationError, Result};

/// States of one fling attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderState {
    Idle,
    Resolving,
    Connecting,
    Sending,
    AwaitingResponse,
    Done,
    Failed,
}

impl SenderState {
    /// Whether `next` may follow `self`
    pub fn can_transition_to(self, next: SenderState) -> bool {
        use SenderState::*;
        matches!(
            (self, next),
            (Idle, Resolving)
                | (Resolving, Connecting)
                | (Connecting, Sending)
                | (Sending, AwaitingResponse)
                | (AwaitingResponse, Done)
                | (Resolving | Connecting | Sending | AwaitingResponse, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SenderState::Done | SenderState::Failed)
    }
}

/// Result of a successful fling
#[derive(Debug, Clone)]
pub struct FlingOutcome {
    pub endpoint: ServiceEndpoint,
    pub request_id: u64,
    pub presentation_id: String,
}

/// A fling attempt together with every state it passed through.
///
/// `states` starts at `Idle` and ends at `Done` or `Failed`. An attempt
/// refused before it left `Idle` stays there.
#[derive(Debug)]
pub struct FlingTrace {
    pub states: Vec<SenderState>,
    pub result: Result<FlingOutcome>,
}

/// Tracks and enforces the state sequence of one attempt
#[derive(Debug)]
struct Attempt {
    target: String,
    states: Vec<SenderState>,
}

impl Attempt {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            states: vec![SenderState::Idle],
        }
    }

    fn state(&self) -> SenderState {
        self.states.last().copied().unwrap_or(SenderState::Idle)
    }

    fn advance(&mut self, next: SenderState) -> Result<()> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(PresentationError::InvalidTransition { from, to: next });
        }
        debug!("fling to '{}': {:?} -> {:?}", self.target, from, next);
        self.states.push(next);
        Ok(())
    }

    fn fail(&mut self, error: &PresentationError) {
        if self.state().can_transition_to(SenderState::Failed) {
            self.states.push(SenderState::Failed);
        }
        warn!("fling to '{}' failed: {}", self.target, error);
    }
}

/// Sends presentation requests to receivers found through discovery
pub struct PresentationController<D: ServiceDiscovery + ?Sized> {
    discovery: Arc<D>,
    config: ControllerConfig,
    next_request_id: AtomicU64,
}

impl<D: ServiceDiscovery + ?Sized> PresentationController<D> {
    pub fn new(discovery: Arc<D>, config: ControllerConfig) -> Self {
        Self {
            discovery,
            config,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Browse until an endpoint named `target` shows up. The first match wins
    /// and browsing stops.
    pub async fn resolve(&self, target: &str, cancel: &CancellationToken) -> Result<ServiceEndpoint> {
        let browse_token = cancel.child_token();
        let mut endpoints = self
            .discovery
            .browse(&self.config.service_type, &browse_token)?;

        let search = async {
            while let Some(endpoint) = endpoints.recv().await {
                if endpoint.instance_name == target {
                    return Some(endpoint);
                }
                debug!("skipping {} while resolving '{}'", endpoint, target);
            }
            None
        };

        let found = cancellable(cancel, async {
            match tokio::time::timeout(self.config.resolve_timeout, search).await {
                Ok(Some(endpoint)) => Ok(endpoint),
                Ok(None) | Err(_) => Err(PresentationError::TargetNotFound(target.to_string())),
            }
        })
        .await;
        browse_token.cancel();

        let endpoint = found?;
        info!("Resolved '{}' to {}", target, endpoint);
        Ok(endpoint)
    }

    /// Ask the receiver named `target` to present `url`.
    ///
    /// Succeeds only once the receiver has answered the request with
    /// `success`.
    pub async fn fling(
        &self,
        target: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FlingOutcome> {
        self.fling_traced(target, url, cancel).await.result
    }

    /// Like [`fling`](Self::fling), also reporting the states the attempt
    /// went through on either outcome.
    pub async fn fling_traced(
        &self,
        target: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> FlingTrace {
        let mut attempt = Attempt::new(target);
        if url.is_empty() {
            return FlingTrace {
                states: attempt.states,
                result: Err(PresentationError::InvalidRequest("empty url".into())),
            };
        }

        let result = match self.run_fling(&mut attempt, url, cancel).await {
            Ok(outcome) => {
                info!(
                    "Presentation {} of {} started on '{}'",
                    outcome.presentation_id, url, target
                );
                Ok(outcome)
            }
            Err(e) => {
                attempt.fail(&e);
                Err(e)
            }
        };

        FlingTrace {
            states: attempt.states,
            result,
        }
    }

    async fn run_fling(
        &self,
        attempt: &mut Attempt,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FlingOutcome> {
        attempt.advance(SenderState::Resolving)?;
        let endpoint = self.resolve(&attempt.target, cancel).await?;

        attempt.advance(SenderState::Connecting)?;
        let session = self.connect(&endpoint, cancel).await?;
        let mut stream = cancellable(cancel, async {
            session.open_stream().await.map_err(PresentationError::from)
        })
        .await?;

        attempt.advance(SenderState::Sending)?;
        let request_id = self.next_request_id();
        let presentation_id = Uuid::new_v4().to_string();
        let request = Message::PresentationStartRequest(PresentationStartRequest {
            request_id,
            presentation_id: presentation_id.clone(),
            url: url.to_string(),
        });
        write_message(&request, &mut stream).await?;
        stream.finish()?;

        attempt.advance(SenderState::AwaitingResponse)?;
        let response = self.await_response(&mut stream, cancel).await;
        session.close("presentation request complete");

        match response? {
            Message::PresentationStartResponse(response) if response.request_id == request_id => {
                if !response.result.is_success() {
                    return Err(PresentationError::Rejected(response.result));
                }
            }
            other => {
                return Err(PresentationError::UnexpectedResponse(format!(
                    "{} for request {} (expected presentation-start-response for {})",
                    other.name(),
                    other.request_id(),
                    request_id
                )));
            }
        }

        attempt.advance(SenderState::Done)?;
        Ok(FlingOutcome {
            endpoint,
            request_id,
            presentation_id,
        })
    }

    /// Ask the receiver named `target` which of `urls` it can present.
    ///
    /// Returns one availability per URL, in order.
    pub async fn check_availability(
        &self,
        target: &str,
        urls: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<UrlAvailability>> {
        if urls.is_empty() || urls.iter().any(|u| u.is_empty()) {
            return Err(PresentationError::InvalidRequest(
                "availability needs at least one non-empty url".into(),
            ));
        }

        let endpoint = self.resolve(target, cancel).await?;
        let session = self.connect(&endpoint, cancel).await?;
        let mut stream = cancellable(cancel, async {
            session.open_stream().await.map_err(PresentationError::from)
        })
        .await?;

        let request_id = self.next_request_id();
        let request = Message::UrlAvailabilityRequest(UrlAvailabilityRequest {
            request_id,
            urls: urls.to_vec(),
        });
        write_message(&request, &mut stream).await?;
        stream.finish()?;

        let response = self.await_response(&mut stream, cancel).await;
        session.close("availability request complete");

        match response? {
            Message::UrlAvailabilityResponse(response)
                if response.request_id == request_id
                    && response.availabilities.len() == urls.len() =>
            {
                Ok(response.availabilities)
            }
            other => Err(PresentationError::UnexpectedResponse(format!(
                "{} for request {} (expected url-availability-response for {} with {} entries)",
                other.name(),
                other.request_id(),
                request_id,
                urls.len()
            ))),
        }
    }

    async fn connect(
        &self,
        endpoint: &ServiceEndpoint,
        cancel: &CancellationToken,
    ) -> Result<QuicSession> {
        let addr = endpoint
            .socket_addr()
            .ok_or_else(|| PresentationError::Unreachable(endpoint.instance_name.clone()))?;

        let hostname = endpoint.hostname.trim_end_matches('.');
        let server_name = if hostname.is_empty() {
            addr.ip().to_string()
        } else {
            hostname.to_string()
        };

        cancellable(cancel, async {
            dial(addr, &server_name, &self.config.quic)
                .await
                .map_err(PresentationError::from)
        })
        .await
    }

    async fn await_response(
        &self,
        stream: &mut QuicStream,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        cancellable(cancel, async {
            match tokio::time::timeout(self.config.response_timeout, read_message(stream)).await {
                Ok(message) => message.map_err(PresentationError::from),
                Err(_) => Err(PresentationError::Timeout("response")),
            }
        })
        .await
    }
}

/// Run `fut` unless `cancel` fires first
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PresentationError::Cancelled),
        result = fut => result,
    }
}
