//! Receiver role: advertise, accept sessions, render requested URLs
//!
//! Every inbound session gets its own task, handshake included, and so does
//! every stream within it. A stream carries one request and its response; a
//! failure on one stream is logged and never reaches other streams, sessions,
//! or the accept loop.

use osp_core::{
    read_message, write_message, Message, PresentationStartRequest, PresentationStartResponse,
    ResultCode, UrlAvailability, UrlAvailabilityRequest, UrlAvailabilityResponse,
};
use osp_discovery::{Advertisement, ServiceDiscovery};
use osp_transport::{PendingSession, QuicListener, QuicStream, Session, TlsIdentity};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::ReceiverConfig;
use crate::error::{PresentationError, Result};

/// Presents URLs on the receiving device.
///
/// Any `Fn(&str)` closure is a renderer that treats http(s) URLs as
/// compatible.
pub trait Renderer: Send + Sync + 'static {
    /// Start presenting `url`
    fn render(&self, url: &str);

    /// Whether this renderer can present `url`
    fn availability(&self, url: &Url) -> UrlAvailability {
        match url.scheme() {
            "http" | "https" => UrlAvailability::Compatible,
            _ => UrlAvailability::NotCompatible,
        }
    }
}

impl<F> Renderer for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn render(&self, url: &str) {
        self(url)
    }
}

/// Handle to a running receiver
pub struct PresentationReceiver {
    instance_name: String,
    local_addr: SocketAddr,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PresentationReceiver {
    /// Bind, advertise the bound port, and start accepting senders.
    ///
    /// Runs until `token` is cancelled or [`shutdown`](Self::shutdown) is
    /// called. Dropping the handle does not stop the receiver.
    pub fn start<D, R>(
        config: ReceiverConfig,
        identity: &TlsIdentity,
        discovery: &D,
        renderer: R,
        token: &CancellationToken,
    ) -> Result<Self>
    where
        D: ServiceDiscovery + ?Sized,
        R: Renderer,
    {
        let token = token.child_token();
        let bind_addr = SocketAddr::new(config.bind_addr, config.port);
        let listener = QuicListener::bind(bind_addr, identity, &config.quic)?;
        let local_addr = listener.local_addr()?;

        let advertisement = match discovery.advertise(
            &config.instance_name,
            &config.service_type,
            local_addr.port(),
            &token,
        ) {
            Ok(advertisement) => advertisement,
            Err(e) => {
                listener.close();
                return Err(e.into());
            }
        };

        info!(
            "Receiver '{}' listening on {}",
            config.instance_name, local_addr
        );

        let renderer: Arc<dyn Renderer> = Arc::new(renderer);
        let task = tokio::spawn(accept_loop(
            listener,
            advertisement,
            renderer,
            token.clone(),
        ));

        Ok(Self {
            instance_name: config.instance_name,
            local_addr,
            token,
            task,
        })
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Withdraw the advertisement and stop accepting sessions and streams.
    /// Requests already being handled run to completion.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Wait for the accept loop to finish
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Receiver '{}' task failed: {}", self.instance_name, e);
        }
    }
}

async fn accept_loop(
    listener: QuicListener,
    advertisement: Advertisement,
    renderer: Arc<dyn Renderer>,
    token: CancellationToken,
) {
    loop {
        let incoming = tokio::select! {
            _ = token.cancelled() => break,
            incoming = listener.accept() => incoming,
        };

        match incoming {
            Some(pending) => {
                tokio::spawn(serve_session(pending, renderer.clone(), token.clone()));
            }
            None => break,
        }
    }

    // Dropping the listener refuses new sessions; streams already in flight
    // keep their connection alive until they finish.
    advertisement.stop();
    drop(listener);
    info!("Receiver '{}' stopped", advertisement.instance_name());
}

async fn serve_session(
    pending: PendingSession,
    renderer: Arc<dyn Renderer>,
    token: CancellationToken,
) {
    let remote = pending.remote_addr();

    let session = tokio::select! {
        _ = token.cancelled() => return,
        handshake = pending.handshake() => match handshake {
            Ok(session) => session,
            Err(e) => {
                warn!("Rejected inbound session: {}", e);
                return;
            }
        },
    };

    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = session.accept_stream() => accepted,
        };

        match accepted {
            Ok(Some(stream)) => {
                let renderer = renderer.clone();
                tokio::spawn(async move {
                    let id = stream.id();
                    match serve_stream(stream, renderer.as_ref()).await {
                        Ok(()) => {}
                        Err(PresentationError::Codec(e)) if e.is_malformed() => {
                            warn!("Malformed request on stream {} from {}: {}", id, remote, e);
                        }
                        Err(e) => warn!("Stream {} from {} failed: {}", id, remote, e),
                    }
                });
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Session with {} ended: {}", remote, e);
                break;
            }
        }
    }

    info!("Session with {} closed", remote);
}

async fn serve_stream(mut stream: QuicStream, renderer: &dyn Renderer) -> Result<()> {
    let request = read_message(&mut stream).await?;

    if let Some(response) = dispatch(request, renderer) {
        write_message(&response, &mut stream).await?;
        stream.finish()?;
    }
    Ok(())
}

/// Handle one request; `None` when the message warrants no answer
pub(crate) fn dispatch(message: Message, renderer: &dyn Renderer) -> Option<Message> {
    match message {
        Message::PresentationStartRequest(request) => Some(Message::PresentationStartResponse(
            start_presentation(request, renderer),
        )),
        Message::UrlAvailabilityRequest(request) => Some(Message::UrlAvailabilityResponse(
            url_availability(request, renderer),
        )),
        Message::PresentationStartResponse(_) | Message::UrlAvailabilityResponse(_) => {
            debug!("Ignoring {} sent to a receiver", message.name());
            None
        }
    }
}

fn start_presentation(
    request: PresentationStartRequest,
    renderer: &dyn Renderer,
) -> PresentationStartResponse {
    let result = match Url::parse(&request.url) {
        Ok(_) => {
            info!(
                "Starting presentation {} of {}",
                request.presentation_id, request.url
            );
            renderer.render(&request.url);
            ResultCode::Success
        }
        Err(e) => {
            warn!("Refusing presentation of '{}': {}", request.url, e);
            ResultCode::InvalidUrl
        }
    };

    PresentationStartResponse {
        request_id: request.request_id,
        result,
    }
}

fn url_availability(
    request: UrlAvailabilityRequest,
    renderer: &dyn Renderer,
) -> UrlAvailabilityResponse {
    let availabilities = request
        .urls
        .iter()
        .map(|url| match Url::parse(url) {
            Ok(parsed) => renderer.availability(&parsed),
            Err(_) => UrlAvailability::NotValid,
        })
        .collect();

    UrlAvailabilityResponse {
        request_id: request.request_id,
        availabilities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Renderer for Recorder {
        fn render(&self, url: &str) {
            self.0.lock().unwrap().push(url.to_string());
        }
    }

    fn start_request(url: &str) -> Message {
        Message::PresentationStartRequest(PresentationStartRequest {
            request_id: 3,
            presentation_id: "p".into(),
            url: url.into(),
        })
    }

    #[test]
    fn test_start_request_renders() {
        let recorder = Recorder::default();
        let response = dispatch(start_request("https://example.com"), &recorder);

        assert_eq!(
            response,
            Some(Message::PresentationStartResponse(PresentationStartResponse {
                request_id: 3,
                result: ResultCode::Success,
            }))
        );
        assert_eq!(*recorder.0.lock().unwrap(), vec!["https://example.com"]);
    }

    #[test]
    fn test_invalid_url_not_rendered() {
        let recorder = Recorder::default();
        let response = dispatch(start_request("not a url"), &recorder);

        assert!(matches!(
            response,
            Some(Message::PresentationStartResponse(PresentationStartResponse {
                result: ResultCode::InvalidUrl,
                ..
            }))
        ));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_availability_per_url() {
        let recorder = Recorder::default();
        let request = Message::UrlAvailabilityRequest(UrlAvailabilityRequest {
            request_id: 8,
            urls: vec![
                "https://example.com".into(),
                "ftp://example.com/file".into(),
                "::nope::".into(),
            ],
        });

        let response = dispatch(request, &recorder);
        assert_eq!(
            response,
            Some(Message::UrlAvailabilityResponse(UrlAvailabilityResponse {
                request_id: 8,
                availabilities: vec![
                    UrlAvailability::Compatible,
                    UrlAvailability::NotCompatible,
                    UrlAvailability::NotValid,
                ],
            }))
        );
    }

    #[test]
    fn test_responses_ignored() {
        let recorder = Recorder::default();
        let stray = Message::PresentationStartResponse(PresentationStartResponse {
            request_id: 1,
            result: ResultCode::Success,
        });
        assert_eq!(dispatch(stray, &recorder), None);
    }

    #[test]
    fn test_closure_renderer() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let renderer = move |url: &str| *sink.lock().unwrap() = Some(url.to_string());

        dispatch(start_request("http://tv.local/app"), &renderer);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("http://tv.local/app"));
    }
}
