//! OSP Presentation
//!
//! The two roles of the presentation protocol:
//! - Sender ("fling"): resolve a receiver by instance name, connect, send a
//!   start request and wait for the matching response
//! - Receiver: advertise, accept sessions and streams, render requested URLs
//!
//! Discovery is injected through [`osp_discovery::ServiceDiscovery`]; the
//! receiver's TLS identity is supplied by the caller.

pub mod config;
pub mod error;
pub mod receiver;
pub mod sender;

pub use config::{ControllerConfig, ReceiverConfig, DEFAULT_PORT};
pub use error::{PresentationError, Result};
pub use receiver::{PresentationReceiver, Renderer};
pub use sender::{FlingOutcome, FlingTrace, PresentationController, SenderState};
