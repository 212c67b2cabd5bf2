//! Request/response channels for the tablelink display protocol.
//!
//! A [`Channel`] carries [`Packet`](tablelink_wire::Packet)s to one peer and
//! correlates responses with the requests that caused them. Three transports
//! implement it over the substrates in `tablelink-substrate`:
//! - [`WindowTransport`]: a display window opened by the controller
//! - [`SessionTransport`]: a presentation session on a second screen
//! - [`PeripheralTransport`]: the BLE marker tracker
//!
//! [`Multiplexer`] picks one display transport at a time and keeps the tracker
//! beside it; [`ConnectionOwner`] holds the single live multiplexer.

pub mod config;
pub mod consumer;
pub mod error;
pub mod handler;
mod link;
pub mod multiplexer;
pub mod owner;
pub mod router;
pub mod simulator;
pub mod state;
pub mod subscription;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tablelink_wire::{Request, Response};

pub use crate::config::{
    PeripheralConfig, SessionConfig, TransportConfig, WindowConfig, DISPLAY_ROUTE,
    TRACKER_NAME_PREFIX, TRACKER_NOTIFY_CHARACTERISTIC, TRACKER_SERVICE,
    TRACKER_WRITE_CHARACTERISTIC, WINDOW_NAME,
};
pub use crate::consumer::{RequestHandlerGuard, StateWatch};
pub use crate::error::{ChannelError, Result};
pub use crate::handler::{handler_fn, RequestHandler};
pub use crate::multiplexer::{DisplayKind, Multiplexer};
pub use crate::owner::ConnectionOwner;
pub use crate::router::{ChannelCore, PacketSink};
pub use crate::simulator::TrackerSimulator;
pub use crate::state::{ChannelState, Role};
pub use crate::subscription::Subscription;
pub use crate::transport::{PeripheralTransport, SessionTransport, WindowTransport};

/// Callback invoked with the channel's state after every observed transition.
pub type StateHandler = Arc<dyn Fn(ChannelState) + Send + Sync>;

/// A request/response link to one peer.
///
/// State is always derived from the underlying substrate objects; querying it
/// never performs IO.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn state(&self) -> ChannelState;

    /// Whether the substrate this channel rides on exists here.
    fn is_supported(&self) -> bool;

    fn role(&self) -> Role;

    /// Establish the link. Succeeds immediately when already connecting or
    /// connected.
    async fn connect(&self) -> Result<()>;

    /// Tear the link down and fail every in-flight request. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Send `request` under a fresh request id and wait for its response.
    ///
    /// There is no built-in deadline; see [`Channel::request_with_timeout`].
    async fn request(&self, request: Request) -> Result<Response>;

    /// [`Channel::request`] bounded by `timeout`. On expiry the pending entry
    /// is dropped and a late response is discarded.
    async fn request_with_timeout(&self, request: Request, timeout: Duration) -> Result<Response> {
        match tokio::time::timeout(timeout, self.request(request)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::RequestTimeout(timeout)),
        }
    }

    fn add_connection_state_change_handler(&self, handler: StateHandler) -> Subscription;

    /// Append a handler to the request handler chain.
    fn add_request_handler(&self, handler: Arc<dyn RequestHandler>) -> Subscription;
}
