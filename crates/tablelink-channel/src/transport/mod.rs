//! The three substrate-specific channels.

mod peripheral;
mod session;
mod window;

pub use peripheral::PeripheralTransport;
pub use session::SessionTransport;
pub use window::WindowTransport;

use std::sync::Arc;

use tablelink_wire::Request;
use tracing::{debug, warn};

use crate::router::{ChannelCore, PacketSink};

/// Greet the controller from a freshly connected display surface.
///
/// The controller's first received message completes its handshake, and the
/// `ack` completes ours.
fn send_hello(core: Arc<ChannelCore>, sink: Arc<dyn PacketSink>) {
    tokio::spawn(async move {
        match core.request(sink.as_ref(), Request::hello()).await {
            Ok(_) => debug!(channel = core.name(), "hello acknowledged"),
            Err(err) => warn!(channel = core.name(), error = %err, "hello failed"),
        }
    });
}
