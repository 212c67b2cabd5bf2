use std::time::Duration;

use tablelink_substrate::SubstrateError;
use tablelink_wire::WireError;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The substrate has no live connection to send on.
    #[error("channel is not connected")]
    NotConnected,

    /// The substrate does not exist in this environment.
    #[error("{0} is not supported in this environment")]
    Unsupported(&'static str),

    /// No compatible display appeared in time.
    #[error("no display became available within {0:?}")]
    HandshakeTimeout(Duration),

    /// No handler in the chain answered an inbound request.
    #[error("no handler for {0} request")]
    Unimplemented(&'static str),

    /// The substrate reported a failure.
    #[error("substrate failure: {0}")]
    Substrate(#[from] SubstrateError),

    /// A packet could not be decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The BLE device dropped its GATT connection.
    #[error("device disconnected")]
    DeviceDisconnected,

    /// The multiplexer has no display transport selected.
    #[error("no display channel selected")]
    NoChannelSelected,

    /// The channel was torn down while the request was in flight.
    #[error("request cancelled by disconnect")]
    Cancelled,

    /// A caller-imposed deadline passed.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// A request handler failed.
    #[error("request handler failed: {0}")]
    Handler(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
