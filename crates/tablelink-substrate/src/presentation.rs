use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::window::MessageData;

/// State of a presentation session as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Closed,
    Terminated,
}

/// Events a presentation session raises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connect,
    Close,
    Terminate,
    Message(MessageData),
}

/// One end of a presentation session.
pub trait PresentationConnection: Send + Sync + fmt::Debug {
    fn id(&self) -> String;

    fn state(&self) -> SessionState;

    /// Send a binary message to the other end.
    fn send(&self, data: Bytes) -> Result<()>;

    /// Subscribe to this end's events. Dropping the receiver unsubscribes.
    fn events(&self) -> mpsc::UnboundedReceiver<SessionEvent>;

    /// Close this end, keeping the presentation running.
    fn close(&self);

    /// End the presentation for both sides.
    fn terminate(&self);
}

/// The presentation API as seen from one browsing context.
#[async_trait]
pub trait PresentationApi: Send + Sync {
    /// Whether the presentation API exists in this environment.
    fn is_supported(&self) -> bool;

    /// Whether this context was launched as a presentation receiver.
    fn is_receiver(&self) -> bool;

    /// Connections this receiver context was launched with.
    async fn receiver_connections(&self) -> Result<Vec<Arc<dyn PresentationConnection>>>;

    /// Watch whether any display can present `url`.
    fn availability(&self, url: &str) -> Result<watch::Receiver<bool>>;

    /// Start presenting `url` and return the controller end of the session.
    async fn start(&self, url: &str) -> Result<Arc<dyn PresentationConnection>>;
}
