use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Identity of a window within one browsing context group.
pub type WindowId = u64;

/// Payload of a posted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    Binary(Bytes),
    Text(String),
}

/// A message delivered to a window's message listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMessage {
    /// Origin of the posting window.
    pub origin: String,
    /// Identity of the posting window.
    pub source: WindowId,
    pub data: MessageData,
}

/// Handle to another window: the one we opened, or the one that opened us.
pub trait PeerWindow: Send + Sync + fmt::Debug {
    /// Identity of the window this handle points at.
    fn id(&self) -> WindowId;

    fn is_closed(&self) -> bool;

    fn focus(&self);

    fn close(&self);

    /// Post a binary message. Messages whose `target_origin` does not match
    /// the peer's origin are silently dropped, as the platform does.
    fn post_message(&self, data: Bytes, target_origin: &str) -> Result<()>;
}

/// The window a transport lives in.
pub trait WindowHost: Send + Sync {
    /// Whether window messaging exists in this environment.
    fn is_supported(&self) -> bool;

    /// This window's origin.
    fn origin(&self) -> String;

    /// The window that opened this one, if any.
    fn opener(&self) -> Option<Arc<dyn PeerWindow>>;

    /// Open `route` in the window called `name`, reusing it when it is
    /// already open.
    fn open(&self, route: &str, name: &str) -> Result<Arc<dyn PeerWindow>>;

    /// Subscribe to messages posted to this window.
    ///
    /// Dropping the receiver ends the subscription.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<WindowMessage>;
}
