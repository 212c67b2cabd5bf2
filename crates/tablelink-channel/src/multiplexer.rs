//! Display channel selection.
//!
//! The controller can reach the table display through a presentation session
//! or a window. The [`Multiplexer`] owns one transport of each kind, forwards
//! the [`Channel`] contract to whichever is selected and keeps the tracker
//! transport alongside.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tablelink_substrate::{Bluetooth, PresentationApi, WindowHost};
use tablelink_wire::{Request, Response};
use tracing::{info, warn};

use crate::config::TransportConfig;
use crate::error::{ChannelError, Result};
use crate::handler::RequestHandler;
use crate::link::{lock, BusyGuard};
use crate::state::{ChannelState, Role};
use crate::subscription::Subscription;
use crate::transport::{PeripheralTransport, SessionTransport, WindowTransport};
use crate::{Channel, StateHandler};

/// The display transports a [`Multiplexer`] can switch between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayKind {
    Session,
    Window,
}

impl DisplayKind {
    /// Preference order: a second screen first, then a window.
    pub const ALL: [DisplayKind; 2] = [DisplayKind::Session, DisplayKind::Window];

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayKind::Session => "session",
            DisplayKind::Window => "window",
        }
    }

    fn index(self) -> usize {
        match self {
            DisplayKind::Session => 0,
            DisplayKind::Window => 1,
        }
    }
}

impl fmt::Display for DisplayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routes the [`Channel`] contract to the selected display transport.
pub struct Multiplexer {
    /// Indexed by [`DisplayKind::index`].
    displays: [Arc<dyn Channel>; 2],
    tracker: Arc<dyn Channel>,
    current: Arc<Mutex<Option<DisplayKind>>>,
    /// Serialises [`Multiplexer::use_channel`].
    switch: tokio::sync::Mutex<()>,
    /// Set while the previous display is being disconnected.
    switching: AtomicBool,
}

impl Multiplexer {
    /// Build a multiplexer over existing transports.
    ///
    /// A context opened or launched as a display surface selects its
    /// transport immediately: window first, then session.
    pub fn new(
        session: Arc<dyn Channel>,
        window: Arc<dyn Channel>,
        tracker: Arc<dyn Channel>,
    ) -> Self {
        let current = if window.is_supported() && window.role() == Role::Receiver {
            Some(DisplayKind::Window)
        } else if session.is_supported() && session.role() == Role::Receiver {
            Some(DisplayKind::Session)
        } else {
            None
        };
        if let Some(kind) = current {
            info!(display = %kind, "display surface selected its transport");
        }
        Self {
            displays: [session, window],
            tracker,
            current: Arc::new(Mutex::new(current)),
            switch: tokio::sync::Mutex::new(()),
            switching: AtomicBool::new(false),
        }
    }

    /// Build the standard transports over the given substrates.
    pub fn with_substrates(
        presentation: Arc<dyn PresentationApi>,
        window_host: Arc<dyn WindowHost>,
        bluetooth: Arc<dyn Bluetooth>,
        config: TransportConfig,
    ) -> Self {
        Self::new(
            Arc::new(SessionTransport::new(presentation, config.session)),
            Arc::new(WindowTransport::new(window_host, config.window)),
            Arc::new(PeripheralTransport::new(bluetooth, config.peripheral)),
        )
    }

    /// Display kinds usable here, in preference order.
    pub fn supported_channels(&self) -> Vec<DisplayKind> {
        DisplayKind::ALL
            .into_iter()
            .filter(|kind| self.display(*kind).is_supported())
            .collect()
    }

    /// Select `preference` when it is usable, otherwise the first supported
    /// kind. Returns the selection, or `None` when nothing is supported.
    pub async fn select_preferred(&self, preference: Option<DisplayKind>) -> Option<DisplayKind> {
        let supported = self.supported_channels();
        let chosen = preference
            .filter(|kind| supported.contains(kind))
            .or_else(|| supported.first().copied());
        match chosen {
            Some(kind) => {
                self.use_channel(kind).await;
                Some(kind)
            }
            None => {
                warn!("no display channel is supported here");
                None
            }
        }
    }

    /// Make `kind` the current display transport.
    ///
    /// A different previous transport is disconnected, and the switch waits
    /// for that to finish before the new one becomes current.
    pub async fn use_channel(&self, kind: DisplayKind) {
        let _switch = self.switch.lock().await;
        let previous = self.current();
        if previous == Some(kind) {
            return;
        }
        if let Some(previous) = previous {
            let _switching = BusyGuard::set(&self.switching);
            info!(from = %previous, to = %kind, "switching display channel");
            if let Err(err) = self.display(previous).disconnect().await {
                warn!(display = %previous, error = %err, "previous display did not disconnect cleanly");
            }
        } else {
            info!(display = %kind, "display channel selected");
        }
        *lock(&self.current) = Some(kind);
    }

    pub fn current(&self) -> Option<DisplayKind> {
        *lock(&self.current)
    }

    pub fn display(&self, kind: DisplayKind) -> &Arc<dyn Channel> {
        &self.displays[kind.index()]
    }

    pub fn tracker(&self) -> &Arc<dyn Channel> {
        &self.tracker
    }

    /// Disconnect the current display and the tracker.
    pub async fn shutdown(&self) {
        let current = self.current().map(|kind| (kind.as_str(), self.display(kind).clone()));
        let targets = current
            .into_iter()
            .chain(std::iter::once(("tracker", self.tracker.clone())));
        for (name, channel) in targets {
            if channel.state() == ChannelState::Disconnected {
                continue;
            }
            if let Err(err) = channel.disconnect().await {
                warn!(channel = name, error = %err, "disconnect during shutdown failed");
            }
        }
    }

    fn current_channel(&self) -> Option<Arc<dyn Channel>> {
        self.current().map(|kind| self.display(kind).clone())
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("current", &self.current())
            .field("state", &self.state())
            .field("tracker", &self.tracker.state())
            .finish()
    }
}

#[async_trait]
impl Channel for Multiplexer {
    fn name(&self) -> &'static str {
        "multiplexer"
    }

    fn state(&self) -> ChannelState {
        if self.switching.load(Ordering::SeqCst) {
            return ChannelState::Disconnecting;
        }
        self.current_channel()
            .map_or(ChannelState::Disconnected, |channel| channel.state())
    }

    fn is_supported(&self) -> bool {
        self.displays.iter().any(|display| display.is_supported())
    }

    fn role(&self) -> Role {
        self.current_channel()
            .map_or(Role::Sender, |channel| channel.role())
    }

    async fn connect(&self) -> Result<()> {
        let channel = self.current_channel().ok_or(ChannelError::NoChannelSelected)?;
        channel.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        match self.current_channel() {
            Some(channel) => channel.disconnect().await,
            None => Ok(()),
        }
    }

    async fn request(&self, request: Request) -> Result<Response> {
        let channel = self.current_channel().ok_or(ChannelError::NoChannelSelected)?;
        channel.request(request).await
    }

    /// Registers on every display; only the current display's transitions
    /// reach `handler`.
    fn add_connection_state_change_handler(&self, handler: StateHandler) -> Subscription {
        Subscription::merge(DisplayKind::ALL.into_iter().map(|kind| {
            let current = self.current.clone();
            let handler = handler.clone();
            self.display(kind)
                .add_connection_state_change_handler(Arc::new(move |state| {
                    if *lock(&current) == Some(kind) {
                        handler(state);
                    }
                }))
        }))
    }

    fn add_request_handler(&self, handler: Arc<dyn RequestHandler>) -> Subscription {
        Subscription::merge(
            self.displays
                .iter()
                .map(|display| display.add_request_handler(handler.clone())),
        )
    }
}
