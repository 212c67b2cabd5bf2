use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tablelink_substrate::{MessageData, PeerWindow, WindowHost, WindowMessage};
use tablelink_wire::{decode_packet, encode_packet, Packet, Request, Response};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::send_hello;
use crate::config::WindowConfig;
use crate::error::{ChannelError, Result};
use crate::handler::RequestHandler;
use crate::link::LinkSlot;
use crate::router::{ChannelCore, PacketSink};
use crate::state::{ChannelState, Role};
use crate::subscription::Subscription;
use crate::{Channel, StateHandler};

/// Channel to a display window over cross-window messaging.
///
/// The controller opens the display route in a named window; the display,
/// finding an opener, adopts it. Either side is connected once it has
/// received a message from the other.
pub struct WindowTransport {
    inner: Arc<WindowInner>,
}

struct WindowInner {
    core: Arc<ChannelCore>,
    host: Arc<dyn WindowHost>,
    config: WindowConfig,
    link: LinkSlot<WindowLink>,
}

struct WindowLink {
    peer: Arc<dyn PeerWindow>,
    handshake: Arc<AtomicBool>,
    cancel: CancellationToken,
    /// Only the side that opened the window closes it.
    owns_peer: bool,
}

impl WindowTransport {
    pub fn new(host: Arc<dyn WindowHost>, config: WindowConfig) -> Self {
        Self {
            inner: Arc::new(WindowInner {
                core: ChannelCore::new("window"),
                host,
                config,
                link: LinkSlot::new(),
            }),
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.inner.config
    }
}

impl WindowInner {
    fn role(&self) -> Role {
        if self.host.opener().is_some() {
            Role::Receiver
        } else {
            Role::Sender
        }
    }

    fn state(&self) -> ChannelState {
        self.link.with(|link| match link {
            None => ChannelState::Disconnected,
            Some(link) if link.peer.is_closed() => ChannelState::Disconnected,
            Some(link) if link.handshake.load(Ordering::SeqCst) => ChannelState::Connected,
            Some(_) => ChannelState::Connecting,
        })
    }

    fn peer_for(&self, role: Role) -> Result<Arc<dyn PeerWindow>> {
        match role {
            Role::Receiver => self.host.opener().ok_or(ChannelError::NotConnected),
            Role::Sender => {
                let peer = self
                    .host
                    .open(&self.config.route, &self.config.window_name)?;
                peer.focus();
                Ok(peer)
            }
        }
    }

    fn release(&self, link: WindowLink) {
        link.cancel.cancel();
        if link.owns_peer && !link.peer.is_closed() {
            link.peer.close();
        }
        self.core.cancel_pending();
    }

    /// Teardown triggered from the pump. Ignored if the link was replaced.
    fn teardown(&self, epoch: u64, reason: &'static str) {
        if let Some(link) = self.link.take_if(epoch) {
            info!(reason, "window link lost");
            self.release(link);
            self.core.notify_state(self.state());
        }
    }

    fn accept(&self, peer: &dyn PeerWindow, message: WindowMessage) -> Option<bytes::Bytes> {
        if message.origin != self.host.origin() {
            debug!(origin = %message.origin, "ignoring message from foreign origin");
            return None;
        }
        if message.source != peer.id() {
            debug!(source = message.source, "ignoring message from unrelated window");
            return None;
        }
        match message.data {
            MessageData::Binary(data) => Some(data),
            MessageData::Text(_) => {
                debug!("ignoring non-binary window message");
                None
            }
        }
    }

    fn on_message(
        self: &Arc<Self>,
        peer: &dyn PeerWindow,
        handshake: &AtomicBool,
        message: WindowMessage,
    ) {
        let Some(data) = self.accept(peer, message) else {
            return;
        };
        let packet = match decode_packet(data) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(error = %err, "dropping undecodable window message");
                return;
            }
        };
        if !handshake.swap(true, Ordering::SeqCst) {
            info!("window peer answered");
            self.core.notify_state(ChannelState::Connected);
        }
        self.core.dispatch(packet, self.clone());
    }
}

async fn pump(
    inner: Arc<WindowInner>,
    epoch: u64,
    mut inbox: mpsc::UnboundedReceiver<WindowMessage>,
    peer: Arc<dyn PeerWindow>,
    handshake: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut liveness = tokio::time::interval(inner.config.liveness_poll_interval);
    liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = inbox.recv() => match message {
                Some(message) => inner.on_message(peer.as_ref(), &handshake, message),
                None => break,
            },
            _ = liveness.tick() => {
                if peer.is_closed() {
                    inner.teardown(epoch, "peer window closed");
                    break;
                }
            }
        }
    }
    debug!(epoch, "window pump stopped");
}

#[async_trait]
impl PacketSink for WindowInner {
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let peer = self
            .link
            .with(|link| link.map(|link| link.peer.clone()))
            .ok_or(ChannelError::NotConnected)?;
        if peer.is_closed() {
            return Err(ChannelError::NotConnected);
        }
        peer.post_message(encode_packet(packet), &self.host.origin())?;
        Ok(())
    }
}

#[async_trait]
impl Channel for WindowTransport {
    fn name(&self) -> &'static str {
        "window"
    }

    fn state(&self) -> ChannelState {
        self.inner.state()
    }

    fn is_supported(&self) -> bool {
        self.inner.host.is_supported()
    }

    fn role(&self) -> Role {
        self.inner.role()
    }

    async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.host.is_supported() {
            return Err(ChannelError::Unsupported("window messaging"));
        }
        let role = inner.role();
        let state = inner.state();
        if state.is_live() {
            if role == Role::Sender {
                if let Some(peer) = inner.link.with(|link| link.map(|link| link.peer.clone())) {
                    peer.focus();
                }
            }
            inner.core.notify_state(state);
            return Ok(());
        }

        let peer = match inner.peer_for(role) {
            Ok(peer) => peer,
            Err(err) => {
                warn!(%role, error = %err, "window connect failed");
                inner.core.notify_state(inner.state());
                return Err(err);
            }
        };

        let inbox = inner.host.subscribe();
        let handshake = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let (epoch, stale) = inner.link.install(WindowLink {
            peer: peer.clone(),
            handshake: handshake.clone(),
            cancel: cancel.clone(),
            owns_peer: role == Role::Sender,
        });
        if let Some(stale) = stale {
            inner.release(stale);
        }
        tokio::spawn(pump(inner.clone(), epoch, inbox, peer, handshake, cancel));

        info!(%role, epoch, "window link opened");
        inner.core.notify_state(inner.state());
        if role == Role::Receiver {
            send_hello(inner.core.clone(), inner.clone());
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(link) = self.inner.link.take() {
            info!("window link closed");
            self.inner.release(link);
        }
        self.inner.core.notify_state(self.inner.state());
        Ok(())
    }

    async fn request(&self, request: Request) -> Result<Response> {
        self.inner.core.request(self.inner.as_ref(), request).await
    }

    fn add_connection_state_change_handler(&self, handler: StateHandler) -> Subscription {
        self.inner.core.add_state_handler(handler)
    }

    fn add_request_handler(&self, handler: Arc<dyn RequestHandler>) -> Subscription {
        self.inner.core.add_request_handler(handler)
    }
}
