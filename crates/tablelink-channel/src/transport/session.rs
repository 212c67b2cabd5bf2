use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tablelink_substrate::{
    MessageData, PresentationApi, PresentationConnection, SessionEvent, SessionState,
    SubstrateError,
};
use tablelink_wire::{decode_packet, encode_packet, Packet, Request, Response};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::send_hello;
use crate::config::SessionConfig;
use crate::error::{ChannelError, Result};
use crate::handler::RequestHandler;
use crate::link::{BusyGuard, LinkSlot};
use crate::router::{ChannelCore, PacketSink};
use crate::state::{ChannelState, Role};
use crate::subscription::Subscription;
use crate::{Channel, StateHandler};

/// Channel to a second-screen display over a presentation session.
///
/// The controller waits for a compatible display and starts a session on the
/// display route; a context launched as presentation receiver adopts the
/// session it was started with.
pub struct SessionTransport {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    core: Arc<ChannelCore>,
    api: Arc<dyn PresentationApi>,
    config: SessionConfig,
    link: LinkSlot<SessionLink>,
    /// Set while waiting for availability and starting a session.
    starting: AtomicBool,
}

struct SessionLink {
    connection: Arc<dyn PresentationConnection>,
    first_message: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SessionTransport {
    pub fn new(api: Arc<dyn PresentationApi>, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                core: ChannelCore::new("session"),
                api,
                config,
                link: LinkSlot::new(),
                starting: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

impl SessionInner {
    fn role(&self) -> Role {
        if self.api.is_receiver() {
            Role::Receiver
        } else {
            Role::Sender
        }
    }

    fn state(&self) -> ChannelState {
        let starting = self.starting.load(Ordering::SeqCst);
        self.link.with(|link| match link {
            Some(link) => match link.connection.state() {
                SessionState::Connected if link.first_message.load(Ordering::SeqCst) => {
                    ChannelState::Connected
                }
                SessionState::Connecting | SessionState::Connected => ChannelState::Connecting,
                SessionState::Closed | SessionState::Terminated if starting => {
                    ChannelState::Connecting
                }
                SessionState::Closed | SessionState::Terminated => ChannelState::Disconnected,
            },
            None if starting => ChannelState::Connecting,
            None => ChannelState::Disconnected,
        })
    }

    /// Adopt the session this receiver context was launched with.
    async fn adopt(&self) -> Result<Arc<dyn PresentationConnection>> {
        let connections = self.api.receiver_connections().await?;
        connections
            .into_iter()
            .next()
            .ok_or(ChannelError::Substrate(SubstrateError::NoReceiverConnection))
    }

    /// Wait for a display to become available, then start a session on it.
    async fn start(&self) -> Result<Arc<dyn PresentationConnection>> {
        let _starting = BusyGuard::set(&self.starting);
        self.core.notify_state(ChannelState::Connecting);

        let timeout = self.config.availability_timeout;
        let mut availability = self.api.availability(&self.config.route)?;
        let available = tokio::time::timeout(timeout, availability.wait_for(|available| *available))
            .await
            .map(|seen| seen.is_ok());
        match available {
            Err(_) => return Err(ChannelError::HandshakeTimeout(timeout)),
            Ok(false) => {
                return Err(SubstrateError::Closed("presentation availability").into());
            }
            Ok(true) => {}
        }

        let connection = self.api.start(&self.config.route).await?;
        Ok(connection)
    }

    fn release(&self, link: SessionLink, end_session: bool) {
        link.cancel.cancel();
        if end_session {
            link.connection.terminate();
            link.connection.close();
        }
        self.core.cancel_pending();
    }

    /// Teardown triggered from the pump. Ignored if the link was replaced.
    fn teardown(&self, epoch: u64, reason: &'static str) {
        if let Some(link) = self.link.take_if(epoch) {
            info!(reason, session = %link.connection.id(), "presentation session lost");
            self.release(link, false);
            self.core.notify_state(self.state());
        }
    }

    /// Send the receiver's hello once the session itself is connected. Runs
    /// at most once per link.
    fn greet_if_ready(
        self: &Arc<Self>,
        connection: &dyn PresentationConnection,
        greeted: &AtomicBool,
    ) {
        if self.role() != Role::Receiver || connection.state() != SessionState::Connected {
            return;
        }
        if !greeted.swap(true, Ordering::SeqCst) {
            send_hello(self.core.clone(), self.clone());
        }
    }

    fn on_message(self: &Arc<Self>, first_message: &AtomicBool, data: MessageData) {
        let data = match data {
            MessageData::Binary(data) => data,
            MessageData::Text(text) => {
                warn!(len = text.len(), "ignoring non-binary session message");
                return;
            }
        };
        if !first_message.swap(true, Ordering::SeqCst) {
            info!("presentation peer answered");
            self.core.notify_state(self.state());
        }
        match decode_packet(data) {
            Ok(packet) => self.core.dispatch(packet, self.clone()),
            Err(err) => warn!(error = %err, "dropping undecodable session message"),
        }
    }
}

async fn pump(
    inner: Arc<SessionInner>,
    epoch: u64,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    connection: Arc<dyn PresentationConnection>,
    first_message: Arc<AtomicBool>,
    greeted: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(SessionEvent::Message(data)) => inner.on_message(&first_message, data),
                Some(SessionEvent::Connect) => {
                    debug!("presentation session connected");
                    inner.core.notify_state(inner.state());
                    inner.greet_if_ready(connection.as_ref(), &greeted);
                }
                Some(SessionEvent::Close) => {
                    inner.teardown(epoch, "session closed");
                    break;
                }
                Some(SessionEvent::Terminate) => {
                    inner.teardown(epoch, "session terminated");
                    break;
                }
                None => break,
            },
        }
    }
    debug!(epoch, "session pump stopped");
}

#[async_trait]
impl PacketSink for SessionInner {
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let connection = self
            .link
            .with(|link| link.map(|link| link.connection.clone()))
            .ok_or(ChannelError::NotConnected)?;
        // The first-message gate is not required here, or the hello that
        // opens it could never be sent.
        if connection.state() != SessionState::Connected {
            return Err(ChannelError::NotConnected);
        }
        connection.send(encode_packet(packet))?;
        Ok(())
    }
}

#[async_trait]
impl Channel for SessionTransport {
    fn name(&self) -> &'static str {
        "session"
    }

    fn state(&self) -> ChannelState {
        self.inner.state()
    }

    fn is_supported(&self) -> bool {
        self.inner.api.is_supported()
    }

    fn role(&self) -> Role {
        self.inner.role()
    }

    async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.api.is_supported() {
            return Err(ChannelError::Unsupported("presentation API"));
        }
        let state = inner.state();
        if state.is_live() {
            inner.core.notify_state(state);
            return Ok(());
        }

        let role = inner.role();
        let connection = match role {
            Role::Receiver => inner.adopt().await,
            Role::Sender => inner.start().await,
        };
        let connection = match connection {
            Ok(connection) => connection,
            Err(err) => {
                warn!(%role, error = %err, "presentation connect failed");
                inner.core.notify_state(inner.state());
                return Err(err);
            }
        };

        let events = connection.events();
        let first_message = Arc::new(AtomicBool::new(false));
        let greeted = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let session_id = connection.id();
        let (epoch, stale) = inner.link.install(SessionLink {
            connection: connection.clone(),
            first_message: first_message.clone(),
            cancel: cancel.clone(),
        });
        if let Some(stale) = stale {
            inner.release(stale, false);
        }
        tokio::spawn(pump(
            inner.clone(),
            epoch,
            events,
            connection.clone(),
            first_message,
            greeted.clone(),
            cancel,
        ));

        info!(%role, session = %session_id, "presentation session attached");
        inner.core.notify_state(inner.state());
        // A session still connecting is greeted from the pump on `Connect`.
        inner.greet_if_ready(connection.as_ref(), &greeted);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(link) = self.inner.link.take() {
            info!(session = %link.connection.id(), "presentation session ended");
            self.inner.release(link, true);
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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tablelink_substrate::memory::{MemoryPresentation, MemoryPresentationService};
    use tablelink_wire::{GetTableConfigurationResponse, Resolution};

    use super::*;
    use crate::handler::handler_fn;

    fn fast_config() -> SessionConfig {
        SessionConfig::default().with_availability_timeout(Duration::from_millis(50))
    }

    async fn wait_for_state(channel: &dyn Channel, state: ChannelState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while channel.state() != state {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("channel should reach the expected state");
    }

    async fn connected_pair(
        service: &MemoryPresentationService,
    ) -> (SessionTransport, SessionTransport) {
        service.set_available(true);
        let controller = SessionTransport::new(Arc::new(service.controller()), fast_config());
        controller.connect().await.expect("controller should connect");
        assert_eq!(controller.state(), ChannelState::Connecting);

        let display = SessionTransport::new(Arc::new(service.receiver()), fast_config());
        assert_eq!(display.role(), Role::Receiver);
        display.connect().await.expect("display should connect");

        wait_for_state(&controller, ChannelState::Connected).await;
        wait_for_state(&display, ChannelState::Connected).await;
        (controller, display)
    }

    #[tokio::test]
    async fn first_message_gates_connected() {
        let service = MemoryPresentationService::new();
        let (controller, display) = connected_pair(&service).await;

        let _config = display.add_request_handler(handler_fn(|request| {
            Ok(match request {
                Request::GetTableConfiguration(_) => {
                    Some(Response::GetTableConfiguration(GetTableConfigurationResponse {
                        resolution: Some(Resolution {
                            width: 1920,
                            height: 1080,
                        }),
                        size: 32.0,
                        play_audio_on_table: false,
                    }))
                }
                _ => None,
            })
        }));
        let response = controller
            .request(Request::GetTableConfiguration(Default::default()))
            .await
            .unwrap();
        assert!(matches!(response, Response::GetTableConfiguration(_)));
    }

    #[tokio::test]
    async fn receiver_greets_once_session_connects() {
        let service = MemoryPresentationService::new();
        service.set_available(true);
        service.set_connect_on_start(false);
        let controller = SessionTransport::new(Arc::new(service.controller()), fast_config());
        controller.connect().await.expect("controller should connect");

        let display = SessionTransport::new(Arc::new(service.receiver()), fast_config());
        display.connect().await.expect("display should adopt a connecting session");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(display.state(), ChannelState::Connecting);
        assert_eq!(controller.state(), ChannelState::Connecting);

        let receiver_end = service.latest_receiver_session().unwrap();
        assert!(receiver_end.establish());

        wait_for_state(&controller, ChannelState::Connected).await;
        wait_for_state(&display, ChannelState::Connected).await;
    }

    #[tokio::test]
    async fn availability_wait_times_out() {
        let service = MemoryPresentationService::new();
        let controller = SessionTransport::new(Arc::new(service.controller()), fast_config());

        let result = controller.connect().await;
        assert!(matches!(result, Err(ChannelError::HandshakeTimeout(_))));
        assert_eq!(controller.state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn availability_arriving_late_still_connects() {
        let service = MemoryPresentationService::new();
        let controller = SessionTransport::new(
            Arc::new(service.controller()),
            SessionConfig::default().with_availability_timeout(Duration::from_secs(2)),
        );
        let later = service.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            later.set_available(true);
        });

        controller.connect().await.unwrap();
        assert_eq!(controller.state(), ChannelState::Connecting);
    }

    #[tokio::test]
    async fn receiver_without_session_fails() {
        let service = MemoryPresentationService::new();
        let display = SessionTransport::new(Arc::new(service.receiver()), fast_config());
        let result = display.connect().await;
        assert!(matches!(
            result,
            Err(ChannelError::Substrate(SubstrateError::NoReceiverConnection))
        ));
        assert_eq!(display.state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn text_messages_do_not_open_the_gate() {
        let service = MemoryPresentationService::new();
        service.set_available(true);
        let controller = SessionTransport::new(Arc::new(service.controller()), fast_config());
        controller.connect().await.unwrap();

        let receiver_end = service.latest_receiver_session().unwrap();
        receiver_end.send_text("{\"hello\":{}}").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.state(), ChannelState::Connecting);
    }

    #[tokio::test]
    async fn peer_termination_tears_down_and_notifies() {
        let service = MemoryPresentationService::new();
        let (controller, display) = connected_pair(&service).await;
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let _watch = {
            let seen = seen.clone();
            controller.add_connection_state_change_handler(Arc::new(move |state| {
                seen.lock().unwrap().push(state);
            }))
        };

        display.disconnect().await.unwrap();
        wait_for_state(&controller, ChannelState::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(seen.lock().unwrap().contains(&ChannelState::Disconnected));

        let result = controller.request(Request::hello()).await;
        assert!(matches!(result, Err(ChannelError::NotConnected)));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let service = MemoryPresentationService::new();
        let (controller, _display) = connected_pair(&service).await;
        controller.disconnect().await.unwrap();
        controller.disconnect().await.unwrap();
        assert_eq!(controller.state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn unsupported_api() {
        let controller =
            SessionTransport::new(Arc::new(MemoryPresentation::unsupported()), fast_config());
        assert!(!controller.is_supported());
        assert!(matches!(
            controller.connect().await,
            Err(ChannelError::Unsupported(_))
        ));
    }
}
