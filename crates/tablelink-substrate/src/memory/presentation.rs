use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::{lock, Listeners};
use crate::error::{Result, SubstrateError};
use crate::presentation::{PresentationApi, PresentationConnection, SessionEvent, SessionState};
use crate::window::MessageData;

const CONTROLLER: usize = 0;
const RECEIVER: usize = 1;

/// A second-screen display reachable through the presentation API.
///
/// Hand [`MemoryPresentationService::controller`] to the controlling side and
/// [`MemoryPresentationService::receiver`] to the display side.
#[derive(Clone)]
pub struct MemoryPresentationService {
    shared: Arc<Service>,
}

struct Service {
    available: watch::Sender<bool>,
    receiver_sessions: Mutex<Vec<MemorySession>>,
    next_id: AtomicU64,
    /// When false, new sessions stay `Connecting` until [`MemorySession::establish`].
    connect_on_start: AtomicBool,
}

impl Default for MemoryPresentationService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPresentationService {
    /// A service with no display available yet.
    pub fn new() -> Self {
        let (available, _) = watch::channel(false);
        Self {
            shared: Arc::new(Service {
                available,
                receiver_sessions: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                connect_on_start: AtomicBool::new(true),
            }),
        }
    }

    /// Mark a compatible display as present or gone.
    pub fn set_available(&self, available: bool) {
        self.shared.available.send_replace(available);
    }

    /// Choose whether sessions are connected as soon as they start, or held
    /// in `Connecting` until [`MemorySession::establish`] is called.
    pub fn set_connect_on_start(&self, connect: bool) {
        self.shared.connect_on_start.store(connect, Ordering::SeqCst);
    }

    pub fn controller(&self) -> MemoryPresentation {
        MemoryPresentation {
            service: Some(self.shared.clone()),
            receiver: false,
        }
    }

    pub fn receiver(&self) -> MemoryPresentation {
        MemoryPresentation {
            service: Some(self.shared.clone()),
            receiver: true,
        }
    }

    /// The receiver end of the most recently started session.
    pub fn latest_receiver_session(&self) -> Option<MemorySession> {
        lock(&self.shared.receiver_sessions).last().cloned()
    }
}

/// One browsing context's view of a [`MemoryPresentationService`].
#[derive(Clone)]
pub struct MemoryPresentation {
    service: Option<Arc<Service>>,
    receiver: bool,
}

impl MemoryPresentation {
    /// A context without the presentation API.
    pub fn unsupported() -> Self {
        Self {
            service: None,
            receiver: false,
        }
    }

    fn service(&self) -> Result<&Arc<Service>> {
        self.service
            .as_ref()
            .ok_or(SubstrateError::Unsupported("presentation API"))
    }
}

#[async_trait]
impl PresentationApi for MemoryPresentation {
    fn is_supported(&self) -> bool {
        self.service.is_some()
    }

    fn is_receiver(&self) -> bool {
        self.receiver && self.service.is_some()
    }

    async fn receiver_connections(&self) -> Result<Vec<Arc<dyn PresentationConnection>>> {
        let service = self.service()?;
        if !self.receiver {
            return Err(SubstrateError::Unsupported("presentation receiver"));
        }
        let sessions = lock(&service.receiver_sessions);
        Ok(sessions
            .iter()
            .filter(|session| {
                matches!(
                    session.state(),
                    SessionState::Connecting | SessionState::Connected
                )
            })
            .map(|session| Arc::new(session.clone()) as Arc<dyn PresentationConnection>)
            .collect())
    }

    fn availability(&self, _url: &str) -> Result<watch::Receiver<bool>> {
        Ok(self.service()?.available.subscribe())
    }

    async fn start(&self, url: &str) -> Result<Arc<dyn PresentationConnection>> {
        let service = self.service()?;
        if !*service.available.borrow() {
            return Err(SubstrateError::StartFailed {
                url: url.to_string(),
                reason: "no display available".to_string(),
            });
        }

        let state = if service.connect_on_start.load(Ordering::SeqCst) {
            SessionState::Connected
        } else {
            SessionState::Connecting
        };
        let pair = Arc::new(Pair {
            id: format!("session-{}", service.next_id.fetch_add(1, Ordering::Relaxed)),
            state: Mutex::new(state),
            listeners: [Listeners::new(), Listeners::new()],
        });
        debug!(session = %pair.id, url, "presentation session started");

        lock(&service.receiver_sessions).push(MemorySession {
            pair: pair.clone(),
            side: RECEIVER,
        });
        Ok(Arc::new(MemorySession {
            pair,
            side: CONTROLLER,
        }))
    }
}

struct Pair {
    id: String,
    state: Mutex<SessionState>,
    listeners: [Listeners<SessionEvent>; 2],
}

impl Pair {
    fn broadcast_both(&self, event: SessionEvent) {
        for listeners in &self.listeners {
            listeners.broadcast(event.clone());
        }
    }
}

/// One end of an in-memory presentation session.
#[derive(Clone)]
pub struct MemorySession {
    pair: Arc<Pair>,
    side: usize,
}

impl MemorySession {
    /// Send a text message to the other end.
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send_data(MessageData::Text(text.to_string()))
    }

    /// Move a `Connecting` session to `Connected` and raise `Connect` on both
    /// ends. Returns false if the session was not connecting.
    pub fn establish(&self) -> bool {
        {
            let mut state = lock(&self.pair.state);
            if *state != SessionState::Connecting {
                return false;
            }
            *state = SessionState::Connected;
        }
        debug!(session = %self.pair.id, "presentation session established");
        self.pair.broadcast_both(SessionEvent::Connect);
        true
    }

    fn send_data(&self, data: MessageData) -> Result<()> {
        if *lock(&self.pair.state) != SessionState::Connected {
            return Err(SubstrateError::Closed("presentation session"));
        }
        self.pair.listeners[1 - self.side].broadcast(SessionEvent::Message(data));
        Ok(())
    }
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.pair.id)
            .field("side", &self.side)
            .finish()
    }
}

impl PresentationConnection for MemorySession {
    fn id(&self) -> String {
        self.pair.id.clone()
    }

    fn state(&self) -> SessionState {
        *lock(&self.pair.state)
    }

    fn send(&self, data: Bytes) -> Result<()> {
        self.send_data(MessageData::Binary(data))
    }

    fn events(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.pair.listeners[self.side].subscribe()
    }

    fn close(&self) {
        {
            let mut state = lock(&self.pair.state);
            if !matches!(*state, SessionState::Connecting | SessionState::Connected) {
                return;
            }
            *state = SessionState::Closed;
        }
        debug!(session = %self.pair.id, "presentation session closed");
        self.pair.broadcast_both(SessionEvent::Close);
    }

    fn terminate(&self) {
        {
            let mut state = lock(&self.pair.state);
            if *state == SessionState::Terminated {
                return;
            }
            *state = SessionState::Terminated;
        }
        debug!(session = %self.pair.id, "presentation session terminated");
        self.pair.broadcast_both(SessionEvent::Terminate);
    }
}
