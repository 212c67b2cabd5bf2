use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use super::{lock, Listeners};
use crate::error::{Result, SubstrateError};
use crate::window::{MessageData, PeerWindow, WindowHost, WindowId, WindowMessage};

/// A group of same-origin windows that can open and message each other.
#[derive(Clone)]
pub struct MemoryBrowser {
    group: Arc<Group>,
}

struct Group {
    origin: String,
    supported: bool,
    next_id: AtomicU64,
    named: Mutex<HashMap<String, Arc<Slot>>>,
}

struct Slot {
    id: WindowId,
    route: String,
    opener: Option<Arc<Slot>>,
    closed: AtomicBool,
    focus_count: AtomicUsize,
    listeners: Listeners<WindowMessage>,
}

impl MemoryBrowser {
    pub fn new(origin: impl Into<String>) -> Self {
        Self::build(origin.into(), true)
    }

    /// A browser without window messaging.
    pub fn unsupported(origin: impl Into<String>) -> Self {
        Self::build(origin.into(), false)
    }

    fn build(origin: String, supported: bool) -> Self {
        Self {
            group: Arc::new(Group {
                origin,
                supported,
                next_id: AtomicU64::new(1),
                named: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn origin(&self) -> &str {
        &self.group.origin
    }

    /// Create a top-level window with no opener.
    pub fn main_window(&self) -> MemoryWindow {
        let slot = self.group.new_slot("/", None);
        MemoryWindow {
            group: self.group.clone(),
            slot,
        }
    }

    /// The open window called `name`, if any.
    pub fn window_named(&self, name: &str) -> Option<MemoryWindow> {
        let named = lock(&self.group.named);
        let slot = named.get(name)?;
        if slot.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(MemoryWindow {
            group: self.group.clone(),
            slot: slot.clone(),
        })
    }
}

impl Group {
    fn new_slot(&self, route: &str, opener: Option<Arc<Slot>>) -> Arc<Slot> {
        Arc::new(Slot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            route: route.to_string(),
            opener,
            closed: AtomicBool::new(false),
            focus_count: AtomicUsize::new(0),
            listeners: Listeners::new(),
        })
    }
}

/// One window in a [`MemoryBrowser`].
#[derive(Clone)]
pub struct MemoryWindow {
    group: Arc<Group>,
    slot: Arc<Slot>,
}

impl MemoryWindow {
    pub fn id(&self) -> WindowId {
        self.slot.id
    }

    /// Route the window was opened at.
    pub fn route(&self) -> &str {
        &self.slot.route
    }

    pub fn is_closed(&self) -> bool {
        self.slot.closed.load(Ordering::SeqCst)
    }

    /// Close this window, as the user closing it would.
    pub fn close(&self) {
        debug!(window = self.slot.id, "window closed");
        self.slot.closed.store(true, Ordering::SeqCst);
    }

    /// How many times another window focused this one.
    pub fn focus_count(&self) -> usize {
        self.slot.focus_count.load(Ordering::SeqCst)
    }

    /// Deliver an arbitrary message to this window's listeners.
    pub fn deliver(&self, message: WindowMessage) {
        self.slot.listeners.broadcast(message);
    }

    fn handle_to(&self, target: Arc<Slot>) -> Arc<dyn PeerWindow> {
        Arc::new(MemoryWindowHandle {
            target,
            target_origin: self.group.origin.clone(),
            source: self.slot.id,
            source_origin: self.group.origin.clone(),
        })
    }
}

impl WindowHost for MemoryWindow {
    fn is_supported(&self) -> bool {
        self.group.supported
    }

    fn origin(&self) -> String {
        self.group.origin.clone()
    }

    fn opener(&self) -> Option<Arc<dyn PeerWindow>> {
        let opener = self.slot.opener.clone()?;
        Some(self.handle_to(opener))
    }

    fn open(&self, route: &str, name: &str) -> Result<Arc<dyn PeerWindow>> {
        if !self.group.supported {
            return Err(SubstrateError::Unsupported("window messaging"));
        }
        let mut named = lock(&self.group.named);
        if let Some(existing) = named.get(name) {
            if !existing.closed.load(Ordering::SeqCst) {
                return Ok(self.handle_to(existing.clone()));
            }
        }
        let slot = self.group.new_slot(route, Some(self.slot.clone()));
        debug!(window = slot.id, route, name, "window opened");
        named.insert(name.to_string(), slot.clone());
        Ok(self.handle_to(slot))
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<WindowMessage> {
        self.slot.listeners.subscribe()
    }
}

/// A [`PeerWindow`] proxy held by one memory window for another.
pub struct MemoryWindowHandle {
    target: Arc<Slot>,
    target_origin: String,
    source: WindowId,
    source_origin: String,
}

impl std::fmt::Debug for MemoryWindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWindowHandle")
            .field("target", &self.target.id)
            .field("source", &self.source)
            .finish()
    }
}

impl PeerWindow for MemoryWindowHandle {
    fn id(&self) -> WindowId {
        self.target.id
    }

    fn is_closed(&self) -> bool {
        self.target.closed.load(Ordering::SeqCst)
    }

    fn focus(&self) {
        self.target.focus_count.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        debug!(window = self.target.id, "window closed by peer");
        self.target.closed.store(true, Ordering::SeqCst);
    }

    fn post_message(&self, data: Bytes, target_origin: &str) -> Result<()> {
        if self.is_closed() {
            return Err(SubstrateError::Closed("window"));
        }
        if target_origin != "*" && target_origin != self.target_origin {
            debug!(target_origin, "dropping message for mismatched origin");
            return Ok(());
        }
        self.target.listeners.broadcast(WindowMessage {
            origin: self.source_origin.clone(),
            source: self.source,
            data: MessageData::Binary(data),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opened_window_sees_its_opener() {
        let browser = MemoryBrowser::new("https://app.test");
        let main = browser.main_window();
        assert!(main.opener().is_none());

        let handle = main.open("/table", "display").unwrap();
        let display = browser.window_named("display").unwrap();
        assert_eq!(handle.id(), display.id());
        assert_eq!(display.route(), "/table");

        let opener = display.opener().unwrap();
        assert_eq!(opener.id(), main.id());
    }

    #[test]
    fn open_reuses_live_named_window() {
        let browser = MemoryBrowser::new("https://app.test");
        let main = browser.main_window();

        let first = main.open("/table", "display").unwrap();
        let second = main.open("/table", "display").unwrap();
        assert_eq!(first.id(), second.id());

        first.close();
        assert!(browser.window_named("display").is_none());
        let third = main.open("/table", "display").unwrap();
        assert_ne!(third.id(), first.id());
    }

    #[test]
    fn post_message_reaches_listeners_with_source() {
        let browser = MemoryBrowser::new("https://app.test");
        let main = browser.main_window();
        let handle = main.open("/table", "display").unwrap();
        let display = browser.window_named("display").unwrap();
        let mut inbox = display.subscribe();

        handle
            .post_message(Bytes::from_static(b"\x01\x02"), "https://app.test")
            .unwrap();
        let message = inbox.try_recv().unwrap();
        assert_eq!(message.origin, "https://app.test");
        assert_eq!(message.source, main.id());
        assert_eq!(message.data, MessageData::Binary(Bytes::from_static(b"\x01\x02")));

        handle
            .post_message(Bytes::from_static(b"x"), "https://elsewhere.test")
            .unwrap();
        assert!(inbox.try_recv().is_err());
    }

    #[test]
    fn post_to_closed_window_fails() {
        let browser = MemoryBrowser::new("https://app.test");
        let main = browser.main_window();
        let handle = main.open("/table", "display").unwrap();
        handle.close();
        assert_eq!(
            handle.post_message(Bytes::new(), "*"),
            Err(SubstrateError::Closed("window"))
        );
    }

    #[test]
    fn unsupported_browser_refuses_to_open() {
        let browser = MemoryBrowser::unsupported("https://app.test");
        let main = browser.main_window();
        assert!(!main.is_supported());
        assert!(matches!(
            main.open("/table", "display"),
            Err(SubstrateError::Unsupported(_))
        ));
    }
}
