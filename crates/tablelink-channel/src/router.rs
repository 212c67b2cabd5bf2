use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tablelink_wire::{request_name, Packet, Payload, Request, Response};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ChannelError, Result};
use crate::handler::{HelloHandler, RequestHandler};
use crate::link::lock;
use crate::state::ChannelState;
use crate::subscription::Subscription;
use crate::StateHandler;

/// Where a channel's outbound packets go. Implemented by each transport.
#[async_trait]
pub trait PacketSink: Send + Sync {
    async fn send_packet(&self, packet: &Packet) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Outbound,
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Outbound => "out",
            Direction::Inbound => "in",
        })
    }
}

/// Transport-independent half of a channel.
///
/// Owns the pending request table and both handler lists, and routes inbound
/// packets: responses resolve their pending request, requests walk the
/// handler chain.
pub struct ChannelCore {
    name: &'static str,
    pending: Mutex<HashMap<String, oneshot::Sender<Response>>>,
    request_handlers: Mutex<Vec<(u64, Arc<dyn RequestHandler>)>>,
    state_handlers: Mutex<Vec<(u64, StateHandler)>>,
    next_handler_id: AtomicU64,
}

impl ChannelCore {
    /// Create a core whose handler chain starts with the built-in `hello`
    /// handler.
    pub fn new(name: &'static str) -> Arc<Self> {
        let hello: Arc<dyn RequestHandler> = Arc::new(HelloHandler);
        Arc::new(Self {
            name,
            pending: Mutex::new(HashMap::new()),
            request_handlers: Mutex::new(vec![(0, hello)]),
            state_handlers: Mutex::new(Vec::new()),
            next_handler_id: AtomicU64::new(1),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add_request_handler(self: &Arc<Self>, handler: Arc<dyn RequestHandler>) -> Subscription {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.request_handlers).push((id, handler));
        let core = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(core) = core.upgrade() {
                lock(&core.request_handlers).retain(|(handler_id, _)| *handler_id != id);
            }
        })
    }

    pub fn add_state_handler(self: &Arc<Self>, handler: StateHandler) -> Subscription {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.state_handlers).push((id, handler));
        let core = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(core) = core.upgrade() {
                lock(&core.state_handlers).retain(|(handler_id, _)| *handler_id != id);
            }
        })
    }

    /// Tell every state handler about `state`.
    pub fn notify_state(&self, state: ChannelState) {
        let handlers: Vec<StateHandler> = lock(&self.state_handlers)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        debug!(channel = self.name, %state, handlers = handlers.len(), "state notification");
        for handler in handlers {
            handler(state);
        }
    }

    /// Send `request` through `sink` and wait for the matching response.
    ///
    /// The pending entry is removed when the response arrives, when sending
    /// fails, and when this future is dropped.
    pub async fn request(&self, sink: &dyn PacketSink, request: Request) -> Result<Response> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let _pending = PendingEntry::register(self, request_id.clone(), tx);

        let packet = Packet::request(request_id, request);
        self.log_packet(Direction::Outbound, &packet);
        sink.send_packet(&packet).await?;

        rx.await.map_err(|_| ChannelError::Cancelled)
    }

    /// Route an inbound packet received by a transport pump.
    ///
    /// Responses are resolved inline, in delivery order. Requests are answered
    /// on their own task so a handler that issues requests of its own cannot
    /// stall response routing.
    pub fn dispatch(self: &Arc<Self>, packet: Packet, sink: Arc<dyn PacketSink>) {
        self.log_packet(Direction::Inbound, &packet);
        match packet.payload {
            Payload::Response(response) => self.resolve(packet.request_id, response),
            Payload::Request(request) => {
                let core = self.clone();
                tokio::spawn(async move {
                    let name = request_name(&request);
                    if let Err(err) = core.respond(packet.request_id, request, sink.as_ref()).await
                    {
                        warn!(channel = core.name, request = name, error = %err, "request not answered");
                    }
                });
            }
        }
    }

    /// Handle one inbound packet to completion.
    ///
    /// Returns [`ChannelError::Unimplemented`] when no handler answers a
    /// request; nothing is sent back in that case.
    pub async fn process_incoming_packet(&self, packet: Packet, sink: &dyn PacketSink) -> Result<()> {
        self.log_packet(Direction::Inbound, &packet);
        match packet.payload {
            Payload::Response(response) => {
                self.resolve(packet.request_id, response);
                Ok(())
            }
            Payload::Request(request) => self.respond(packet.request_id, request, sink).await,
        }
    }

    /// Walk the handler chain. The first handler returning a response wins.
    pub async fn answer(&self, request: &Request) -> Result<Response> {
        let handlers: Vec<Arc<dyn RequestHandler>> = lock(&self.request_handlers)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            if let Some(response) = handler.handle(request).await? {
                return Ok(response);
            }
        }
        Err(ChannelError::Unimplemented(request_name(request)))
    }

    /// Fail every in-flight request with [`ChannelError::Cancelled`].
    pub fn cancel_pending(&self) -> usize {
        let cancelled: Vec<_> = lock(&self.pending).drain().collect();
        if !cancelled.is_empty() {
            debug!(channel = self.name, count = cancelled.len(), "cancelled pending requests");
        }
        cancelled.len()
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    async fn respond(&self, request_id: String, request: Request, sink: &dyn PacketSink) -> Result<()> {
        let response = self.answer(&request).await?;
        let reply = Packet::response(request_id, response);
        self.log_packet(Direction::Outbound, &reply);
        sink.send_packet(&reply).await
    }

    fn resolve(&self, request_id: String, response: Response) {
        let waiter = lock(&self.pending).remove(&request_id);
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!(channel = self.name, %request_id, "requester went away before its response");
                }
            }
            None => {
                warn!(channel = self.name, %request_id, "dropping response for unknown request");
            }
        }
    }

    fn log_packet(&self, direction: Direction, packet: &Packet) {
        debug!(
            channel = self.name,
            %direction,
            kind = packet.kind(),
            request_id = %packet.request_id,
            message = packet.message_name(),
            "packet"
        );
    }
}

impl fmt::Debug for ChannelCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCore")
            .field("name", &self.name)
            .field("pending", &self.pending_count())
            .field("request_handlers", &lock(&self.request_handlers).len())
            .finish()
    }
}

/// Removes a pending entry when the requesting future completes or is dropped.
struct PendingEntry<'a> {
    core: &'a ChannelCore,
    request_id: String,
}

impl<'a> PendingEntry<'a> {
    fn register(core: &'a ChannelCore, request_id: String, tx: oneshot::Sender<Response>) -> Self {
        lock(&core.pending).insert(request_id.clone(), tx);
        Self { core, request_id }
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock(&self.core.pending).remove(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use futures_util::future::join_all;
    use tablelink_wire::{GetAssetRequest, GetAssetResponse, GetTableConfigurationRequest};

    use super::*;
    use crate::handler::handler_fn;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Packet>>,
        fail: AtomicBool,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<Packet> {
            lock(&self.sent).clone()
        }

        async fn wait_for(&self, count: usize) -> Vec<Packet> {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }

    #[async_trait]
    impl PacketSink for RecordingSink {
        async fn send_packet(&self, packet: &Packet) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ChannelError::NotConnected);
            }
            lock(&self.sent).push(packet.clone());
            Ok(())
        }
    }

    fn asset_request(id: &str) -> Request {
        Request::GetAsset(GetAssetRequest { id: id.to_string() })
    }

    fn asset_response(id: &str) -> Response {
        Response::GetAsset(GetAssetResponse {
            id: id.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn response_resolves_exactly_once() {
        let core = ChannelCore::new("test");
        let sink = Arc::new(RecordingSink::default());

        let task = {
            let core = core.clone();
            let sink = sink.clone();
            tokio::spawn(async move { core.request(sink.as_ref(), asset_request("a")).await })
        };

        let sent = sink.wait_for(1).await;
        let request_id = sent[0].request_id.clone();
        assert_eq!(core.pending_count(), 1);

        let first = Packet::response(request_id.clone(), asset_response("first"));
        let second = Packet::response(request_id, asset_response("second"));
        core.process_incoming_packet(first, sink.as_ref()).await.unwrap();
        core.process_incoming_packet(second, sink.as_ref()).await.unwrap();

        let response = task.await.unwrap().unwrap();
        assert_eq!(response, asset_response("first"));
        assert_eq!(core.pending_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_out_of_order() {
        const N: usize = 8;
        let core = ChannelCore::new("test");
        let sink = Arc::new(RecordingSink::default());

        let tasks: Vec<_> = (0..N)
            .map(|i| {
                let core = core.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    core.request(sink.as_ref(), asset_request(&i.to_string())).await
                })
            })
            .collect();

        let sent = sink.wait_for(N).await;
        for packet in sent.iter().rev() {
            let Payload::Request(Request::GetAsset(asset)) = &packet.payload else {
                panic!("unexpected packet {packet:?}");
            };
            let reply = Packet::response(packet.request_id.clone(), asset_response(&asset.id));
            core.process_incoming_packet(reply, sink.as_ref()).await.unwrap();
        }

        let results = join_all(tasks).await;
        for (i, result) in results.into_iter().enumerate() {
            let response = result.unwrap().unwrap();
            assert_eq!(response, asset_response(&i.to_string()));
        }
        assert_eq!(core.pending_count(), 0);
    }

    #[tokio::test]
    async fn unknown_response_is_dropped() {
        let core = ChannelCore::new("test");
        let sink = RecordingSink::default();
        let stray = Packet::response("nobody-asked", Response::ack());
        core.process_incoming_packet(stray, &sink).await.unwrap();
        assert_eq!(core.pending_count(), 0);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn hello_is_answered_by_default() {
        let core = ChannelCore::new("test");
        let sink = RecordingSink::default();
        core.process_incoming_packet(Packet::request("h-1", Request::hello()), &sink)
            .await
            .unwrap();

        let sent = sink.sent();
        assert_eq!(sent, vec![Packet::response("h-1", Response::ack())]);
    }

    #[tokio::test]
    async fn unhandled_request_is_unimplemented() {
        let core = ChannelCore::new("test");
        let sink = RecordingSink::default();
        let result = core
            .process_incoming_packet(Packet::request("x", asset_request("map")), &sink)
            .await;
        assert!(matches!(result, Err(ChannelError::Unimplemented("get_asset"))));
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn first_matching_handler_wins() {
        let core = ChannelCore::new("test");
        let sink = RecordingSink::default();

        let first = core.add_request_handler(handler_fn(|request| {
            Ok(match request {
                Request::GetAsset(_) => Some(asset_response("from-first")),
                _ => None,
            })
        }));
        let _second = core.add_request_handler(handler_fn(|request| {
            Ok(match request {
                Request::GetAsset(_) | Request::GetTableConfiguration(_) => {
                    Some(asset_response("from-second"))
                }
                _ => None,
            })
        }));

        assert_eq!(
            core.answer(&asset_request("a")).await.unwrap(),
            asset_response("from-first")
        );
        assert_eq!(
            core.answer(&Request::GetTableConfiguration(GetTableConfigurationRequest {}))
                .await
                .unwrap(),
            asset_response("from-second")
        );

        first.unsubscribe();
        core.process_incoming_packet(Packet::request("r", asset_request("a")), &sink)
            .await
            .unwrap();
        assert_eq!(
            sink.sent(),
            vec![Packet::response("r", asset_response("from-second"))]
        );
    }

    #[tokio::test]
    async fn handler_error_propagates() {
        let core = ChannelCore::new("test");
        let _failing = core.add_request_handler(handler_fn(|_| {
            Err(ChannelError::Handler("asset store offline".into()))
        }));
        let result = core.answer(&asset_request("a")).await;
        assert!(matches!(result, Err(ChannelError::Handler(_))));
    }

    #[tokio::test]
    async fn send_failure_fails_request_and_clears_entry() {
        let core = ChannelCore::new("test");
        let sink = RecordingSink::default();
        sink.fail.store(true, Ordering::SeqCst);

        let result = core.request(&sink, asset_request("a")).await;
        assert!(matches!(result, Err(ChannelError::NotConnected)));
        assert_eq!(core.pending_count(), 0);
    }

    #[tokio::test]
    async fn dropped_request_clears_entry() {
        let core = ChannelCore::new("test");
        let sink = RecordingSink::default();

        let result = tokio::time::timeout(
            Duration::from_millis(10),
            core.request(&sink, asset_request("a")),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(core.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancel_pending_fails_waiters() {
        let core = ChannelCore::new("test");
        let sink = Arc::new(RecordingSink::default());

        let task = {
            let core = core.clone();
            let sink = sink.clone();
            tokio::spawn(async move { core.request(sink.as_ref(), Request::hello()).await })
        };
        sink.wait_for(1).await;

        assert_eq!(core.cancel_pending(), 1);
        assert!(matches!(task.await.unwrap(), Err(ChannelError::Cancelled)));
    }

    #[tokio::test]
    async fn state_handlers_fire_until_unsubscribed() {
        let core = ChannelCore::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let seen = seen.clone();
            core.add_state_handler(Arc::new(move |state| lock(&seen).push(state)))
        };

        core.notify_state(ChannelState::Connecting);
        core.notify_state(ChannelState::Connecting);
        subscription.unsubscribe();
        core.notify_state(ChannelState::Connected);

        assert_eq!(
            *lock(&seen),
            vec![ChannelState::Connecting, ChannelState::Connecting]
        );
    }

    #[tokio::test]
    async fn dispatched_request_is_answered_in_background() {
        let core = ChannelCore::new("test");
        let sink = Arc::new(RecordingSink::default());
        core.dispatch(Packet::request("bg", Request::hello()), sink.clone());
        let sent = sink.wait_for(1).await;
        assert_eq!(sent[0], Packet::response("bg", Response::ack()));
    }
}
