//! Scope-bound bindings for code that consumes a channel.

use std::sync::Arc;

use tokio::sync::watch;

use crate::handler::RequestHandler;
use crate::state::ChannelState;
use crate::subscription::Subscription;
use crate::Channel;

/// A `watch` mirror of a channel's connection state.
///
/// The state handler stays registered until the watch is dropped.
pub struct StateWatch {
    rx: watch::Receiver<ChannelState>,
    subscription: Option<Subscription>,
}

impl StateWatch {
    pub fn new(channel: &dyn Channel) -> Self {
        let (tx, rx) = watch::channel(channel.state());
        let subscription = channel.add_connection_state_change_handler(Arc::new(move |state| {
            tx.send_replace(state);
        }));
        Self {
            rx,
            subscription: Some(subscription),
        }
    }

    /// The most recently observed state.
    pub fn current(&self) -> ChannelState {
        *self.rx.borrow()
    }

    /// A receiver that can be awaited for changes.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.rx.clone()
    }

    /// Wait until the channel reports `state`.
    pub async fn wait_for(&mut self, state: ChannelState) -> ChannelState {
        // The sender lives in the registered handler, so this only fails
        // once the channel itself is gone.
        let _ = self.rx.wait_for(|seen| *seen == state).await;
        self.current()
    }
}

impl Drop for StateWatch {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

/// A request handler registered for as long as the guard lives.
pub struct RequestHandlerGuard {
    subscription: Option<Subscription>,
}

impl RequestHandlerGuard {
    pub fn new(channel: &dyn Channel, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            subscription: Some(channel.add_request_handler(handler)),
        }
    }
}

impl Drop for RequestHandlerGuard {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tablelink_substrate::memory::MemoryBrowser;
    use tablelink_wire::{GetAssetRequest, GetAssetResponse, Request, Response};

    use super::*;
    use crate::config::{WindowConfig, WINDOW_NAME};
    use crate::error::ChannelError;
    use crate::handler::handler_fn;
    use crate::transport::WindowTransport;

    fn pair(browser: &MemoryBrowser) -> (WindowTransport, WindowConfig) {
        let config = WindowConfig::default().with_liveness_poll_interval(Duration::from_millis(5));
        (
            WindowTransport::new(Arc::new(browser.main_window()), config.clone()),
            config,
        )
    }

    #[tokio::test]
    async fn state_watch_tracks_transitions() {
        let browser = MemoryBrowser::new("https://table.local");
        let (controller, config) = pair(&browser);
        let mut states = StateWatch::new(&controller);
        assert_eq!(states.current(), ChannelState::Disconnected);

        controller.connect().await.unwrap();
        let display = WindowTransport::new(
            Arc::new(browser.window_named(WINDOW_NAME).unwrap()),
            config,
        );
        display.connect().await.unwrap();

        let reached = tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(ChannelState::Connected),
        )
        .await
        .unwrap();
        assert_eq!(reached, ChannelState::Connected);

        controller.disconnect().await.unwrap();
        assert_eq!(states.current(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn handler_guard_unregisters_on_drop() {
        let browser = MemoryBrowser::new("https://table.local");
        let (controller, config) = pair(&browser);
        controller.connect().await.unwrap();
        let display = WindowTransport::new(
            Arc::new(browser.window_named(WINDOW_NAME).unwrap()),
            config,
        );
        display.connect().await.unwrap();

        let asset = Request::GetAsset(GetAssetRequest { id: "map".into() });
        {
            let _guard = RequestHandlerGuard::new(
                &display,
                handler_fn(|request| {
                    Ok(match request {
                        Request::GetAsset(get) => Some(Response::GetAsset(GetAssetResponse {
                            id: get.id.clone(),
                            payload: bytes::Bytes::from_static(b"PNG"),
                            media_type: "image/png".into(),
                        })),
                        _ => None,
                    })
                }),
            );
            let response = controller.request(asset.clone()).await.unwrap();
            assert!(matches!(response, Response::GetAsset(_)));
        }

        // Unanswered requests get no reply, so bound the wait.
        let result = controller
            .request_with_timeout(asset, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ChannelError::RequestTimeout(_))));
    }
}
