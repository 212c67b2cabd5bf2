use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::multiplexer::Multiplexer;

/// Holds the one live [`Multiplexer`] of an application session.
///
/// Installing a new multiplexer shuts the previous one down first, so two
/// sets of transports never compete for the same display.
#[derive(Default)]
pub struct ConnectionOwner {
    current: Mutex<Option<Arc<Multiplexer>>>,
}

impl ConnectionOwner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `multiplexer`, shutting down the one it replaces.
    pub async fn install(&self, multiplexer: Multiplexer) -> Arc<Multiplexer> {
        let multiplexer = Arc::new(multiplexer);
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            info!("replacing live connection");
            previous.shutdown().await;
        }
        *current = Some(multiplexer.clone());
        multiplexer
    }

    /// The live multiplexer, if one is installed.
    pub async fn connection(&self) -> Option<Arc<Multiplexer>> {
        self.current.lock().await.clone()
    }

    /// Shut down and forget the live multiplexer.
    pub async fn shutdown(&self) {
        let previous = self.current.lock().await.take();
        if let Some(previous) = previous {
            info!("shutting down live connection");
            previous.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tablelink_substrate::memory::{MemoryBluetooth, MemoryBrowser, MemoryPresentation};

    use super::*;
    use crate::config::{TransportConfig, WindowConfig, WINDOW_NAME};
    use crate::multiplexer::DisplayKind;
    use crate::state::ChannelState;
    use crate::Channel;

    fn controller(browser: &MemoryBrowser) -> Multiplexer {
        Multiplexer::with_substrates(
            Arc::new(MemoryPresentation::unsupported()),
            Arc::new(browser.main_window()),
            Arc::new(MemoryBluetooth::new()),
            TransportConfig {
                window: WindowConfig::default()
                    .with_liveness_poll_interval(Duration::from_millis(5)),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn install_shuts_down_previous() {
        let browser = MemoryBrowser::new("https://table.local");
        let owner = ConnectionOwner::new();
        assert!(owner.connection().await.is_none());

        let first = owner.install(controller(&browser)).await;
        first.use_channel(DisplayKind::Window).await;
        first.connect().await.unwrap();
        let window = browser.window_named(WINDOW_NAME).unwrap();
        assert!(!window.is_closed());

        let second = owner.install(controller(&browser)).await;
        assert!(window.is_closed());
        assert_eq!(first.state(), ChannelState::Disconnected);
        let live = owner.connection().await.unwrap();
        assert!(Arc::ptr_eq(&live, &second));
    }

    #[tokio::test]
    async fn shutdown_forgets_connection() {
        let browser = MemoryBrowser::new("https://table.local");
        let owner = ConnectionOwner::new();
        owner.install(controller(&browser)).await;
        owner.shutdown().await;
        assert!(owner.connection().await.is_none());
        owner.shutdown().await;
    }
}
