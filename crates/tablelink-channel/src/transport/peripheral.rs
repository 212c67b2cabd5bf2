use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tablelink_substrate::{Bluetooth, GattCharacteristic, GattDevice};
use tablelink_wire::{decode_packet, encode_packet, Packet, Request, Response};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PeripheralConfig;
use crate::error::{ChannelError, Result};
use crate::handler::RequestHandler;
use crate::link::{BusyGuard, LinkSlot};
use crate::router::{ChannelCore, PacketSink};
use crate::state::{ChannelState, Role};
use crate::subscription::Subscription;
use crate::{Channel, StateHandler};

/// Channel to a tracker peripheral over a GATT write/notify characteristic pair.
///
/// Each packet travels as one characteristic value. The controller is always
/// the sender; the tracker answers through notifications.
pub struct PeripheralTransport {
    inner: Arc<PeripheralInner>,
}

struct PeripheralInner {
    core: Arc<ChannelCore>,
    bluetooth: Arc<dyn Bluetooth>,
    config: PeripheralConfig,
    link: LinkSlot<PeripheralLink>,
    /// Set while the device picker is showing.
    picking: AtomicBool,
}

struct PeripheralLink {
    device: Arc<dyn GattDevice>,
    /// Resolved once the GATT setup completes.
    write: Option<Arc<dyn GattCharacteristic>>,
    cancel: CancellationToken,
}

impl PeripheralTransport {
    pub fn new(bluetooth: Arc<dyn Bluetooth>, config: PeripheralConfig) -> Self {
        Self {
            inner: Arc::new(PeripheralInner {
                core: ChannelCore::new("peripheral"),
                bluetooth,
                config,
                link: LinkSlot::new(),
                picking: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &PeripheralConfig {
        &self.inner.config
    }

    /// Name the picked device advertised, if any.
    pub fn device_name(&self) -> Option<String> {
        self.inner
            .link
            .with(|link| link.and_then(|link| link.device.name()))
    }
}

impl PeripheralInner {
    fn state(&self) -> ChannelState {
        if self.picking.load(Ordering::SeqCst) {
            return ChannelState::Connecting;
        }
        self.link.with(|link| match link {
            None => ChannelState::Disconnected,
            Some(link) if link.device.is_connected() && link.write.is_some() => {
                ChannelState::Connected
            }
            Some(_) => ChannelState::Connecting,
        })
    }

    async fn pick(&self) -> Result<Arc<dyn GattDevice>> {
        let _picking = BusyGuard::set(&self.picking);
        self.core.notify_state(ChannelState::Connecting);
        let device = self
            .bluetooth
            .request_device(&self.config.request_options())
            .await?;
        Ok(device)
    }

    /// Connect the GATT server and resolve both characteristics.
    async fn open(
        &self,
        device: &dyn GattDevice,
    ) -> Result<(Arc<dyn GattCharacteristic>, mpsc::UnboundedReceiver<Bytes>)> {
        device.connect().await?;
        let service = device.primary_service(self.config.service).await?;
        let write = service
            .characteristic(self.config.write_characteristic)
            .await?;
        let notify = service
            .characteristic(self.config.notify_characteristic)
            .await?;
        let notifications = notify.start_notifications().await?;
        Ok((write, notifications))
    }

    fn release(&self, link: PeripheralLink) {
        link.cancel.cancel();
        link.device.disconnect();
        self.core.cancel_pending();
    }

    /// Drop the current link, whatever installed it.
    fn shut_down(&self, reason: &'static str) {
        if let Some(link) = self.link.take() {
            info!(reason, device = %link.device.id(), "tracker link closed");
            self.release(link);
        }
        self.core.notify_state(self.state());
    }

    /// Teardown triggered from the pump. Ignored if the link was replaced.
    fn teardown(&self, epoch: u64, reason: &'static str) {
        if let Some(link) = self.link.take_if(epoch) {
            info!(reason, device = %link.device.id(), "tracker link lost");
            self.release(link);
            self.core.notify_state(self.state());
        }
    }

    fn on_notification(self: &Arc<Self>, value: Bytes) {
        match decode_packet(value) {
            Ok(packet) => self.core.dispatch(packet, self.clone()),
            Err(err) => warn!(error = %err, "dropping undecodable notification"),
        }
    }
}

async fn pump(
    inner: Arc<PeripheralInner>,
    epoch: u64,
    mut notifications: mpsc::UnboundedReceiver<Bytes>,
    mut disconnected: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = disconnected.recv() => {
                inner.teardown(epoch, "GATT server disconnected");
                break;
            }
            value = notifications.recv() => match value {
                Some(value) => inner.on_notification(value),
                None => {
                    inner.teardown(epoch, "notifications ended");
                    break;
                }
            },
        }
    }
    debug!(epoch, "peripheral pump stopped");
}

#[async_trait]
impl PacketSink for PeripheralInner {
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let (device, write) = self
            .link
            .with(|link| link.map(|link| (link.device.clone(), link.write.clone())))
            .ok_or(ChannelError::NotConnected)?;
        if !device.is_connected() {
            return Err(ChannelError::DeviceDisconnected);
        }
        let write = write.ok_or(ChannelError::NotConnected)?;
        if let Err(err) = write.write_without_response(encode_packet(packet)).await {
            warn!(device = %device.id(), error = %err, "characteristic write failed");
            self.shut_down("write failed");
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for PeripheralTransport {
    fn name(&self) -> &'static str {
        "peripheral"
    }

    fn state(&self) -> ChannelState {
        self.inner.state()
    }

    fn is_supported(&self) -> bool {
        self.inner.bluetooth.is_available()
    }

    fn role(&self) -> Role {
        Role::Sender
    }

    async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.bluetooth.is_available() {
            return Err(ChannelError::Unsupported("bluetooth"));
        }
        let state = inner.state();
        if state.is_live() {
            inner.core.notify_state(state);
            return Ok(());
        }

        let device = match inner.pick().await {
            Ok(device) => device,
            Err(err) => {
                warn!(error = %err, "no tracker picked");
                inner.core.notify_state(inner.state());
                return Err(err);
            }
        };

        // Subscribe before connecting so a drop during setup is not missed.
        let disconnected = device.disconnected();
        let cancel = CancellationToken::new();
        let (epoch, stale) = inner.link.install(PeripheralLink {
            device: device.clone(),
            write: None,
            cancel: cancel.clone(),
        });
        if let Some(stale) = stale {
            inner.release(stale);
        }
        inner.core.notify_state(inner.state());

        let (write, notifications) = match inner.open(device.as_ref()).await {
            Ok(opened) => opened,
            Err(err) => {
                warn!(device = %device.id(), error = %err, "GATT setup failed");
                if let Some(link) = inner.link.take_if(epoch) {
                    inner.release(link);
                }
                inner.core.notify_state(inner.state());
                return Err(err);
            }
        };
        if !inner.link.update_if(epoch, |link| link.write = Some(write)) {
            // Torn down while the GATT setup was running.
            return Err(ChannelError::DeviceDisconnected);
        }
        tokio::spawn(pump(inner.clone(), epoch, notifications, disconnected, cancel));

        info!(device = %device.id(), name = ?device.name(), "tracker connected");
        inner.core.notify_state(inner.state());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.shut_down("disconnect requested");
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
