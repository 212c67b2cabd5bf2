use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{lock, Listeners};
use crate::bluetooth::{
    Bluetooth, GattCharacteristic, GattDevice, GattService, RequestDeviceOptions,
};
use crate::error::{Result, SubstrateError};

/// A Bluetooth adapter with a fixed set of nearby peripherals.
///
/// The device picker resolves to the first peripheral that matches any filter,
/// standing in for the user's choice.
#[derive(Clone, Default)]
pub struct MemoryBluetooth {
    inner: Arc<AdapterInner>,
}

#[derive(Default)]
struct AdapterInner {
    unavailable: AtomicBool,
    peripherals: Mutex<Vec<MemoryPeripheral>>,
}

impl MemoryBluetooth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the adapter off or on.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Bring a peripheral into range.
    pub fn add_peripheral(&self, peripheral: MemoryPeripheral) {
        lock(&self.inner.peripherals).push(peripheral);
    }
}

#[async_trait]
impl Bluetooth for MemoryBluetooth {
    fn is_available(&self) -> bool {
        !self.inner.unavailable.load(Ordering::SeqCst)
    }

    async fn request_device(&self, options: &RequestDeviceOptions) -> Result<Arc<dyn GattDevice>> {
        if !self.is_available() {
            return Err(SubstrateError::Unsupported("bluetooth"));
        }
        let peripherals = lock(&self.inner.peripherals);
        let chosen = peripherals.iter().find(|p| {
            options
                .filters
                .iter()
                .any(|f| f.matches(p.inner.name.as_deref(), &[p.inner.service]))
        });
        match chosen {
            Some(peripheral) => {
                debug!(device = %peripheral.inner.id, "device picked");
                Ok(Arc::new(peripheral.clone()))
            }
            None => Err(SubstrateError::NoDeviceSelected),
        }
    }
}

/// A GATT peripheral exposing one service with a write characteristic and a
/// notify characteristic.
#[derive(Clone)]
pub struct MemoryPeripheral {
    inner: Arc<PeripheralInner>,
}

struct PeripheralInner {
    id: String,
    name: Option<String>,
    service: Uuid,
    write_characteristic: Uuid,
    notify_characteristic: Uuid,
    connected: AtomicBool,
    fail_writes: AtomicBool,
    disconnected: Listeners<()>,
    notifications: Listeners<Bytes>,
    written_tx: mpsc::UnboundedSender<Bytes>,
    written_rx: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
}

impl MemoryPeripheral {
    pub fn new(
        name: Option<&str>,
        service: Uuid,
        write_characteristic: Uuid,
        notify_characteristic: Uuid,
    ) -> Self {
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(PeripheralInner {
                id: Uuid::new_v4().to_string(),
                name: name.map(str::to_string),
                service,
                write_characteristic,
                notify_characteristic,
                connected: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                disconnected: Listeners::new(),
                notifications: Listeners::new(),
                written_tx,
                written_rx: Mutex::new(Some(written_rx)),
            }),
        }
    }

    /// Push a value to every notification subscriber.
    pub fn notify(&self, value: Bytes) -> usize {
        self.inner.notifications.broadcast(value)
    }

    /// Take the stream of values written to the write characteristic.
    /// Only the first call returns `Some`.
    pub fn take_written(&self) -> Option<mpsc::UnboundedReceiver<Bytes>> {
        lock(&self.inner.written_rx).take()
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Drop the GATT link as if the device went out of range.
    pub fn simulate_link_loss(&self) {
        self.drop_link("link lost");
    }

    fn drop_link(&self, reason: &str) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            debug!(device = %self.inner.id, reason, "GATT server disconnected");
            self.inner.disconnected.broadcast(());
        }
    }
}

impl std::fmt::Debug for MemoryPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPeripheral")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("connected", &self.inner.connected.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl GattDevice for MemoryPeripheral {
    fn id(&self) -> String {
        self.inner.id.clone()
    }

    fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        self.inner.connected.store(true, Ordering::SeqCst);
        debug!(device = %self.inner.id, "GATT server connected");
        Ok(())
    }

    fn disconnect(&self) {
        self.drop_link("disconnect requested");
    }

    fn disconnected(&self) -> mpsc::UnboundedReceiver<()> {
        self.inner.disconnected.subscribe()
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<Arc<dyn GattService>> {
        if !self.is_connected() {
            return Err(SubstrateError::GattDisconnected);
        }
        if uuid != self.inner.service {
            return Err(SubstrateError::ServiceNotFound(uuid));
        }
        Ok(Arc::new(MemoryService {
            peripheral: self.clone(),
        }))
    }
}

struct MemoryService {
    peripheral: MemoryPeripheral,
}

#[async_trait]
impl GattService for MemoryService {
    async fn characteristic(&self, uuid: Uuid) -> Result<Arc<dyn GattCharacteristic>> {
        let inner = &self.peripheral.inner;
        if uuid != inner.write_characteristic && uuid != inner.notify_characteristic {
            return Err(SubstrateError::CharacteristicNotFound(uuid));
        }
        Ok(Arc::new(MemoryCharacteristic {
            peripheral: self.peripheral.clone(),
            uuid,
        }))
    }
}

struct MemoryCharacteristic {
    peripheral: MemoryPeripheral,
    uuid: Uuid,
}

#[async_trait]
impl GattCharacteristic for MemoryCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn start_notifications(&self) -> Result<mpsc::UnboundedReceiver<Bytes>> {
        let inner = &self.peripheral.inner;
        if !inner.connected.load(Ordering::SeqCst) {
            return Err(SubstrateError::GattDisconnected);
        }
        if self.uuid != inner.notify_characteristic {
            return Err(SubstrateError::CharacteristicNotFound(self.uuid));
        }
        Ok(inner.notifications.subscribe())
    }

    async fn write_without_response(&self, data: Bytes) -> Result<()> {
        let inner = &self.peripheral.inner;
        if !inner.connected.load(Ordering::SeqCst) {
            return Err(SubstrateError::GattDisconnected);
        }
        if inner.fail_writes.load(Ordering::SeqCst) {
            return Err(SubstrateError::WriteFailed("write rejected".to_string()));
        }
        if self.uuid != inner.write_characteristic {
            return Err(SubstrateError::WriteFailed(format!(
                "characteristic {} is not writable",
                self.uuid
            )));
        }
        // The receiving side may have gone away; the write itself still succeeded.
        let _ = inner.written_tx.send(data);
        Ok(())
    }
}
