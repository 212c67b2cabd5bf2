use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// One device-picker filter. A device matches when every set criterion does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Advertised service UUIDs the device must expose.
    pub services: Vec<Uuid>,
    /// Prefix the advertised name must start with.
    pub name_prefix: Option<String>,
}

impl DeviceFilter {
    pub fn service(uuid: Uuid) -> Self {
        Self {
            services: vec![uuid],
            name_prefix: None,
        }
    }

    pub fn name_prefix(prefix: impl Into<String>) -> Self {
        Self {
            services: Vec::new(),
            name_prefix: Some(prefix.into()),
        }
    }

    /// Whether a device with these advertised properties passes this filter.
    pub fn matches(&self, name: Option<&str>, advertised: &[Uuid]) -> bool {
        let services_ok = self.services.iter().all(|s| advertised.contains(s));
        let name_ok = match (&self.name_prefix, name) {
            (None, _) => true,
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        };
        services_ok && name_ok
    }
}

/// Options for the device picker. A device matching any filter is offered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDeviceOptions {
    pub filters: Vec<DeviceFilter>,
    /// Services the caller wants to access beyond the filtered ones.
    pub optional_services: Vec<Uuid>,
}

/// Entry point to the platform Bluetooth stack.
#[async_trait]
pub trait Bluetooth: Send + Sync {
    /// Whether a Bluetooth adapter is present and powered.
    fn is_available(&self) -> bool;

    /// Show the device picker and return the chosen device.
    async fn request_device(&self, options: &RequestDeviceOptions) -> Result<Arc<dyn GattDevice>>;
}

/// A picked device and its GATT server.
#[async_trait]
pub trait GattDevice: Send + Sync + fmt::Debug {
    fn id(&self) -> String;

    fn name(&self) -> Option<String>;

    fn is_connected(&self) -> bool;

    async fn connect(&self) -> Result<()>;

    fn disconnect(&self);

    /// Subscribe to "GATT server disconnected" events.
    fn disconnected(&self) -> mpsc::UnboundedReceiver<()>;

    async fn primary_service(&self, uuid: Uuid) -> Result<Arc<dyn GattService>>;
}

#[async_trait]
pub trait GattService: Send + Sync {
    async fn characteristic(&self, uuid: Uuid) -> Result<Arc<dyn GattCharacteristic>>;
}

#[async_trait]
pub trait GattCharacteristic: Send + Sync {
    fn uuid(&self) -> Uuid;

    /// Enable notifications and return the stream of notified values.
    async fn start_notifications(&self) -> Result<mpsc::UnboundedReceiver<Bytes>>;

    async fn write_without_response(&self, data: Bytes) -> Result<()>;
}
