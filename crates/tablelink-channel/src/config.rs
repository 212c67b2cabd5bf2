use std::fmt;
use std::time::Duration;

use tablelink_substrate::{DeviceFilter, RequestDeviceOptions};
use uuid::Uuid;

/// Route the display surface is served at.
pub const DISPLAY_ROUTE: &str = "/table";

/// Name of the window the controller opens for the display.
pub const WINDOW_NAME: &str = "tablelink-external-window";

/// Advertised-name prefix of tracker peripherals.
pub const TRACKER_NAME_PREFIX: &str = "table-camera";

/// Build a tracker UUID from its 16-bit short form: `1234xxxx-0000-1000-8000-00805f9b34fb`.
pub const fn tracker_uuid(short: u16) -> Uuid {
    Uuid::from_u128(
        (0x1234_u128 << 112) | ((short as u128) << 96) | 0x0000_1000_8000_0080_5f9b_34fb_u128,
    )
}

/// Tracker GATT service.
pub const TRACKER_SERVICE: Uuid = tracker_uuid(0x2233);

/// Characteristic the controller writes packets to.
pub const TRACKER_WRITE_CHARACTERISTIC: Uuid = tracker_uuid(0x3344);

/// Characteristic the tracker notifies packets on.
pub const TRACKER_NOTIFY_CHARACTERISTIC: Uuid = tracker_uuid(0x3345);

/// Configuration for the window transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    /// Route opened in the display window.
    pub route: String,
    /// Window name, so reopening focuses the existing window.
    pub window_name: String,
    /// How often to check whether the peer window was closed. Default: 100 ms.
    pub liveness_poll_interval: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            route: DISPLAY_ROUTE.to_string(),
            window_name: WINDOW_NAME.to_string(),
            liveness_poll_interval: Duration::from_millis(100),
        }
    }
}

impl WindowConfig {
    pub fn with_liveness_poll_interval(mut self, interval: Duration) -> Self {
        self.liveness_poll_interval = interval;
        self
    }
}

/// Configuration for the presentation session transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Route presented on the second screen.
    pub route: String,
    /// How long to wait for a compatible display. Default: 5 s.
    pub availability_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            route: DISPLAY_ROUTE.to_string(),
            availability_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn with_availability_timeout(mut self, timeout: Duration) -> Self {
        self.availability_timeout = timeout;
        self
    }
}

/// Configuration for the BLE tracker transport.
#[derive(Clone, PartialEq, Eq)]
pub struct PeripheralConfig {
    /// Device picker filters; a device matching any one is offered.
    pub filters: Vec<DeviceFilter>,
    pub service: Uuid,
    pub write_characteristic: Uuid,
    pub notify_characteristic: Uuid,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            filters: vec![
                DeviceFilter::service(TRACKER_SERVICE),
                DeviceFilter::name_prefix(TRACKER_NAME_PREFIX),
            ],
            service: TRACKER_SERVICE,
            write_characteristic: TRACKER_WRITE_CHARACTERISTIC,
            notify_characteristic: TRACKER_NOTIFY_CHARACTERISTIC,
        }
    }
}

impl PeripheralConfig {
    /// Picker options built from this configuration.
    pub fn request_options(&self) -> RequestDeviceOptions {
        RequestDeviceOptions {
            filters: self.filters.clone(),
            optional_services: vec![self.service],
        }
    }
}

impl fmt::Debug for PeripheralConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeripheralConfig")
            .field("filters", &self.filters.len())
            .field("service", &self.service.to_string())
            .field("write_characteristic", &self.write_characteristic.to_string())
            .field("notify_characteristic", &self.notify_characteristic.to_string())
            .finish()
    }
}

/// Configuration for every transport a [`Multiplexer`](crate::Multiplexer) owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportConfig {
    pub window: WindowConfig,
    pub session: SessionConfig,
    pub peripheral: PeripheralConfig,
}
