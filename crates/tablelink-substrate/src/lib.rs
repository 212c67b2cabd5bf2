//! Platform substrate seams for tablelink.
//!
//! A substrate is the platform primitive a transport rides on:
//! - window messaging between a controller window and the display window it opened
//! - presentation sessions between a controller and a second-screen receiver
//! - a BLE GATT link to the marker-tracking peripheral
//!
//! Each is described by a small set of traits. Callbacks the platform would
//! invoke are surfaced as `tokio::sync::mpsc` event queues instead.
//!
//! The [`memory`] module provides in-process implementations of all three,
//! used for same-process operation, loopback runs and tests.

pub mod bluetooth;
pub mod error;
pub mod memory;
pub mod presentation;
pub mod window;

pub use bluetooth::{
    Bluetooth, DeviceFilter, GattCharacteristic, GattDevice, GattService, RequestDeviceOptions,
};
pub use error::{Result, SubstrateError};
pub use presentation::{PresentationApi, PresentationConnection, SessionEvent, SessionState};
pub use window::{MessageData, PeerWindow, WindowHost, WindowId, WindowMessage};
