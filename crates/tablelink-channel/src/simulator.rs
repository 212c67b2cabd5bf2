//! An in-process marker tracker for demos and tests.
//!
//! [`TrackerSimulator`] plays the peripheral side of the tracker link: it
//! reads packets the controller writes to a [`MemoryPeripheral`], answers
//! them through its own handler chain, and notifies packets back.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tablelink_substrate::memory::MemoryPeripheral;
use tablelink_substrate::{GattDevice, SubstrateError};
use tablelink_wire::{
    decode_packet, encode_packet, MarkerLocations, Packet, Request, Response,
    TrackerGetCalibrationResponse, TrackerGetMarkerLocationsResponse, TrackerGetStatusResponse,
    TrackerState, TrackerUpdateMarkerLocationsRequest, Vector2D,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{TRACKER_NOTIFY_CHARACTERISTIC, TRACKER_SERVICE, TRACKER_WRITE_CHARACTERISTIC};
use crate::error::{ChannelError, Result};
use crate::handler::RequestHandler;
use crate::link::lock;
use crate::router::{ChannelCore, PacketSink};
use crate::subscription::Subscription;

#[derive(Debug, Default)]
struct TrackerStatus {
    state: TrackerState,
    corners: Vec<Vector2D>,
    markers: MarkerLocations,
}

/// Simulated tracker behind a [`MemoryPeripheral`].
pub struct TrackerSimulator {
    peripheral: MemoryPeripheral,
    core: Arc<ChannelCore>,
    sink: Arc<NotifySink>,
    status: Arc<Mutex<TrackerStatus>>,
    uuid: String,
    cancel: CancellationToken,
    _behaviour: Subscription,
}

/// Sends packets to the controller as characteristic notifications.
struct NotifySink {
    peripheral: MemoryPeripheral,
}

#[async_trait]
impl PacketSink for NotifySink {
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        if !self.peripheral.is_connected() {
            return Err(ChannelError::DeviceDisconnected);
        }
        if self.peripheral.notify(encode_packet(packet)) == 0 {
            return Err(ChannelError::NotConnected);
        }
        Ok(())
    }
}

/// The tracker's request handling: status, calibration, tracking and markers.
struct TrackerBehaviour {
    uuid: String,
    status: Arc<Mutex<TrackerStatus>>,
}

#[async_trait]
impl RequestHandler for TrackerBehaviour {
    async fn handle(&self, request: &Request) -> Result<Option<Response>> {
        let mut status = lock(&self.status);
        let response = match request {
            Request::TrackerGetStatus(_) => Response::TrackerGetStatus(TrackerGetStatusResponse {
                uuid: self.uuid.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                state: status.state,
            }),
            Request::TrackerStartCalibration(start) => {
                if status.state != TrackerState::Calibrating {
                    info!(corners = start.corners.len(), "calibration started");
                    status.state = TrackerState::Calibrating;
                    status.corners = start.corners.clone();
                }
                Response::ack()
            }
            Request::TrackerGetCalibration(_) => {
                Response::TrackerGetCalibration(TrackerGetCalibrationResponse {
                    found_corners: !status.corners.is_empty(),
                    corner_locations: status.corners.clone(),
                })
            }
            Request::TrackerStartTracking(start) => {
                if status.state != TrackerState::Tracking {
                    info!(update_rate_ms = start.update_rate_ms, "tracking started");
                    status.state = TrackerState::Tracking;
                }
                Response::ack()
            }
            Request::TrackerGetMarkerLocations(_) => {
                Response::TrackerGetMarkerLocations(TrackerGetMarkerLocationsResponse {
                    marker_locations: status.markers.clone(),
                })
            }
            Request::TrackerSetIdle(_) => {
                if status.state != TrackerState::Idle {
                    info!(from = ?status.state, "tracker idle");
                    status.state = TrackerState::Idle;
                }
                Response::ack()
            }
            _ => return Ok(None),
        };
        Ok(Some(response))
    }
}

impl TrackerSimulator {
    /// A simulated tracker advertising `name`, with the standard tracker
    /// service and characteristics.
    pub fn new(name: &str) -> Self {
        let peripheral = MemoryPeripheral::new(
            Some(name),
            TRACKER_SERVICE,
            TRACKER_WRITE_CHARACTERISTIC,
            TRACKER_NOTIFY_CHARACTERISTIC,
        );
        let core = ChannelCore::new("tracker-simulator");
        let status = Arc::new(Mutex::new(TrackerStatus::default()));
        let uuid = Uuid::new_v4().to_string();
        let behaviour = core.add_request_handler(Arc::new(TrackerBehaviour {
            uuid: uuid.clone(),
            status: status.clone(),
        }));
        Self {
            sink: Arc::new(NotifySink {
                peripheral: peripheral.clone(),
            }),
            peripheral,
            core,
            status,
            uuid,
            cancel: CancellationToken::new(),
            _behaviour: behaviour,
        }
    }

    /// The peripheral to place in range of a
    /// [`MemoryBluetooth`](tablelink_substrate::memory::MemoryBluetooth).
    pub fn peripheral(&self) -> MemoryPeripheral {
        self.peripheral.clone()
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn state(&self) -> TrackerState {
        lock(&self.status).state
    }

    /// Replace the marker positions the tracker reports.
    pub fn set_markers(&self, markers: MarkerLocations) {
        lock(&self.status).markers = markers;
    }

    /// Start answering the controller. Fails if already started.
    pub fn start(&self) -> Result<()> {
        let mut written = self
            .peripheral
            .take_written()
            .ok_or(ChannelError::Substrate(SubstrateError::Closed("tracker simulator")))?;
        let mut disconnected = self.peripheral.disconnected();
        let core = self.core.clone();
        let sink = self.sink.clone();
        let status = self.status.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    value = written.recv() => match value {
                        Some(value) => match decode_packet(value) {
                            Ok(packet) => core.dispatch(packet, sink.clone()),
                            Err(err) => warn!(error = %err, "tracker dropped undecodable write"),
                        },
                        None => break,
                    },
                    Some(()) = disconnected.recv() => {
                        // Work stops when the controller goes away.
                        lock(&status).state = TrackerState::Idle;
                        core.cancel_pending();
                        info!("controller disconnected, tracker idle");
                    }
                }
            }
            debug!("tracker simulator stopped");
        });
        Ok(())
    }

    /// Push the current marker positions to the controller and wait for its
    /// acknowledgement.
    pub async fn push_marker_update(&self) -> Result<Response> {
        let marker_locations = lock(&self.status).markers.clone();
        let request =
            Request::TrackerUpdateMarkerLocations(TrackerUpdateMarkerLocationsRequest {
                marker_locations,
            });
        self.core.request(self.sink.as_ref(), request).await
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TrackerSimulator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
