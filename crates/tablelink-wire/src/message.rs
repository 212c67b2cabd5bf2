use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::catalogue::{request_name, response_name};

/// The unit placed on every transport: a request id plus one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Opaque token pairing a request with its response.
    pub request_id: String,
    /// Either a request or a response, never both.
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Request(Request),
    Response(Response),
}

impl Packet {
    /// Create a request packet.
    pub fn request(request_id: impl Into<String>, request: Request) -> Self {
        Self {
            request_id: request_id.into(),
            payload: Payload::Request(request),
        }
    }

    /// Create a response packet.
    pub fn response(request_id: impl Into<String>, response: Response) -> Self {
        Self {
            request_id: request_id.into(),
            payload: Payload::Response(response),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.payload, Payload::Request(_))
    }

    /// "Request" or "Response".
    pub fn kind(&self) -> &'static str {
        match self.payload {
            Payload::Request(_) => "Request",
            Payload::Response(_) => "Response",
        }
    }

    /// Name of the selected message case, e.g. `get_asset`.
    pub fn message_name(&self) -> &'static str {
        match &self.payload {
            Payload::Request(request) => request_name(request),
            Payload::Response(response) => response_name(response),
        }
    }
}

/// Requests understood by displays, controllers and trackers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    Hello(HelloRequest),
    GetAsset(GetAssetRequest),
    GetTableConfiguration(GetTableConfigurationRequest),
    DisplayScene(DisplaySceneRequest),
    GetCurrentScene(GetCurrentSceneRequest),
    TrackerGetStatus(TrackerGetStatusRequest),
    TrackerStartTracking(TrackerStartTrackingRequest),
    TrackerStartCalibration(TrackerStartCalibrationRequest),
    TrackerGetCalibration(TrackerGetCalibrationRequest),
    TrackerGetMarkerLocations(TrackerGetMarkerLocationsRequest),
    TrackerUpdateMarkerLocations(TrackerUpdateMarkerLocationsRequest),
    TrackerSetIdle(TrackerSetIdleRequest),
}

/// Responses paired with [`Request`] cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ack(AckResponse),
    GetAsset(GetAssetResponse),
    GetTableConfiguration(GetTableConfigurationResponse),
    GetCurrentScene(GetCurrentSceneResponse),
    TrackerGetStatus(TrackerGetStatusResponse),
    TrackerGetCalibration(TrackerGetCalibrationResponse),
    TrackerGetMarkerLocations(TrackerGetMarkerLocationsResponse),
}

impl Request {
    pub fn hello() -> Self {
        Self::Hello(HelloRequest {})
    }
}

impl Response {
    pub fn ack() -> Self {
        Self::Ack(AckResponse {})
    }
}

/// Marker id to normalized table position.
pub type MarkerLocations = BTreeMap<i32, Vector2D>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2D {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    #[default]
    Idle,
    Calibrating,
    Tracking,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAssetRequest {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTableConfigurationRequest {}

/// Scene to show on the table. The scene document travels pre-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySceneRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<Bytes>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCurrentSceneRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerGetStatusRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStartTrackingRequest {
    #[serde(default)]
    pub update_rate_ms: u32,
}

/// Real-world corner positions the tracker should locate during calibration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerStartCalibrationRequest {
    #[serde(default)]
    pub corners: Vec<Vector2D>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerGetCalibrationRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerGetMarkerLocationsRequest {}

/// Unsolicited marker positions pushed by the tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerUpdateMarkerLocationsRequest {
    #[serde(default)]
    pub marker_locations: MarkerLocations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSetIdleRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAssetResponse {
    pub id: String,
    #[serde(default)]
    pub payload: Bytes,
    #[serde(default)]
    pub media_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTableConfigurationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Screen diagonal in inches.
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub play_audio_on_table: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCurrentSceneResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<Bytes>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerGetStatusResponse {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub state: TrackerState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerGetCalibrationResponse {
    #[serde(default)]
    pub found_corners: bool,
    #[serde(default)]
    pub corner_locations: Vec<Vector2D>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerGetMarkerLocationsResponse {
    #[serde(default)]
    pub marker_locations: MarkerLocations,
}
