//! Packet model and binary codec for the tablelink display channel protocol.
//!
//! Every exchange between a controller and a display surface or tracker is a
//! [`Packet`]: a request id plus exactly one [`Request`] or [`Response`].
//! Packets are encoded with the protobuf wire format so they interoperate with
//! the existing display and tracker peers:
//! - varint keys and integers
//! - `double` fields as little-endian fixed64 (no precision loss)
//! - sub-messages and strings length-delimited
//!
//! Unknown fields are skipped on decode.

pub mod catalogue;
pub mod codec;
pub mod encoding;
pub mod error;
pub mod message;

pub use catalogue::{request_name, response_name, expected_response_name};
pub use codec::{
    decode_length_delimited, decode_packet, encode_length_delimited, encode_packet, WireMessage,
    WireType, DEFAULT_MAX_PACKET,
};
pub use error::{Result, WireError};
pub use message::{
    AckResponse, DisplaySceneRequest, GetAssetRequest, GetAssetResponse, GetCurrentSceneRequest,
    GetCurrentSceneResponse, GetTableConfigurationRequest, GetTableConfigurationResponse,
    HelloRequest, MarkerLocations, Packet, Payload, Request, Resolution, Response,
    TrackerGetCalibrationRequest, TrackerGetCalibrationResponse, TrackerGetMarkerLocationsRequest,
    TrackerGetMarkerLocationsResponse, TrackerGetStatusRequest, TrackerGetStatusResponse,
    TrackerSetIdleRequest, TrackerStartCalibrationRequest, TrackerStartTrackingRequest,
    TrackerState, TrackerUpdateMarkerLocationsRequest, Vector2D,
};
