//! `WireMessage` implementations for every message in the catalogue.

use bytes::{Bytes, BytesMut};

use crate::catalogue::{
    request_field, response_field, PACKET_REQUEST, PACKET_REQUEST_ID, PACKET_RESPONSE,
};
use crate::codec::{
    for_each_field, get_bool, get_bytes, get_double, get_int32, get_message, get_string,
    get_uint32, put_bool, put_bytes, put_double, put_int32, put_message, put_optional_bytes,
    put_string, put_uint32, WireMessage, WireType,
};
use crate::error::{Result, WireError};
use crate::message::*;

/// Messages with no fields encode to nothing and ignore whatever they receive.
macro_rules! empty_message {
    ($($ty:ident),* $(,)?) => {
        $(
            impl WireMessage for $ty {
                fn encode_fields(&self, _dst: &mut BytesMut) {}

                fn decode(src: Bytes) -> Result<Self> {
                    for_each_field(src, |_, _, _| Ok(false))?;
                    Ok($ty {})
                }
            }
        )*
    };
}

empty_message!(
    HelloRequest,
    GetTableConfigurationRequest,
    GetCurrentSceneRequest,
    TrackerGetStatusRequest,
    TrackerGetCalibrationRequest,
    TrackerGetMarkerLocationsRequest,
    TrackerSetIdleRequest,
    AckResponse,
);

impl WireMessage for Packet {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_string(dst, PACKET_REQUEST_ID, &self.request_id);
        match &self.payload {
            Payload::Request(request) => put_message(dst, PACKET_REQUEST, request),
            Payload::Response(response) => put_message(dst, PACKET_RESPONSE, response),
        }
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut request_id = String::new();
        let mut payload = None;
        for_each_field(src, |field, wire_type, src| {
            match field {
                PACKET_REQUEST_ID => request_id = get_string(src, field, wire_type)?,
                PACKET_REQUEST => {
                    payload = Some(Payload::Request(get_message(src, field, wire_type)?))
                }
                PACKET_RESPONSE => {
                    payload = Some(Payload::Response(get_message(src, field, wire_type)?))
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        let payload = payload.ok_or(WireError::MissingPayload)?;
        Ok(Packet {
            request_id,
            payload,
        })
    }
}

impl WireMessage for Request {
    fn encode_fields(&self, dst: &mut BytesMut) {
        use request_field as f;
        match self {
            Request::Hello(m) => put_message(dst, f::HELLO, m),
            Request::GetAsset(m) => put_message(dst, f::GET_ASSET, m),
            Request::GetTableConfiguration(m) => put_message(dst, f::GET_TABLE_CONFIGURATION, m),
            Request::DisplayScene(m) => put_message(dst, f::DISPLAY_SCENE, m),
            Request::GetCurrentScene(m) => put_message(dst, f::GET_CURRENT_SCENE, m),
            Request::TrackerGetStatus(m) => put_message(dst, f::TRACKER_GET_STATUS, m),
            Request::TrackerStartTracking(m) => put_message(dst, f::TRACKER_START_TRACKING, m),
            Request::TrackerStartCalibration(m) => {
                put_message(dst, f::TRACKER_START_CALIBRATION, m)
            }
            Request::TrackerGetCalibration(m) => put_message(dst, f::TRACKER_GET_CALIBRATION, m),
            Request::TrackerGetMarkerLocations(m) => {
                put_message(dst, f::TRACKER_GET_MARKER_LOCATIONS, m)
            }
            Request::TrackerUpdateMarkerLocations(m) => {
                put_message(dst, f::TRACKER_UPDATE_MARKER_LOCATIONS, m)
            }
            Request::TrackerSetIdle(m) => put_message(dst, f::TRACKER_SET_IDLE, m),
        }
    }

    fn decode(src: Bytes) -> Result<Self> {
        use request_field as f;
        let mut selected = None;
        for_each_field(src, |field, wt, src| {
            selected = Some(match field {
                f::HELLO => Request::Hello(get_message(src, field, wt)?),
                f::GET_ASSET => Request::GetAsset(get_message(src, field, wt)?),
                f::GET_TABLE_CONFIGURATION => {
                    Request::GetTableConfiguration(get_message(src, field, wt)?)
                }
                f::DISPLAY_SCENE => Request::DisplayScene(get_message(src, field, wt)?),
                f::GET_CURRENT_SCENE => Request::GetCurrentScene(get_message(src, field, wt)?),
                f::TRACKER_GET_STATUS => Request::TrackerGetStatus(get_message(src, field, wt)?),
                f::TRACKER_START_TRACKING => {
                    Request::TrackerStartTracking(get_message(src, field, wt)?)
                }
                f::TRACKER_START_CALIBRATION => {
                    Request::TrackerStartCalibration(get_message(src, field, wt)?)
                }
                f::TRACKER_GET_CALIBRATION => {
                    Request::TrackerGetCalibration(get_message(src, field, wt)?)
                }
                f::TRACKER_GET_MARKER_LOCATIONS => {
                    Request::TrackerGetMarkerLocations(get_message(src, field, wt)?)
                }
                f::TRACKER_UPDATE_MARKER_LOCATIONS => {
                    Request::TrackerUpdateMarkerLocations(get_message(src, field, wt)?)
                }
                f::TRACKER_SET_IDLE => Request::TrackerSetIdle(get_message(src, field, wt)?),
                _ => return Ok(false),
            });
            Ok(true)
        })?;
        selected.ok_or(WireError::EmptyOneof("Request"))
    }
}

impl WireMessage for Response {
    fn encode_fields(&self, dst: &mut BytesMut) {
        use response_field as f;
        match self {
            Response::Ack(m) => put_message(dst, f::ACK, m),
            Response::GetAsset(m) => put_message(dst, f::GET_ASSET, m),
            Response::GetTableConfiguration(m) => {
                put_message(dst, f::GET_TABLE_CONFIGURATION, m)
            }
            Response::GetCurrentScene(m) => put_message(dst, f::GET_CURRENT_SCENE, m),
            Response::TrackerGetStatus(m) => put_message(dst, f::TRACKER_GET_STATUS, m),
            Response::TrackerGetCalibration(m) => put_message(dst, f::TRACKER_GET_CALIBRATION, m),
            Response::TrackerGetMarkerLocations(m) => {
                put_message(dst, f::TRACKER_GET_MARKER_LOCATIONS, m)
            }
        }
    }

    fn decode(src: Bytes) -> Result<Self> {
        use response_field as f;
        let mut selected = None;
        for_each_field(src, |field, wt, src| {
            selected = Some(match field {
                f::ACK => Response::Ack(get_message(src, field, wt)?),
                f::GET_ASSET => Response::GetAsset(get_message(src, field, wt)?),
                f::GET_TABLE_CONFIGURATION => {
                    Response::GetTableConfiguration(get_message(src, field, wt)?)
                }
                f::GET_CURRENT_SCENE => Response::GetCurrentScene(get_message(src, field, wt)?),
                f::TRACKER_GET_STATUS => Response::TrackerGetStatus(get_message(src, field, wt)?),
                f::TRACKER_GET_CALIBRATION => {
                    Response::TrackerGetCalibration(get_message(src, field, wt)?)
                }
                f::TRACKER_GET_MARKER_LOCATIONS => {
                    Response::TrackerGetMarkerLocations(get_message(src, field, wt)?)
                }
                _ => return Ok(false),
            });
            Ok(true)
        })?;
        selected.ok_or(WireError::EmptyOneof("Response"))
    }
}

// ---------------------------------------------------------------------------
// Shared value types
// ---------------------------------------------------------------------------

impl WireMessage for Vector2D {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_double(dst, 1, self.x);
        put_double(dst, 2, self.y);
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = Vector2D::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.x = get_double(src, field, wt)?,
                2 => out.y = get_double(src, field, wt)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for Resolution {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_uint32(dst, 1, self.width);
        put_uint32(dst, 2, self.height);
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = Resolution::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.width = get_uint32(src, field, wt)?,
                2 => out.height = get_uint32(src, field, wt)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl TrackerState {
    fn to_wire(self) -> i32 {
        match self {
            TrackerState::Idle => 0,
            TrackerState::Calibrating => 1,
            TrackerState::Tracking => 2,
        }
    }

    fn from_wire(value: i32) -> Result<Self> {
        match value {
            0 => Ok(TrackerState::Idle),
            1 => Ok(TrackerState::Calibrating),
            2 => Ok(TrackerState::Tracking),
            value => Err(WireError::UnknownEnumValue {
                name: "TrackerState",
                value,
            }),
        }
    }
}

/// One `map<int32, Vector2D>` entry: key = 1, value = 2.
struct MarkerEntry {
    id: i32,
    location: Vector2D,
}

impl WireMessage for MarkerEntry {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_int32(dst, 1, self.id);
        put_message(dst, 2, &self.location);
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut entry = MarkerEntry {
            id: 0,
            location: Vector2D::default(),
        };
        for_each_field(src, |field, wt, src| {
            match field {
                1 => entry.id = get_int32(src, field, wt)?,
                2 => entry.location = get_message(src, field, wt)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(entry)
    }
}

fn put_marker_locations(dst: &mut BytesMut, field: u32, locations: &MarkerLocations) {
    for (&id, &location) in locations {
        put_message(dst, field, &MarkerEntry { id, location });
    }
}

fn get_marker_entry(
    locations: &mut MarkerLocations,
    src: &mut Bytes,
    field: u32,
    wt: WireType,
) -> Result<()> {
    let entry: MarkerEntry = get_message(src, field, wt)?;
    locations.insert(entry.id, entry.location);
    Ok(())
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

impl WireMessage for GetAssetRequest {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_string(dst, 1, &self.id);
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = GetAssetRequest::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.id = get_string(src, field, wt)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for DisplaySceneRequest {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_optional_bytes(dst, 1, self.scene.as_ref());
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = DisplaySceneRequest::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.scene = Some(get_bytes(src, field, wt)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for TrackerStartTrackingRequest {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_uint32(dst, 1, self.update_rate_ms);
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = TrackerStartTrackingRequest::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.update_rate_ms = get_uint32(src, field, wt)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for TrackerStartCalibrationRequest {
    fn encode_fields(&self, dst: &mut BytesMut) {
        for corner in &self.corners {
            put_message(dst, 1, corner);
        }
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = TrackerStartCalibrationRequest::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.corners.push(get_message(src, field, wt)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for TrackerUpdateMarkerLocationsRequest {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_marker_locations(dst, 1, &self.marker_locations);
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = TrackerUpdateMarkerLocationsRequest::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => get_marker_entry(&mut out.marker_locations, src, field, wt)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

impl WireMessage for GetAssetResponse {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_string(dst, 1, &self.id);
        put_bytes(dst, 2, &self.payload);
        put_string(dst, 3, &self.media_type);
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = GetAssetResponse::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.id = get_string(src, field, wt)?,
                2 => out.payload = get_bytes(src, field, wt)?,
                3 => out.media_type = get_string(src, field, wt)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for GetTableConfigurationResponse {
    fn encode_fields(&self, dst: &mut BytesMut) {
        if let Some(resolution) = &self.resolution {
            put_message(dst, 1, resolution);
        }
        put_double(dst, 2, self.size);
        put_bool(dst, 3, self.play_audio_on_table);
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = GetTableConfigurationResponse::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.resolution = Some(get_message(src, field, wt)?),
                2 => out.size = get_double(src, field, wt)?,
                3 => out.play_audio_on_table = get_bool(src, field, wt)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for GetCurrentSceneResponse {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_optional_bytes(dst, 1, self.scene.as_ref());
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = GetCurrentSceneResponse::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.scene = Some(get_bytes(src, field, wt)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for TrackerGetStatusResponse {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_string(dst, 1, &self.uuid);
        put_string(dst, 2, &self.version);
        put_int32(dst, 3, self.state.to_wire());
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = TrackerGetStatusResponse::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.uuid = get_string(src, field, wt)?,
                2 => out.version = get_string(src, field, wt)?,
                3 => out.state = TrackerState::from_wire(get_int32(src, field, wt)?)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for TrackerGetCalibrationResponse {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_bool(dst, 1, self.found_corners);
        for corner in &self.corner_locations {
            put_message(dst, 2, corner);
        }
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = TrackerGetCalibrationResponse::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => out.found_corners = get_bool(src, field, wt)?,
                2 => out.corner_locations.push(get_message(src, field, wt)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

impl WireMessage for TrackerGetMarkerLocationsResponse {
    fn encode_fields(&self, dst: &mut BytesMut) {
        put_marker_locations(dst, 1, &self.marker_locations);
    }

    fn decode(src: Bytes) -> Result<Self> {
        let mut out = TrackerGetMarkerLocationsResponse::default();
        for_each_field(src, |field, wt, src| {
            match field {
                1 => get_marker_entry(&mut out.marker_locations, src, field, wt)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_packet, encode_packet};

    #[test]
    fn test_marker_map_survives_negative_ids() {
        let mut marker_locations = MarkerLocations::new();
        marker_locations.insert(-3, Vector2D { x: 0.5, y: 0.125 });
        marker_locations.insert(42, Vector2D { x: 1.0, y: 0.0 });
        let packet = Packet::request(
            "markers",
            Request::TrackerUpdateMarkerLocations(TrackerUpdateMarkerLocationsRequest {
                marker_locations,
            }),
        );

        let decoded = decode_packet(encode_packet(&packet)).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_empty_scene_keeps_presence() {
        let present = DisplaySceneRequest {
            scene: Some(Bytes::new()),
        };
        let absent = DisplaySceneRequest { scene: None };

        assert_eq!(present.to_bytes().as_ref(), &[0x0a, 0x00]);
        assert!(absent.to_bytes().is_empty());

        let decoded = DisplaySceneRequest::decode(present.to_bytes()).unwrap();
        assert_eq!(decoded.scene, Some(Bytes::new()));
    }

    #[test]
    fn test_default_scalars_are_omitted() {
        let status = TrackerGetStatusResponse::default();
        assert!(status.to_bytes().is_empty());

        let config = GetTableConfigurationResponse::default();
        assert!(config.to_bytes().is_empty());
    }

    #[test]
    fn test_tracker_state_values() {
        let status = TrackerGetStatusResponse {
            uuid: "dev-1".into(),
            version: "v0.3.0".into(),
            state: TrackerState::Tracking,
        };
        let decoded = TrackerGetStatusResponse::decode(status.to_bytes()).unwrap();
        assert_eq!(decoded, status);

        // field 3 varint 9
        let bogus = Bytes::from_static(&[0x18, 0x09]);
        assert_eq!(
            TrackerGetStatusResponse::decode(bogus),
            Err(WireError::UnknownEnumValue {
                name: "TrackerState",
                value: 9
            })
        );
    }

    #[test]
    fn test_calibration_corners_keep_order() {
        let corners = vec![
            Vector2D { x: 0.0, y: 0.0 },
            Vector2D { x: 1.0, y: 0.0 },
            Vector2D { x: 1.0, y: 1.0 },
            Vector2D { x: 0.0, y: 1.0 },
        ];
        let packet = Packet::response(
            "cal",
            Response::TrackerGetCalibration(TrackerGetCalibrationResponse {
                found_corners: true,
                corner_locations: corners.clone(),
            }),
        );
        let decoded = decode_packet(encode_packet(&packet)).unwrap();
        match decoded.payload {
            Payload::Response(Response::TrackerGetCalibration(cal)) => {
                assert!(cal.found_corners);
                assert_eq!(cal.corner_locations, corners);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_empty_messages_ignore_unknown_fields() {
        let src = Bytes::from_static(&[0x08, 0x01]);
        assert_eq!(HelloRequest::decode(src).unwrap(), HelloRequest {});
    }
}
