//! Message catalogue: field numbers and case names.
//!
//! `Packet`:   1 = request_id, 2 = request, 3 = response.
//! `Request` and `Response` are oneofs; display cases use 1-9, tracker cases
//! start at 10.

use crate::message::{Request, Response};

pub const PACKET_REQUEST_ID: u32 = 1;
pub const PACKET_REQUEST: u32 = 2;
pub const PACKET_RESPONSE: u32 = 3;

/// Oneof field numbers of `Request`.
pub mod request_field {
    pub const HELLO: u32 = 1;
    pub const GET_ASSET: u32 = 2;
    pub const GET_TABLE_CONFIGURATION: u32 = 3;
    pub const DISPLAY_SCENE: u32 = 4;
    pub const GET_CURRENT_SCENE: u32 = 5;
    pub const TRACKER_GET_STATUS: u32 = 10;
    pub const TRACKER_START_TRACKING: u32 = 11;
    pub const TRACKER_START_CALIBRATION: u32 = 12;
    pub const TRACKER_GET_CALIBRATION: u32 = 13;
    pub const TRACKER_GET_MARKER_LOCATIONS: u32 = 14;
    pub const TRACKER_UPDATE_MARKER_LOCATIONS: u32 = 15;
    pub const TRACKER_SET_IDLE: u32 = 16;
}

/// Oneof field numbers of `Response`.
pub mod response_field {
    pub const ACK: u32 = 1;
    pub const GET_ASSET: u32 = 2;
    pub const GET_TABLE_CONFIGURATION: u32 = 3;
    pub const GET_CURRENT_SCENE: u32 = 5;
    pub const TRACKER_GET_STATUS: u32 = 10;
    pub const TRACKER_GET_CALIBRATION: u32 = 13;
    pub const TRACKER_GET_MARKER_LOCATIONS: u32 = 14;
}

/// Returns the case name of a request.
pub fn request_name(request: &Request) -> &'static str {
    match request {
        Request::Hello(_) => "hello",
        Request::GetAsset(_) => "get_asset",
        Request::GetTableConfiguration(_) => "get_table_configuration",
        Request::DisplayScene(_) => "display_scene",
        Request::GetCurrentScene(_) => "get_current_scene",
        Request::TrackerGetStatus(_) => "tracker_get_status",
        Request::TrackerStartTracking(_) => "tracker_start_tracking",
        Request::TrackerStartCalibration(_) => "tracker_start_calibration",
        Request::TrackerGetCalibration(_) => "tracker_get_calibration",
        Request::TrackerGetMarkerLocations(_) => "tracker_get_marker_locations",
        Request::TrackerUpdateMarkerLocations(_) => "tracker_update_marker_locations",
        Request::TrackerSetIdle(_) => "tracker_set_idle",
    }
}

/// Returns the case name of a response.
pub fn response_name(response: &Response) -> &'static str {
    match response {
        Response::Ack(_) => "ack",
        Response::GetAsset(_) => "get_asset",
        Response::GetTableConfiguration(_) => "get_table_configuration",
        Response::GetCurrentScene(_) => "get_current_scene",
        Response::TrackerGetStatus(_) => "tracker_get_status",
        Response::TrackerGetCalibration(_) => "tracker_get_calibration",
        Response::TrackerGetMarkerLocations(_) => "tracker_get_marker_locations",
    }
}

/// Returns the response case a peer is expected to answer `request` with.
///
/// The channel layer never enforces this pairing; callers use it to check
/// what they got back.
pub fn expected_response_name(request: &Request) -> &'static str {
    match request {
        Request::GetAsset(_) => "get_asset",
        Request::GetTableConfiguration(_) => "get_table_configuration",
        Request::GetCurrentScene(_) => "get_current_scene",
        Request::TrackerGetStatus(_) => "tracker_get_status",
        Request::TrackerGetCalibration(_) => "tracker_get_calibration",
        Request::TrackerGetMarkerLocations(_) => "tracker_get_marker_locations",
        Request::Hello(_)
        | Request::DisplayScene(_)
        | Request::TrackerStartTracking(_)
        | Request::TrackerStartCalibration(_)
        | Request::TrackerUpdateMarkerLocations(_)
        | Request::TrackerSetIdle(_) => "ack",
    }
}

/// Returns true if the request belongs to the tracker peripheral.
pub fn is_tracker_request(request: &Request) -> bool {
    request_name(request).starts_with("tracker_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{GetAssetRequest, TrackerSetIdleRequest};

    #[test]
    fn pairing_maps_fetches_to_their_own_case() {
        let request = Request::GetAsset(GetAssetRequest { id: "a".into() });
        assert_eq!(expected_response_name(&request), "get_asset");
        assert_eq!(expected_response_name(&Request::hello()), "ack");
    }

    #[test]
    fn tracker_requests_are_recognized() {
        assert!(is_tracker_request(&Request::TrackerSetIdle(
            TrackerSetIdleRequest {}
        )));
        assert!(!is_tracker_request(&Request::hello()));
    }
}
