use serde::Serialize;
use tablelink_channel::{
    DisplayKind, PeripheralConfig, SessionConfig, WindowConfig, DISPLAY_ROUTE,
    TRACKER_NAME_PREFIX, TRACKER_NOTIFY_CHARACTERISTIC, TRACKER_SERVICE,
    TRACKER_WRITE_CHARACTERISTIC, WINDOW_NAME,
};

use crate::cmd::InfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct InfoOutput {
    display_route: &'static str,
    window_name: &'static str,
    display_order: Vec<&'static str>,
    availability_timeout_ms: u64,
    liveness_poll_interval_ms: u64,
    tracker: TrackerInfo,
}

#[derive(Serialize)]
struct TrackerInfo {
    name_prefix: &'static str,
    service: String,
    write_characteristic: String,
    notify_characteristic: String,
    filters: usize,
}

pub fn run(_args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let out = collect();
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => print_text(&out),
    }
    Ok(SUCCESS)
}

fn collect() -> InfoOutput {
    InfoOutput {
        display_route: DISPLAY_ROUTE,
        window_name: WINDOW_NAME,
        display_order: DisplayKind::ALL.iter().map(|kind| kind.as_str()).collect(),
        availability_timeout_ms: SessionConfig::default().availability_timeout.as_millis() as u64,
        liveness_poll_interval_ms: WindowConfig::default().liveness_poll_interval.as_millis() as u64,
        tracker: TrackerInfo {
            name_prefix: TRACKER_NAME_PREFIX,
            service: TRACKER_SERVICE.to_string(),
            write_characteristic: TRACKER_WRITE_CHARACTERISTIC.to_string(),
            notify_characteristic: TRACKER_NOTIFY_CHARACTERISTIC.to_string(),
            filters: PeripheralConfig::default().filters.len(),
        },
    }
}

fn print_text(out: &InfoOutput) {
    println!("Display:");
    println!("  Route:                 {}", out.display_route);
    println!("  Window name:           {}", out.window_name);
    println!("  Preference order:      {}", out.display_order.join(", "));
    println!("  Availability timeout:  {}ms", out.availability_timeout_ms);
    println!("  Window liveness poll:  {}ms", out.liveness_poll_interval_ms);
    println!("Tracker:");
    println!("  Name prefix:           {}", out.tracker.name_prefix);
    println!("  Service:               {}", out.tracker.service);
    println!("  Write characteristic:  {}", out.tracker.write_characteristic);
    println!("  Notify characteristic: {}", out.tracker.notify_characteristic);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_fixed_identifiers() {
        let out = collect();
        assert_eq!(out.display_route, "/table");
        assert_eq!(out.display_order, ["session", "window"]);
        assert_eq!(out.tracker.service, "12342233-0000-1000-8000-00805f9b34fb");
        assert_eq!(
            out.tracker.notify_characteristic,
            "12343345-0000-1000-8000-00805f9b34fb"
        );
    }
}
