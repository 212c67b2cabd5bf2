#![cfg(feature = "cli")]

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn tablelink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tablelink"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("tablelink should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn version_prints_package_version() {
    let output = tablelink(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output).trim(),
        format!("tablelink {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn info_reports_tracker_identifiers() {
    let output = tablelink(&["--format", "json", "info"]);
    assert!(output.status.success());
    let info: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("info should print json");
    assert_eq!(info["display_route"], "/table");
    assert_eq!(info["window_name"], "tablelink-external-window");
    assert_eq!(
        info["tracker"]["service"],
        "12342233-0000-1000-8000-00805f9b34fb"
    );
    assert_eq!(info["tracker"]["name_prefix"], "table-camera");
}

#[test]
fn decode_known_packet() {
    let output = tablelink(&["--format", "json", "decode", "0a016112051203 0a0162"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let packet: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("decode should print json");
    assert_eq!(packet["request_id"], "a");
    assert_eq!(packet["kind"], "Request");
    assert_eq!(packet["message"], "get_asset");
    assert_eq!(packet["payload"]["request"]["get_asset"]["id"], "b");
}

#[test]
fn encoded_request_decodes_back() {
    let encoded = tablelink(&[
        "--format",
        "pretty",
        "encode",
        "--request",
        r#"{"tracker_start_tracking":{"update_rate_ms":250}}"#,
        "--request-id",
        "req-7",
        "--encoding",
        "base64",
    ]);
    assert!(encoded.status.success());
    let text = stdout(&encoded);

    let decoded = tablelink(&[
        "--format",
        "json",
        "decode",
        "--encoding",
        "base64",
        text.trim(),
    ]);
    assert!(decoded.status.success());
    let packet: serde_json::Value = serde_json::from_str(stdout(&decoded).trim()).unwrap();
    assert_eq!(packet["request_id"], "req-7");
    assert_eq!(
        packet["payload"]["request"]["tracker_start_tracking"]["update_rate_ms"],
        250
    );
}

#[test]
fn decode_stream_from_stdin() {
    let first = tablelink(&[
        "--format", "pretty", "encode", "--request", r#"{"hello":{}}"#, "--request-id", "1",
        "--length-delimited",
    ]);
    let second = tablelink(&[
        "--format", "pretty", "encode", "--response", r#"{"ack":{}}"#, "--request-id", "1",
        "--length-delimited",
    ]);
    let stream = format!("{}{}", stdout(&first).trim(), stdout(&second).trim());

    let mut child = Command::new(env!("CARGO_BIN_EXE_tablelink"))
        .args(["--log-level", "error", "--format", "json", "decode", "--stream"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("decode should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(stream.as_bytes())
        .expect("stdin should accept input");
    let output = child.wait_with_output().expect("decode should finish");

    assert!(output.status.success());
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"message\":\"hello\""));
    assert!(lines[1].contains("\"message\":\"ack\""));
}

#[test]
fn malformed_packet_exits_60() {
    let output = tablelink(&["decode", "ffffffff"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("decode failed"));
}

#[test]
fn invalid_request_json_exits_60() {
    let output = tablelink(&["encode", "--request", r#"{"launch":{}}"#]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn loopback_over_window() {
    let output = tablelink(&["--format", "json", "loopback", "--display", "window"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(report["ok"], true);
    assert_eq!(report["display"], "window");
    assert_eq!(report["exchanges"][0]["request"], "hello");
    assert_eq!(report["exchanges"][0]["response"], "ack");
}

#[test]
fn loopback_over_session_with_tracker() {
    let output = tablelink(&[
        "--format",
        "json",
        "loopback",
        "--display",
        "session",
        "--tracker",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(report["ok"], true);
    let tracker_exchanges = report["exchanges"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["channel"] == "tracker")
        .count();
    assert_eq!(tracker_exchanges, 7);
}

#[test]
fn invalid_timeout_is_usage_error() {
    let output = tablelink(&["loopback", "--timeout", "soon"]);
    assert_eq!(output.status.code(), Some(64));
}
