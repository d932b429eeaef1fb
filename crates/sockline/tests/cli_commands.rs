#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn sockline(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sockline"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("sockline should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn decode_reports_inner_packet() {
    let output = sockline(&["--format", "json", "decode", r#"42/chat,5["message",{"text":"hi"}]"#]);
    let out = stdout_json(&output);
    assert_eq!(out["packet_type"], "message");
    assert_eq!(out["message"]["kind"], "event");
    assert_eq!(out["message"]["namespace"], "/chat");
    assert_eq!(out["message"]["id"], 5);
    assert_eq!(out["message"]["event"], "message");
}

#[test]
fn decode_reports_open_parameters() {
    let output = sockline(&[
        "--format",
        "json",
        "decode",
        r#"0{"sid":"s1","upgrades":["websocket"],"pingInterval":10000,"pingTimeout":5000}"#,
    ]);
    let out = stdout_json(&output);
    assert_eq!(out["packet_type"], "open");
    assert_eq!(out["open"]["sid"], "s1");
    assert_eq!(out["open"]["pingInterval"], 10000);
}

#[test]
fn decode_malformed_frame_returns_60() {
    let output = sockline(&["decode", "9nonsense"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("malformed frame"));
}

#[test]
fn encode_pretty_prints_the_frame() {
    let output = sockline(&[
        "--format",
        "pretty",
        "encode",
        "join",
        "--namespace",
        "/rooms",
        "--args",
        r#"["lobby"]"#,
    ]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"42/rooms,["join","lobby"]"#
    );
}

#[test]
fn encoded_frame_decodes_back() {
    let encoded = sockline(&["--format", "json", "encode", "ask", "--id", "12", "--args", "[1,2]"]);
    let frame = stdout_json(&encoded)["frame"]
        .as_str()
        .expect("frame field")
        .to_string();

    let decoded = stdout_json(&sockline(&["--format", "json", "decode", &frame]));
    assert_eq!(decoded["message"]["id"], 12);
    assert_eq!(decoded["message"]["data"], serde_json::json!(["ask", 1, 2]));
}

#[test]
fn encode_rejects_non_array_args() {
    let output = sockline(&["encode", "x", "--args", r#"{"a":1}"#]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn unpack_lists_every_packet() {
    let output = sockline(&["--format", "json", "unpack", r#"1:28:42["hi"]"#]);
    let out = stdout_json(&output);
    assert_eq!(out["count"], 2);
    assert_eq!(out["packets"][0]["packet_type"], "ping");
    assert_eq!(out["packets"][1]["content"], r#"42["hi"]"#);
}

#[test]
fn version_prints_crate_version() {
    let output = sockline(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("sockline {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn extended_version_reports_build_metadata() {
    let output = sockline(&["version", "--extended"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("protocol: EIO=4"), "{stdout}");
    assert!(stdout.contains("build_target: "), "{stdout}");
    assert!(stdout.contains("build_profile: "), "{stdout}");
}
