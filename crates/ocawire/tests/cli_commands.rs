#![cfg(feature = "cli")]

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn ocawire(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ocawire"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("ocawire should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn keepalive_short_form_hex() {
    let output = ocawire(&["--format", "pretty", "keepalive", "3s"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "3b00010000000b0400010003");
}

#[test]
fn keepalive_long_form_json() {
    let output = ocawire(&["--format", "json", "keepalive", "2500"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("\"message_type\":\"KeepAlive\""));
    assert!(text.contains("\"length\":14"));
    assert!(text.contains("000009c4\""));
}

#[test]
fn command_then_decode_in_small_chunks() {
    let encoded = ocawire(&[
        "--format", "pretty", "command", "--target", "4096", "--level", "4", "--index", "2",
        "--rrq", "--handle", "77", "--params", "c0d00000",
    ]);
    assert!(encoded.status.success());
    let hex = stdout(&encoded);

    let decoded = ocawire(&["--format", "json", "decode", hex.trim(), "--chunk-size", "3"]);
    assert!(decoded.status.success());
    let text = stdout(&decoded);
    assert!(text.contains("\"message_type\":\"CommandRrq\""));
    assert!(text.contains("\"handle\":77"));
    assert!(text.contains("\"target\":4096"));
    assert!(text.contains("\"method\":\"4.2\""));
    assert!(text.contains("\"params\":\"c0d00000\""));
}

#[test]
fn decode_binary_from_stdin() {
    let frame = [0x3b, 0x00, 0x01, 0x00, 0x00, 0x00, 0x0b, 0x04, 0x00, 0x01, 0x00, 0x05];
    let mut child = Command::new(env!("CARGO_BIN_EXE_ocawire"))
        .args(["--log-level", "error", "--format", "pretty", "decode"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("decode should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(&frame)
        .expect("stdin should accept frame");
    let output = child.wait_with_output().expect("decode should finish");

    assert!(output.status.success());
    assert!(stdout(&output).contains("KeepAlive interval=5000ms"));
}

#[test]
fn decode_bad_sync_exits_60() {
    let output = ocawire(&["decode", "00000100000009000001"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("bad sync"));
}

#[test]
fn decode_truncated_frame_exits_60() {
    let output = ocawire(&["decode", "3b00010000000b04000100"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn decode_invalid_hex_exits_64() {
    let output = ocawire(&["decode", "3b0"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_name() {
    let output = ocawire(&["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("ocawire "));
}
