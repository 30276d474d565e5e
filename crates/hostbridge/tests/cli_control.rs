#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

fn start_serve(config: &Path, extra: &[&str]) -> (Child, BufReader<ChildStdout>, u16) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_hostbridge"))
        .args(["--log-level", "error", "--format", "json", "serve", "--port", "0", "--config"])
        .arg(config)
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    let mut stdout = BufReader::new(child.stdout.take().expect("stdout should be piped"));
    let mut line = String::new();
    stdout.read_line(&mut line).expect("listening line");
    let listening: Value = serde_json::from_str(&line).expect("listening line should be json");
    assert_eq!(listening["event"], "listening");
    let port = listening["port"].as_u64().expect("port should be a number") as u16;
    (child, stdout, port)
}

fn send(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hostbridge"))
        .args(["--log-level", "error", "--format", "json", "send"])
        .args(args)
        .output()
        .expect("send should run")
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> i32 {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("try_wait should succeed") {
            return status.code().unwrap_or(-1);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("serve did not exit within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn remaining_events(mut stdout: BufReader<ChildStdout>) -> Vec<Value> {
    let mut rest = String::new();
    stdout.read_to_string(&mut rest).expect("serve stdout");
    rest.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("event line should be json"))
        .collect()
}

#[test]
fn send_round_trips_through_serve() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = dir.path().join("shared_config.json");
    let (mut child, stdout, port) = start_serve(&config, &["--count", "2"]);
    let port_arg = port.to_string();

    let pong = send(&[port_arg.as_str(), "--ping"]);
    assert_eq!(pong.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&pong.stdout).trim(), "PONG");

    let reply = send(&[port_arg.as_str(), "--function", "stop", "--id", "7", "--wait"]);
    assert_eq!(reply.status.code(), Some(0));
    let ack: Value = serde_json::from_slice(&reply.stdout).expect("reply should be json");
    assert_eq!(ack["event"], "reply");
    assert_eq!(ack["function"], "start");
    assert!(ack.get("id").is_none(), "default ack carries no id");

    // No target: the port persisted by `serve` is used.
    let unknown = send(&[
        "--config",
        config.to_str().expect("utf-8 temp path"),
        "--function",
        "scene_changed",
        "--data",
        r#"{"client":"overlay"}"#,
    ]);
    assert_eq!(unknown.status.code(), Some(0));

    assert_eq!(wait_for_exit(&mut child, Duration::from_secs(10)), 0);

    let events = remaining_events(stdout);
    let command = events
        .iter()
        .find(|event| event["event"] == "command")
        .expect("command event");
    assert_eq!(command["function"], "stop");
    assert_eq!(command["id"], "7");

    let unhandled = events
        .iter()
        .find(|event| event["event"] == "unhandled")
        .expect("unhandled event");
    assert_eq!(unhandled["function"], "scene_changed");
    assert_eq!(unhandled["data"]["client"], "overlay");

    assert!(events.iter().any(|event| event["event"] == "connected"));
}

#[test]
fn quit_verb_stops_serve() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut child, stdout, port) = start_serve(&dir.path().join("shared_config.json"), &[]);

    let output = send(&[port.to_string().as_str(), "--function", "quit"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(wait_for_exit(&mut child, Duration::from_secs(10)), 0);

    let events = remaining_events(stdout);
    assert!(events
        .iter()
        .any(|event| event["event"] == "command" && event["function"] == "quit"));
}

#[test]
fn echo_ack_policy_replies_with_inbound_verb() {
    let dir = tempfile::tempdir().expect("temp dir");
    let (mut child, _stdout, port) =
        start_serve(&dir.path().join("shared_config.json"), &["--ack", "echo", "--count", "1"]);

    let port = port.to_string();
    let reply = send(&[port.as_str(), "--function", "restart", "--id", "abc", "--wait"]);
    assert_eq!(reply.status.code(), Some(0));
    let ack: Value = serde_json::from_slice(&reply.stdout).expect("reply should be json");
    assert_eq!(ack["function"], "restart");
    assert_eq!(ack["id"], "abc");

    assert_eq!(wait_for_exit(&mut child, Duration::from_secs(10)), 0);
}

#[test]
fn send_to_closed_port_fails() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
        listener.local_addr().expect("local addr").port()
    };

    let output = send(&[port.to_string().as_str(), "--function", "start"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn invalid_data_is_usage_error() {
    let output = send(&["9", "--function", "start", "--data", "[1]"]);
    assert_eq!(output.status.code(), Some(64));
}
