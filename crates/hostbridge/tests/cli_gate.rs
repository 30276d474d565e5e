#![cfg(feature = "cli")]

use std::process::{Command, Output};

use serde_json::Value;

fn hostbridge(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hostbridge"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("hostbridge should run")
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be json"))
        .collect()
}

#[test]
fn allowed_channel_exits_zero() {
    let output = hostbridge(&["gate", "settings.get", "--mode", "invoke"]);
    assert_eq!(output.status.code(), Some(0));

    let rows = json_lines(&output);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["channel"], "settings.get");
    assert_eq!(rows[0]["mode"], "invoke");
    assert_eq!(rows[0]["allowed"], true);
}

#[test]
fn blocked_channel_exits_permission_denied() {
    let output = hostbridge(&["gate", "fs.readFile", "--mode", "invoke,send"]);
    assert_eq!(output.status.code(), Some(50));

    let rows = json_lines(&output);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["allowed"] == false));
    assert_eq!(rows[0]["reason"], "not in allow-list");
}

#[test]
fn malformed_name_is_blocked_for_every_mode() {
    let output = hostbridge(&["gate", "../etc/passwd"]);
    assert_eq!(output.status.code(), Some(50));

    let rows = json_lines(&output);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row["reason"] == "invalid channel name"));
}

#[test]
fn registry_file_replaces_preset() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("registry.json");
    std::fs::write(
        &path,
        r#"{"invoke":{"exact":["custom.op"]},"on":{"prefixes":["custom-"]}}"#,
    )
    .expect("registry should be writable");
    let path = path.to_str().expect("utf-8 temp path");

    let output = hostbridge(&["gate", "custom.op", "--mode", "invoke", "--registry", path]);
    assert_eq!(output.status.code(), Some(0));

    // `settings.get` is in the shell preset but not in this file.
    let output = hostbridge(&["gate", "settings.get", "--mode", "invoke", "--registry", path]);
    assert_eq!(output.status.code(), Some(50));
}

#[test]
fn invalid_registry_file_is_data_invalid() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("registry.json");
    std::fs::write(&path, r#"{"invoke":{"exact":["x"]},"extra":{}}"#)
        .expect("registry should be writable");

    let output = hostbridge(&["gate", "x", "--registry", path.to_str().expect("utf-8 temp path")]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("registry load failed"));
}

#[test]
fn version_prints_package_version() {
    let output = hostbridge(&["version"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("hostbridge {}", env!("CARGO_PKG_VERSION")));
}
