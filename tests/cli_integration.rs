// CLI integration tests for the `methods` channel flows.
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde_json::{Value, json};

struct Roots {
    _temp: tempfile::TempDir,
    data: PathBuf,
    documents: PathBuf,
}

fn roots() -> Roots {
    let temp = tempfile::tempdir().expect("tempdir");
    let data = temp.path().join("data");
    let documents = temp.path().join("documents");
    fs::create_dir_all(&data).expect("data dir");
    fs::create_dir_all(&documents).expect("documents dir");
    Roots {
        _temp: temp,
        data,
        documents,
    }
}

fn cmd(roots: &Roots) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_hostbridge"));
    command
        .arg("--data-dir")
        .arg(&roots.data)
        .arg("--documents-dir")
        .arg(&roots.documents)
        .env_remove("RUST_LOG");
    command
}

fn parse_json_line(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("json line");
    serde_json::from_str(line).expect("valid json")
}

fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn data_root_defaults_to_standard_root() {
    let roots = roots();
    let output = cmd(&roots).args(["call", "dataRoot"]).output().expect("call");
    assert!(output.status.success());
    let reply = parse_json_line(&output.stdout);
    assert_eq!(reply["result"], json!(lossy(&roots.data)));
}

#[test]
fn data_root_follows_marker_file() {
    let roots = roots();
    let custom = roots.data.parent().expect("parent").join("customroot");
    fs::create_dir_all(&custom).expect("custom dir");
    fs::write(roots.data.join("data.local"), format!("{}\n", custom.display())).expect("marker");

    let output = cmd(&roots).args(["call", "dataRoot"]).output().expect("call");
    assert!(output.status.success());
    assert_eq!(parse_json_line(&output.stdout)["result"], json!(lossy(&custom)));
}

#[test]
fn marker_flag_overrides_marker_location() {
    let roots = roots();
    let custom = roots.documents.join("elsewhere");
    fs::create_dir_all(&custom).expect("custom dir");
    let marker = roots.documents.join("pointer.txt");
    fs::write(&marker, lossy(&custom)).expect("marker");

    let output = cmd(&roots)
        .arg("--marker")
        .arg(&marker)
        .args(["call", "dataRoot"])
        .output()
        .expect("call");
    assert!(output.status.success());
    assert_eq!(parse_json_line(&output.stdout)["result"], json!(lossy(&custom)));
}

#[test]
fn document_root_is_reported() {
    let roots = roots();
    let output = cmd(&roots).args(["call", "documentRoot"]).output().expect("call");
    assert!(output.status.success());
    assert_eq!(
        parse_json_line(&output.stdout)["result"],
        json!(lossy(&roots.documents))
    );
}

#[test]
fn keep_screen_on_flag_seeds_getter() {
    let roots = roots();
    let output = cmd(&roots)
        .args(["--keep-screen-on", "call", "getKeepScreenOn"])
        .output()
        .expect("call");
    assert!(output.status.success());
    assert_eq!(parse_json_line(&output.stdout)["result"], json!(true));
}

#[test]
fn unsupported_method_exits_not_found() {
    let roots = roots();
    let output = cmd(&roots)
        .args(["call", "vibrate", "--arg-json", "3"])
        .output()
        .expect("call");
    assert_eq!(output.status.code(), Some(3));
    let reply = parse_json_line(&output.stdout);
    assert_eq!(reply["notImplemented"], json!(true));
    assert!(reply.get("result").is_none());
}

#[test]
fn object_argument_is_usage_error() {
    let roots = roots();
    let output = cmd(&roots)
        .args(["call", "setKeepScreenOn", "--arg-json", "{\"on\":true}"])
        .output()
        .expect("call");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], json!("Usage"));
}

#[test]
fn unknown_subcommand_is_usage_error() {
    let roots = roots();
    let output = cmd(&roots).arg("frobnicate").output().expect("run");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json_line(&output.stderr);
    assert_eq!(err["error"]["kind"], json!("Usage"));
    assert!(err["error"]["hint"].as_str().expect("hint").contains("hostbridge"));
}

#[test]
fn methods_lists_capabilities_and_placement() {
    let roots = roots();
    let output = cmd(&roots).arg("methods").output().expect("methods");
    assert!(output.status.success());
    let listing = parse_json_line(&output.stdout);
    assert_eq!(listing["channel"], json!("methods"));
    assert_eq!(
        listing["methods"],
        json!([
            {"name": "dataRoot", "placement": "worker"},
            {"name": "documentRoot", "placement": "worker"},
            {"name": "getKeepScreenOn", "placement": "inline"},
            {"name": "setKeepScreenOn", "placement": "home"},
        ])
    );
}

#[test]
fn version_is_json_when_piped() {
    let roots = roots();
    let output = cmd(&roots).arg("version").output().expect("version");
    assert!(output.status.success());
    let version = parse_json_line(&output.stdout);
    assert_eq!(version["name"], json!("hostbridge"));
    assert_eq!(version["version"], json!(env!("CARGO_PKG_VERSION")));
}

#[test]
fn serve_answers_every_request_by_id() {
    let roots = roots();
    let mut child = cmd(&roots)
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn serve");

    let input = [
        r#"{"id":1,"method":"dataRoot"}"#,
        r#"{"id":2,"method":"setKeepScreenOn","arguments":true}"#,
        r#"{"id":3,"method":"getKeepScreenOn"}"#,
        r#"{"id":"four","method":"documentRoot"}"#,
        r#"{"id":5,"method":"openCamera"}"#,
        "not json",
    ]
    .join("\n");
    {
        let mut stdin = child.stdin.take().expect("stdin");
        stdin.write_all(input.as_bytes()).expect("write");
        stdin.write_all(b"\n").expect("newline");
    }

    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());

    let mut by_id: HashMap<String, Value> = HashMap::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let reply: Value = serde_json::from_str(line).expect("reply json");
        by_id.insert(reply["id"].to_string(), reply);
    }
    assert_eq!(by_id.len(), 6);

    assert_eq!(by_id["1"]["result"], json!(lossy(&roots.data)));
    assert_eq!(by_id["2"]["result"], Value::Null);
    assert_eq!(by_id["3"]["result"], json!(true));
    assert_eq!(by_id["\"four\""]["result"], json!(lossy(&roots.documents)));
    assert_eq!(by_id["5"]["notImplemented"], json!(true));
    assert_eq!(by_id["null"]["error"]["code"], json!(""));
    assert_eq!(by_id["null"]["error"]["details"], Value::Null);
}

#[test]
fn serve_exits_cleanly_on_empty_input() {
    let roots = roots();
    let output = cmd(&roots)
        .arg("serve")
        .stdin(Stdio::null())
        .output()
        .expect("serve");
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}
