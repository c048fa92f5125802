//! Integration tests for the `circuit serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Base port is derived from the process id so separate test binaries
/// don't collide on the same range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 30000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// Start `circuit serve` with the example configuration on `port`.
fn start_server(port: u16) -> Child {
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root");

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_circuit"));
    cmd.current_dir(workspace_root);
    cmd.args(["--quiet", "serve", "--config", "config/circuit.example.toml"]);
    cmd.arg("--port").arg(port.to_string());
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());

    let child = cmd.spawn().expect("failed to start circuit serve");
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            return child;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    child
}

fn send(port: u16, request: String) -> (u16, serde_json::Value) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    let (status, body) = parse_http_response(&response);
    let json = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn http_get(port: u16, path: &str) -> (u16, serde_json::Value) {
    send(
        port,
        format!(
            "GET {} HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n\r\n",
            path, port
        ),
    )
}

fn http_post(port: u16, path: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
    let body = body.to_string();
    send(
        port,
        format!(
            "POST {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            path,
            port,
            body.len(),
            body
        ),
    )
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"");
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let body = if headers.to_lowercase().contains("transfer-encoding: chunked") {
        decode_chunked(&body)
    } else {
        body
    };
    (status, body)
}

fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = chunk_start + size;
        if chunk_end > remaining.len() {
            result.push_str(&remaining[chunk_start..]);
            break;
        }
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }
    result
}

fn register(port: u16, id: &str) {
    let (status, _) = http_post(
        port,
        "/documents",
        serde_json::json!({"id": id, "title": "Supply contract", "created_by": "alice"}),
    );
    assert_eq!(status, 201);
}

fn process(port: u16, id: &str, action_id: &str, actor_id: &str) -> (u16, serde_json::Value) {
    http_post(
        port,
        &format!("/documents/{id}/process"),
        serde_json::json!({
            "action_id": action_id,
            "actor_id": actor_id,
            "auto_advance": true,
        }),
    )
}

#[test]
fn health_returns_200_with_version() {
    let port = next_port();
    let mut child = start_server(port);

    let (status, body) = http_get(port, "/health");
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn circuits_lists_configuration() {
    let port = next_port();
    let mut child = start_server(port);

    let (status, body) = http_get(port, "/circuits");
    assert_eq!(status, 200);
    assert_eq!(body["circuits"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["actions"].as_array().map(Vec::len), Some(4));

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn contract_runs_to_completion() {
    let port = next_port();
    let mut child = start_server(port);

    register(port, "doc-1");
    let (status, body) = http_post(
        port,
        "/documents/doc-1/assign",
        serde_json::json!({"circuit_id": "contract", "actor_id": "alice"}),
    );
    assert_eq!(status, 200, "assign failed: {body}");
    assert_eq!(body["state"]["current_step_id"], "legal");

    let (status, body) = process(port, "doc-1", "approve-legal", "bob");
    assert_eq!(status, 200, "legal approval failed: {body}");
    assert_eq!(body["is_approved"], true);
    assert_eq!(body["state"]["current_step_id"], "finance");

    let (status, body) = process(port, "doc-1", "approve-finance", "carol");
    assert_eq!(status, 200, "finance approval failed: {body}");
    assert_eq!(body["state"]["current_step_id"], "signature");

    let (status, body) = process(port, "doc-1", "sign", "alice");
    assert_eq!(status, 200, "signature failed: {body}");
    assert_eq!(body["state"]["status"], "completed");

    let (status, body) = http_get(port, "/documents/doc-1/workflow");
    assert_eq!(status, 200);
    assert_eq!(body["status_code"], 2);
    assert_eq!(body["position"]["state"], "completed");

    let (status, body) = http_get(port, "/documents/doc-1/history");
    assert_eq!(status, 200);
    let kinds: Vec<&str> = body["history"]
        .as_array()
        .expect("history array")
        .iter()
        .filter_map(|h| h["kind"].as_str())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "assigned", "action", "advanced", "action", "advanced", "action", "completed"
        ]
    );

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn manual_transitions_and_status_toggles() {
    let port = next_port();
    let mut child = start_server(port);

    register(port, "doc-2");
    http_post(
        port,
        "/documents/doc-2/assign",
        serde_json::json!({"circuit_id": "contract", "actor_id": "alice"}),
    );

    let (status, body) = http_post(
        port,
        "/documents/doc-2/statuses/legal-ok",
        serde_json::json!({"is_complete": true, "actor_id": "alice"}),
    );
    assert_eq!(status, 200, "status toggle failed: {body}");
    assert_eq!(body["is_complete"], true);

    let (status, body) = http_post(
        port,
        "/documents/doc-2/advance",
        serde_json::json!({"actor_id": "alice", "comments": "looks fine"}),
    );
    assert_eq!(status, 200, "advance failed: {body}");
    assert_eq!(body["state"]["current_step_id"], "finance");

    let (status, body) = http_post(
        port,
        "/documents/doc-2/return",
        serde_json::json!({"actor_id": "alice"}),
    );
    assert_eq!(status, 200, "return failed: {body}");
    assert_eq!(body["state"]["current_step_id"], "legal");

    let (status, body) = http_get(port, "/documents/doc-2/statuses");
    assert_eq!(status, 200);
    assert!(body["statuses"]
        .as_array()
        .expect("statuses array")
        .iter()
        .any(|s| s["status_id"] == "legal-ok" && s["is_complete"] == true));

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn errors_map_to_status_codes() {
    let port = next_port();
    let mut child = start_server(port);

    // Unknown document: validation.
    let (status, body) = http_post(
        port,
        "/documents/ghost/advance",
        serde_json::json!({"actor_id": "alice"}),
    );
    assert_eq!(status, 422);
    assert_eq!(body["kind"], "validation");

    register(port, "doc-3");

    // Not yet assigned: state.
    let (status, body) = http_post(
        port,
        "/documents/doc-3/advance",
        serde_json::json!({"actor_id": "alice"}),
    );
    assert_eq!(status, 409);
    assert_eq!(body["kind"], "state");

    http_post(
        port,
        "/documents/doc-3/assign",
        serde_json::json!({"circuit_id": "contract", "actor_id": "alice"}),
    );

    // Wrong role for the legal step: authorization.
    let (status, body) = process(port, "doc-3", "approve-legal", "carol");
    assert_eq!(status, 403);
    assert_eq!(body["kind"], "authorization");

    // Required status still open: validation.
    let (status, _) = http_post(
        port,
        "/documents/doc-3/advance",
        serde_json::json!({"actor_id": "alice"}),
    );
    assert_eq!(status, 422);

    // First step has no predecessor: state.
    let (status, _) = http_post(
        port,
        "/documents/doc-3/return",
        serde_json::json!({"actor_id": "alice"}),
    );
    assert_eq!(status, 409);

    // Duplicate registration.
    let (status, _) = http_post(
        port,
        "/documents",
        serde_json::json!({"id": "doc-3", "title": "Again", "created_by": "alice"}),
    );
    assert_eq!(status, 422);

    let (status, body) = http_get(port, "/nowhere");
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not found");

    child.kill().ok();
    child.wait().ok();
}
