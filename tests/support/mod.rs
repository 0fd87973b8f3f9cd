//! Shared helpers for the integration tests: an in-process router plus two
//! stub JSON-RPC children exercised as real subprocesses over real pipes
//! (§8 "Test tooling").

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mcp_bridge::config::{LaunchSpec, RiskLevel};
use mcp_bridge::confirmation::ConfirmationLedger;
use mcp_bridge::http::build_router;
use mcp_bridge::registry::Registry;
use serde_json::Value;
use tower::ServiceExt;

/// Echoes every `tools/call`/`prompts/get` invocation back as
/// `{"echoed": params}`; lists report no items.
pub const ECHO_STUB: &str = r#"
import json
import sys

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        request = json.loads(line)
    except ValueError:
        continue
    method = request.get("method")
    if method == "initialize":
        continue
    request_id = request.get("id")
    params = request.get("params", {})
    if method in ("tools/call", "prompts/get"):
        result = {"echoed": params}
    else:
        result = {"items": []}
    reply = {"jsonrpc": "2.0", "id": request_id, "result": result}
    sys.stdout.write(json.dumps(reply) + "\n")
    sys.stdout.flush()
"#;

/// Reads and discards every line, never replying; used for the timeout
/// boundary behavior (§8).
pub const SILENT_STUB: &str = r#"
import sys

for _ in sys.stdin:
    pass
"#;

pub fn echo_spec(risk_level: Option<RiskLevel>) -> LaunchSpec {
    LaunchSpec {
        command: "python3".to_string(),
        args: vec!["-c".to_string(), ECHO_STUB.to_string()],
        env: Default::default(),
        risk_level,
        docker: None,
    }
}

pub fn silent_spec() -> LaunchSpec {
    LaunchSpec {
        command: "python3".to_string(),
        args: vec!["-c".to_string(), SILENT_STUB.to_string()],
        env: Default::default(),
        risk_level: None,
        docker: None,
    }
}

pub fn harness() -> (Arc<Registry>, Arc<ConfirmationLedger>, Router) {
    let registry = Registry::new();
    let confirmation = Arc::new(ConfirmationLedger::new());
    let router = build_router(registry.clone(), confirmation.clone());
    (registry, confirmation, router)
}

pub fn json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    match body {
        Some(value) => builder.body(Body::from(serde_json::to_vec(&value).unwrap())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
