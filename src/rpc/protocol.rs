//! JSON-RPC 2.0 wire types exchanged with children (§4.3, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version sent in the `initialize` handshake (§4.2, §6).
pub const PROTOCOL_VERSION: &str = "0.3.0";
/// Client name sent in the `initialize` handshake's `clientInfo.name` (§6).
pub const CLIENT_NAME: &str = "mcp-bridge";
/// Client version sent in the `initialize` handshake's `clientInfo.version` (§6).
pub const CLIENT_VERSION: &str = "1.0.0";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
pub const METHOD_RESOURCES_READ: &str = "resources/read";
pub const METHOD_PROMPTS_LIST: &str = "prompts/list";
pub const METHOD_PROMPTS_GET: &str = "prompts/get";

/// Unique identifier for an outbound JSON-RPC request, scoped to the
/// lifetime of the owning child (§3 OutstandingRequest).
pub type RequestId = uuid::Uuid;

/// Client metadata sent as `clientInfo` in the `initialize` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        ClientInfo {
            name: CLIENT_NAME.to_string(),
            version: CLIENT_VERSION.to_string(),
        }
    }
}

/// Parameters for the `initialize` handshake (§4.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
    pub capabilities: Value,
}

impl Default for InitializeParams {
    fn default() -> Self {
        InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo::default(),
            capabilities: Value::Object(Default::default()),
        }
    }
}

/// An outbound JSON-RPC 2.0 request. Every outbound object has exactly
/// `jsonrpc`, `id`, `method`, `params` (§6).
#[derive(Debug, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Request {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// Parameters for `tools/call` and `prompts/get`: `{name, arguments}` (§6).
pub fn call_params(name: &str, arguments: Value) -> Value {
    serde_json::json!({ "name": name, "arguments": arguments })
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A decoded inbound line that parsed as JSON and carries an `id` field,
/// i.e. a JSON-RPC response (§4.3).
#[derive(Debug, Deserialize)]
pub struct Response {
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// Classifies a parsed inbound JSON value per §4.3: a response carries `id`,
/// a bare notification carries `method` but no `id`. Both are legal
/// JSON-RPC; the bridge discards notifications (§4.3) since it exposes no
/// caller-facing notification channel.
pub enum Incoming {
    Response(Response),
    Notification,
}

/// Classifies a successfully-parsed JSON value as a response or notification,
/// or `None` if it matches neither shape and should be logged as a diagnostic.
pub fn classify(value: &Value) -> Option<Incoming> {
    if value.get("id").is_some() {
        let response = serde_json::from_value(value.clone()).ok()?;
        return Some(Incoming::Response(response));
    }
    if value.get("method").is_some() {
        return Some(Incoming::Notification);
    }
    None
}

/// Parses a response's `id` field back into a [`RequestId`] (§4.3's "routed
/// purely by its `id` field").
pub fn parse_request_id(value: &Value) -> Option<RequestId> {
    value.as_str().and_then(|s| s.parse().ok())
}
