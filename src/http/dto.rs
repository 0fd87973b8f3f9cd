//! Request/response bodies for the HTTP surface (§6), kept separate from
//! the handlers that build and consume them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::ServerSummary;

/// `id`/`command` are `Option` and `riskLevel` is a raw `i64` rather than a
/// risk level enum so that a missing key or an out-of-range risk level fails
/// inside the handler (400 + `{"error": ...}`, per §6) instead of inside
/// axum's `Json<T>` extractor, which would reject with a bare 422 before the
/// handler ever runs (§7).
#[derive(Debug, Deserialize)]
pub struct CreateServerRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, rename = "riskLevel")]
    pub risk_level: Option<i64>,
    #[serde(default)]
    pub docker: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ServersResponse {
    pub servers: Vec<ServerSummary>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationDecision {
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime: u64,
    #[serde(rename = "serverCount")]
    pub server_count: usize,
    pub servers: Vec<ServerSummary>,
}
