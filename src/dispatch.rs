//! Correlation engine's single public operation (§4.4): `call`, plus the
//! confirmation-replay path that sits on top of it (§4.6). This is the one
//! chokepoint every HTTP handler that talks to a child goes through.

use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::{DockerSpec, RiskLevel};
use crate::confirmation::ConfirmationLedger;
use crate::error::{BridgeError, CallError, ConfirmationError, RegistryError};
use crate::registry::Registry;
use crate::rpc::protocol::METHOD_TOOLS_CALL;

/// Locates `server_id`, defers a Medium-risk `tools/call` unless `bypass_handle`
/// is present, otherwise frames the request and waits on the reply, wrapping
/// High-risk results with an `execution_environment` descriptor (§4.4 steps 1–6).
pub async fn call(
    registry: &Registry,
    confirmation: &ConfirmationLedger,
    server_id: &str,
    method: &str,
    params: Value,
    bypass_handle: Option<Uuid>,
) -> Result<Value, BridgeError> {
    let (transport, risk_level, docker) = registry
        .lookup(server_id)
        .ok_or_else(|| RegistryError::NotFound(server_id.to_string()))?;

    if risk_level == Some(RiskLevel::Medium) && method == METHOD_TOOLS_CALL && bypass_handle.is_none() {
        debug!(server = %server_id, method, "deferring Medium-risk call for confirmation");
        let deferral = confirmation.defer(server_id.to_string(), method.to_string(), params, RiskLevel::Medium);
        let value = serde_json::to_value(deferral).map_err(CallError::from)?;
        return Ok(value);
    }

    debug!(server = %server_id, method, bypassed = bypass_handle.is_some(), "dispatching call to child");
    let result = transport.call(method, params).await?;

    if risk_level == Some(RiskLevel::High) {
        return Ok(wrap_execution_environment(result, docker));
    }

    Ok(result)
}

/// Resolves a confirmation handle (§4.6 `resolve`): on abandon, removes the
/// entry and returns a rejection acknowledgement; on commit, replays the
/// stored invocation through [`call`] with the handle as the bypass token.
pub async fn resolve_confirmation(
    registry: &Registry,
    confirmation: &ConfirmationLedger,
    handle: Uuid,
    commit: bool,
) -> Result<Value, BridgeError> {
    let invocation = confirmation.take(handle)?;

    if !commit {
        return Ok(json!({
            "status": "rejected",
            "message": format!("confirmation {handle} was abandoned by the caller"),
        }));
    }

    call(
        registry,
        confirmation,
        &invocation.server_id,
        &invocation.method,
        invocation.params,
        Some(handle),
    )
    .await
    .map_err(|err| match err {
        BridgeError::Call(call_err) => BridgeError::Confirmation(ConfirmationError::Replay(call_err)),
        other => other,
    })
}

fn wrap_execution_environment(result: Value, docker: Option<DockerSpec>) -> Value {
    let environment = json!({
        "risk_level": RiskLevel::High.as_i64(),
        "containerized": true,
        "image": docker.map(|spec| spec.image).unwrap_or_default(),
    });

    match result {
        Value::Object(mut map) => {
            map.insert("execution_environment".to_string(), environment);
            Value::Object(map)
        }
        other => json!({ "result": other, "execution_environment": environment }),
    }
}
