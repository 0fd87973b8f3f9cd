use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the supervisor registry (§4.5) and, for `MissingDockerImage`,
/// the command resolver (§4.1) when High risk lacks a container spec.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("server `{0}` already exists")]
    AlreadyExists(String),
    #[error("server `{0}` not found")]
    NotFound(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid risk level `{0}`, expected 1, 2, or 3")]
    InvalidRiskLevel(i64),
    #[error("risk level High requires a docker image")]
    MissingDockerImage,
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to signal server `{0}`: {1}")]
    Signal(String, #[source] std::io::Error),
}

/// Errors surfaced by the correlation engine (§4.4).
#[derive(Debug, Error, Clone)]
pub enum CallError {
    #[error("server not found or not connected")]
    ServerNotFound,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server exited with status {0}")]
    ChildExited(String),
    #[error("{0}")]
    Rpc(String),
    #[error("transport channel closed unexpectedly")]
    ChannelClosed,
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::Serialization(err.to_string())
    }
}

/// Errors surfaced by the confirmation ledger (§4.6).
#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("confirmation not found or expired")]
    NotFound,
    #[error("confirmation has expired")]
    Expired,
    #[error(transparent)]
    Replay(#[from] CallError),
}

/// Top-level error type returned by HTTP handlers. Maps exactly one status
/// code per variant family so a newly added variant is a compile-time gap,
/// not a silent fallthrough to an unrelated status (§7).
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            BridgeError::Registry(err) => registry_status(err),
            BridgeError::Call(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            BridgeError::Confirmation(err) => confirmation_status(err),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn registry_status(err: &RegistryError) -> (StatusCode, String) {
    let status = match err {
        RegistryError::AlreadyExists(_) => StatusCode::CONFLICT,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::MissingField(_)
        | RegistryError::InvalidRiskLevel(_)
        | RegistryError::MissingDockerImage => StatusCode::BAD_REQUEST,
        RegistryError::Spawn { .. } | RegistryError::Signal(..) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn confirmation_status(err: &ConfirmationError) -> (StatusCode, String) {
    let status = match err {
        ConfirmationError::NotFound => StatusCode::NOT_FOUND,
        ConfirmationError::Expired => StatusCode::GONE,
        ConfirmationError::Replay(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
