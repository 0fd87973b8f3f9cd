//! Confirmation ledger (§4.6): the deferred-invocation state machine.
//! Pending → (Committed | Abandoned | Expired), all terminal, all
//! single-shot (§9).

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::RiskLevel;
use crate::error::ConfirmationError;

/// Wall-clock lifetime of a deferred invocation (§4.6, §8).
pub const CONFIRMATION_TTL: Duration = Duration::from_secs(600);

/// A deferred call awaiting a client's commit/abandon decision (§3).
pub struct PendingInvocation {
    pub server_id: String,
    pub method: String,
    pub params: Value,
    created_at: Instant,
}

/// Returned by `defer` in place of the call's real result (§4.6, §8 scenario 2).
#[derive(Debug, Serialize)]
pub struct DeferralResponse {
    pub requires_confirmation: bool,
    pub confirmation_id: Uuid,
    pub risk_level: i64,
    pub risk_description: String,
    pub server_id: String,
    pub method: String,
    pub tool_name: String,
    pub expires_at: DateTime<Utc>,
}

/// Deferred invocations keyed by confirmation handle (§3, §5). Expiry is
/// enforced lazily on lookup; there is no background sweeper (§4.6).
pub struct ConfirmationLedger {
    pending: DashMap<Uuid, PendingInvocation>,
}

impl ConfirmationLedger {
    pub fn new() -> Self {
        ConfirmationLedger {
            pending: DashMap::new(),
        }
    }

    /// Mints a confirmation handle, stores the invocation, and builds the
    /// deferral response the caller sees in place of a real result (§4.6).
    pub fn defer(&self, server_id: String, method: String, params: Value, risk_level: RiskLevel) -> DeferralResponse {
        let handle = Uuid::new_v4();
        let tool_name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let response = DeferralResponse {
            requires_confirmation: true,
            confirmation_id: handle,
            risk_level: risk_level.as_i64(),
            risk_description: risk_level.description().to_string(),
            server_id: server_id.clone(),
            method: method.clone(),
            tool_name,
            expires_at: Utc::now() + chrono::Duration::seconds(CONFIRMATION_TTL.as_secs() as i64),
        };

        self.pending.insert(
            handle,
            PendingInvocation {
                server_id,
                method,
                params,
                created_at: Instant::now(),
            },
        );

        response
    }

    /// Removes and returns the invocation for `handle`, single-shot: a
    /// second call with the same handle always fails with `NotFound` (§8).
    /// An entry past its TTL is removed and reported as `Expired` rather
    /// than `NotFound` (§4.6).
    pub fn take(&self, handle: Uuid) -> Result<PendingInvocation, ConfirmationError> {
        let (_, invocation) = self.pending.remove(&handle).ok_or(ConfirmationError::NotFound)?;
        if invocation.created_at.elapsed() > CONFIRMATION_TTL {
            return Err(ConfirmationError::Expired);
        }
        Ok(invocation)
    }

    /// Backdates `handle`'s creation time past the TTL, for exercising
    /// expiry without a real ten-minute wait. Test-only.
    #[cfg(test)]
    pub(crate) fn force_expire(&self, handle: Uuid) {
        if let Some(mut entry) = self.pending.get_mut(&handle) {
            entry.created_at = Instant::now() - (CONFIRMATION_TTL + Duration::from_secs(1));
        }
    }
}

impl Default for ConfirmationLedger {
    fn default() -> Self {
        Self::new()
    }
}
