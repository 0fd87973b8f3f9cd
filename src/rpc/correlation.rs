//! Request/response correlation (§4.4): issues a JSON-RPC request against a
//! child's transport, waits on a dedicated oneshot for the matching reply,
//! and enforces the per-request timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use super::codec::{fail_all, spawn_reader, spawn_stderr, spawn_writer, PendingRequests};
use super::protocol::{Request, RequestId};
use crate::error::CallError;

/// Every request not answered within this window is resolved with
/// [`CallError::Timeout`] and its id is dropped from the pending table (§4.4).
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the line-framed channel to one child: a sender for outbound
/// messages and the shared pending-reply table the reader task fills in.
/// Cloning shares the same underlying child connection.
#[derive(Clone)]
pub struct Transport {
    outbound: mpsc::UnboundedSender<String>,
    pending: PendingRequests,
    alive: Arc<AtomicBool>,
}

impl Transport {
    /// Spawns the writer, reader, and stderr tasks for a freshly-created
    /// child and returns the handle plus their join handles (owned by the
    /// caller so they can be aborted when the child is torn down).
    pub fn spawn(
        server: String,
        stdin: ChildStdin,
        stdout: ChildStdout,
        stderr: ChildStderr,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let pending: PendingRequests = Arc::new(DashMap::new());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            spawn_writer(stdin, outbound_rx),
            spawn_reader(stdout, pending.clone()),
            spawn_stderr(stderr, server),
        ];

        let transport = Transport {
            outbound: outbound_tx,
            pending,
            alive: Arc::new(AtomicBool::new(true)),
        };
        (transport, tasks)
    }

    /// Issues a request and awaits its reply, enforcing [`CALL_TIMEOUT`].
    /// A reply that arrives after the timeout is discarded by the reader
    /// task (its sender is no longer in the pending table) rather than
    /// delivered to a stale caller (§4.4).
    pub async fn call(&self, method: impl Into<String>, params: Value) -> Result<Value, CallError> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(CallError::ChannelClosed);
        }

        let id: RequestId = uuid::Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let request = Request::new(id, method, params);
        let serialized = serde_json::to_string(&request)?;
        if self.outbound.send(serialized).is_err() {
            self.pending.remove(&id);
            return Err(CallError::ChannelClosed);
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CallError::ChannelClosed),
            Err(_) => {
                self.pending.remove(&id);
                Err(CallError::Timeout(CALL_TIMEOUT))
            }
        }
    }

    /// Fires a request without waiting for (or caring about) its reply, used
    /// for the post-spawn `initialize` handshake (§4.2, §9): the bridge does
    /// not block startup on the child's response.
    pub fn notify(&self, method: impl Into<String>, params: Value) {
        let id: RequestId = uuid::Uuid::new_v4();
        let request = Request::new(id, method, params);
        match serde_json::to_string(&request) {
            Ok(serialized) => {
                let _ = self.outbound.send(serialized);
            }
            Err(err) => warn!(error = %err, "failed to serialize fire-and-forget request"),
        }
    }

    /// Marks the transport dead and resolves every outstanding waiter with
    /// `err`, called once the owning child's exit has been observed (§4.5).
    pub fn mark_exited(&self, err: CallError) {
        self.alive.store(false, Ordering::Release);
        fail_all(&self.pending, err);
    }
}
