//! Line-framed JSON-RPC codec (§4.3): one writer task serializing outbound
//! requests onto the child's stdin, one reader task demultiplexing inbound
//! replies off the child's stdout, one task mirroring stderr into logs.
//!
//! This is the "one permanent reader per child" design §9 calls for, rather
//! than a fresh listener per outstanding request.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::protocol::{classify, parse_request_id, Incoming, RequestId};
use crate::error::CallError;

/// Outstanding replies keyed by request id, shared between the reader task
/// and every caller issuing requests against this child (§3, §5).
pub type PendingRequests = Arc<DashMap<RequestId, oneshot::Sender<Result<Value, CallError>>>>;

/// Spawns the writer task: drains `rx` and writes each message followed by a
/// single newline, nothing else (§4.3 outbound). Returns when `tx` is
/// dropped or a write fails (child stdin closed).
pub fn spawn_writer(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if stdin.write_all(message.as_bytes()).await.is_err() {
                break;
            }
            if stdin.write_all(b"\n").await.is_err() {
                break;
            }
            if stdin.flush().await.is_err() {
                break;
            }
        }
        let _ = stdin.shutdown().await;
    })
}

/// Spawns the reader task: splits stdout on newlines, parses each non-empty
/// segment as JSON, and routes responses to the pending table by `id`.
/// Segments without an `id` (notifications) are discarded at debug level;
/// segments that fail to parse are logged as diagnostics and discarded
/// (§4.3). Partial/multi-record arrivals are handled by `AsyncBufReadExt`'s
/// internal buffering.
pub fn spawn_reader(stdout: ChildStdout, pending: PendingRequests) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    handle_line(&line, &pending);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed to read child stdout");
                    break;
                }
            }
        }
        fail_all(&pending, CallError::ChannelClosed);
    })
}

fn handle_line(line: &str, pending: &PendingRequests) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, line, "child emitted a non-JSON diagnostic line");
            return;
        }
    };

    match classify(&value) {
        Some(Incoming::Response(response)) => {
            let Some(id) = parse_request_id(&response.id) else {
                warn!("received JSON-RPC response with a malformed id");
                return;
            };
            let Some((_, tx)) = pending.remove(&id) else {
                // Late reply after timeout, or a stray id: discarded per §4.4/§8.
                return;
            };
            let result = if let Some(error) = response.error {
                Err(CallError::Rpc(error.message))
            } else if let Some(result) = response.result {
                Ok(result)
            } else {
                Err(CallError::Rpc("response missing result and error".to_string()))
            };
            let _ = tx.send(result);
        }
        Some(Incoming::Notification) => {
            debug!("discarding bare JSON-RPC notification (no caller-facing channel)");
        }
        None => {
            debug!(line, "child emitted a malformed JSON-RPC message");
        }
    }
}

/// Spawns a task that line-buffers the child's stderr and logs it; never
/// parsed as JSON-RPC (§4.3).
pub fn spawn_stderr(stderr: ChildStderr, server: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(server = %server, "child stderr: {line}");
        }
    })
}

/// Resolves every outstanding waiter with `err` and clears the table; used
/// when the reader task ends (child stdout closed, usually because the
/// child exited) or when the registry observes the child's exit directly.
pub fn fail_all(pending: &PendingRequests, err: CallError) {
    let ids: Vec<RequestId> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(err.clone()));
        }
    }
}
