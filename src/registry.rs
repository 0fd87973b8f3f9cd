//! Supervisor registry (§4.5): indexes live children by logical identifier,
//! handles start/stop/list, and tears down bookkeeping on crash.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{DockerSpec, LaunchSpec, RiskLevel};
use crate::error::RegistryError;
use crate::process::ChildHandle;
use crate::resolver;
use crate::rpc::Transport;

struct ServerRecord {
    spec: LaunchSpec,
    child: ChildHandle,
}

/// A point-in-time view of one registered server, as returned by `GET
/// /servers`, `POST /servers`, and `/health` (§6). `risk_level`,
/// `risk_description`, and `running_in_docker` are all present together or
/// all absent, mirroring risk class's on/off presence on the wire (§6).
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub id: String,
    pub connected: bool,
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_in_docker: Option<bool>,
}

fn summarize(id: &str, spec: &LaunchSpec, pid: Option<u32>, connected: bool) -> ServerSummary {
    let (risk_level, risk_description, running_in_docker) = match spec.risk_level {
        Some(level) => (
            Some(level.as_i64()),
            Some(level.description().to_string()),
            Some(level == RiskLevel::High),
        ),
        None => (None, None, None),
    };
    ServerSummary {
        id: id.to_string(),
        connected,
        pid,
        risk_level,
        risk_description,
        running_in_docker,
    }
}

/// Indexes every registered child by its logical identifier (§3 ServerRecord).
/// Reads dominate writes (`GET /servers`, per-call lookups), so a concurrent
/// map is used rather than a single global lock (§5).
pub struct Registry {
    servers: DashMap<String, ServerRecord>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Registry {
            servers: DashMap::new(),
        })
    }

    /// Resolves and spawns a new child, registering it under `id`. Fails with
    /// [`RegistryError::AlreadyExists`] if `id` is taken, leaving the registry
    /// unchanged on any resolution or spawn failure (§4.5).
    pub fn start(self: &Arc<Self>, id: String, spec: LaunchSpec) -> Result<ServerSummary, RegistryError> {
        if self.servers.contains_key(&id) {
            return Err(RegistryError::AlreadyExists(id));
        }

        let mut effective_spec = spec;
        let resolved = match resolver::resolve(&effective_spec) {
            Ok(resolved) => resolved,
            Err(RegistryError::MissingDockerImage) => {
                warn!(
                    server = %id,
                    "High risk level requested without a usable docker image, downgrading to Medium"
                );
                effective_spec.risk_level = Some(RiskLevel::Medium);
                resolver::resolve(&effective_spec)?
            }
            Err(err) => return Err(err),
        };

        let child = ChildHandle::spawn(id.clone(), &resolved)?;
        let pid = child.pid;
        let exited_rx = child.exited_receiver();

        let summary = summarize(&id, &effective_spec, pid, true);
        self.servers.insert(
            id.clone(),
            ServerRecord {
                spec: effective_spec,
                child,
            },
        );
        // Insert before arming the crash watcher (§9 open question): an exit
        // observed mid-spawn can only race the removal, never precede the
        // insertion.
        self.spawn_crash_watcher(id.clone(), exited_rx);

        info!(server = %id, pid, "server started");
        Ok(summary)
    }

    /// Signals the child to terminate and removes the record immediately,
    /// without waiting for the exit event (§4.5). The crash watcher's later
    /// removal attempt is a no-op.
    pub fn stop(&self, id: &str) -> Result<(), RegistryError> {
        let (_, record) = self
            .servers
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        record.child.stop()?;
        info!(server = %id, "server stopped");
        Ok(())
    }

    /// Snapshot of every registered server (§4.5 `List`).
    pub fn list(&self) -> Vec<ServerSummary> {
        self.servers
            .iter()
            .map(|entry| summarize(entry.key(), &entry.spec, entry.child.pid, !entry.child.has_exited()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns a cloned handle to the child's transport plus its risk
    /// metadata, for the correlation engine (§4.4) to issue a call against.
    pub fn lookup(&self, id: &str) -> Option<(Transport, Option<RiskLevel>, Option<DockerSpec>)> {
        self.servers
            .get(id)
            .map(|record| (record.child.transport.clone(), record.spec.risk_level, record.spec.docker.clone()))
    }

    /// Stops every registered server and waits for each to actually exit
    /// before returning, for graceful shutdown (§4.9: "the process... waits
    /// for all stop operations to complete before exiting zero"). Drains the
    /// registry as it goes so a concurrent `GET /servers` sees a
    /// monotonically shrinking set rather than a stale snapshot. Each
    /// child's exit is awaited concurrently, not serially, so shutdown takes
    /// as long as the slowest child rather than the sum of all of them.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.servers.iter().map(|entry| entry.key().clone()).collect();
        let mut waiters = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, mut record)) = self.servers.remove(&id) {
                if let Err(err) = record.child.stop() {
                    warn!(server = %id, error = %err, "failed to signal server during shutdown");
                }
                waiters.push(tokio::spawn(async move {
                    record.child.wait_for_exit().await;
                }));
            }
        }
        for waiter in waiters {
            let _ = waiter.await;
        }
    }

    fn spawn_crash_watcher(self: &Arc<Self>, id: String, mut exited_rx: watch::Receiver<bool>) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            if !*exited_rx.borrow() {
                let _ = exited_rx.changed().await;
            }
            if registry.servers.remove(&id).is_some() {
                warn!(server = %id, "server exited unexpectedly, removed from registry");
            }
        });
    }
}
