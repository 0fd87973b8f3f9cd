//! Child process lifecycle (§4.2): spawning with piped stdio, the delayed
//! `initialize` handshake, and exit detection feeding both the transport's
//! pending-request table and the registry's crash tracking.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{CallError, RegistryError};
use crate::resolver::ResolvedCommand;
use crate::rpc::correlation::Transport;
use crate::rpc::protocol::{InitializeParams, METHOD_INITIALIZE};

/// Delay between a child becoming connected and the bridge firing its
/// `initialize` handshake (§4.2, §9): long enough that a child which reads
/// its own argv/config on startup has done so before the handshake lands,
/// short enough not to be noticeable to a caller listing servers.
const INITIALIZE_DELAY: Duration = Duration::from_secs(1);

/// A running child and everything needed to talk to it and tear it down.
pub struct ChildHandle {
    pub pid: Option<u32>,
    pub transport: Transport,
    server: String,
    stop_notify: Arc<Notify>,
    exited_rx: watch::Receiver<bool>,
    _tasks: Vec<JoinHandle<()>>,
}

impl ChildHandle {
    /// Spawns `resolved` with piped stdio, wires up its transport, and
    /// schedules the delayed `initialize` notification. The child is killed
    /// if this handle is dropped without an explicit [`ChildHandle::stop`]
    /// (`kill_on_drop`), matching the registry's crash/stop bookkeeping.
    pub fn spawn(server: String, resolved: &ResolvedCommand) -> Result<Self, RegistryError> {
        let mut command = build_command(resolved);
        command.envs(&resolved.env);
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        let mut child = spawn_with_retry(&mut command, &resolved.executable)?;
        let pid = child.id();

        let stdin = child.stdin.take().expect("child spawned with piped stdin");
        let stdout = child.stdout.take().expect("child spawned with piped stdout");
        let stderr = child.stderr.take().expect("child spawned with piped stderr");

        let (transport, mut tasks) = Transport::spawn(server.clone(), stdin, stdout, stderr);

        let (exited_tx, exited_rx) = watch::channel(false);
        let stop_notify = Arc::new(Notify::new());

        tasks.push(spawn_wait_task(
            server.clone(),
            child,
            transport.clone(),
            stop_notify.clone(),
            exited_tx,
        ));
        tasks.push(spawn_initialize_kick(transport.clone()));

        Ok(ChildHandle {
            pid,
            transport,
            server,
            stop_notify,
            exited_rx,
            _tasks: tasks,
        })
    }

    /// Sends the OS default termination signal (`SIGTERM` on Unix) and
    /// notifies the wait task to reap the process once it actually exits
    /// (§4.5 Stop). On platforms without POSIX signals, falls back to a
    /// forceful kill, since there is no clean-shutdown signal to send.
    ///
    /// Fails with [`RegistryError::Signal`] if the signal could not be
    /// delivered (e.g. the process has already been reaped); the wait task
    /// still runs and will settle the child's exit state regardless (§6
    /// "500 kill failure").
    pub fn stop(&self) -> Result<(), RegistryError> {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                signal_terminate(pid).map_err(|source| RegistryError::Signal(self.server.clone(), source))?;
            }
        }
        self.stop_notify.notify_one();
        Ok(())
    }

    /// `true` once the child has exited, observed or requested (§3 ServerRecord).
    pub fn has_exited(&self) -> bool {
        *self.exited_rx.borrow()
    }

    /// An independent watch handle for observing this child's exit, used by
    /// the registry's crash watcher (§4.5).
    pub fn exited_receiver(&self) -> watch::Receiver<bool> {
        self.exited_rx.clone()
    }

    /// Resolves once the child has exited, for callers that need to block
    /// on teardown (registry `stop`, per §4.5).
    pub async fn wait_for_exit(&mut self) {
        if *self.exited_rx.borrow() {
            return;
        }
        let _ = self.exited_rx.changed().await;
    }
}

fn spawn_wait_task(
    server: String,
    mut child: Child,
    transport: Transport,
    stop_notify: Arc<Notify>,
    exited_tx: watch::Sender<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = stop_notify.notified() => {
                // On Unix, `ChildHandle::stop` has already sent SIGTERM via
                // `libc::kill` before notifying; this task only needs to
                // reap the process once it exits. Non-Unix targets have no
                // equivalent graceful signal, so fall back to a forceful
                // kill here.
                #[cfg(not(unix))]
                if let Err(err) = child.start_kill() {
                    warn!(server = %server, error = %err, "failed to signal child for termination");
                }
                let _ = child.wait().await;
            }
            result = child.wait() => {
                if let Err(err) = result {
                    warn!(server = %server, error = %err, "failed to wait on child process");
                }
            }
        }
        transport.mark_exited(CallError::ChildExited(server));
        let _ = exited_tx.send(true);
    })
}

/// Builds the `tokio::process::Command` for `resolved`, routing it through
/// `sh -c` when `use_shell` is set (§4.1 rule 3). The executable and each
/// argument are passed as distinct positional parameters (`"$@"`), never
/// interpolated into the script string, so a shell metacharacter in an
/// argument cannot break out of its own argument.
fn build_command(resolved: &ResolvedCommand) -> Command {
    if resolved.use_shell {
        let mut command = Command::new("sh");
        command.arg("-c").arg(r#"exec "$@""#).arg("sh").arg(&resolved.executable);
        command.args(&resolved.args);
        return command;
    }
    let mut command = Command::new(&resolved.executable);
    command.args(&resolved.args);
    command
}

/// Sends `SIGTERM` to `pid` via a raw `kill(2)` call, the OS default
/// termination signal (§4.5 Stop). Distinct from tokio's `Child::start_kill`,
/// which always sends `SIGKILL` on Unix and would not let the child clean up.
#[cfg(unix)]
fn signal_terminate(pid: u32) -> std::io::Result<()> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn spawn_initialize_kick(transport: Transport) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(INITIALIZE_DELAY).await;
        let params = serde_json::to_value(InitializeParams::default()).unwrap_or_default();
        transport.notify(METHOD_INITIALIZE, params);
    })
}

/// Retries a spawn that fails with "text file busy", a transient condition
/// seen when a just-written executable (e.g. an `npm install`-staged shim)
/// hasn't finished closing for write yet.
fn spawn_with_retry(command: &mut Command, executable: &str) -> Result<Child, RegistryError> {
    let mut backoff = Duration::from_millis(2);
    for attempt in 0..5 {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                let is_busy = matches!(source.kind(), std::io::ErrorKind::ExecutableFileBusy)
                    || source.raw_os_error() == Some(26);
                if is_busy && attempt < 4 {
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(RegistryError::Spawn {
                    command: executable.to_string(),
                    source,
                });
            }
        }
    }

    unreachable!("spawn_with_retry should return before exhausting retries")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn build_command_wraps_through_shell_when_requested() {
        let resolved = ResolvedCommand {
            executable: "/bin/echo".to_string(),
            args: vec!["hello; rm -rf /".to_string()],
            env: BTreeMap::new(),
            use_shell: true,
        };
        let command = build_command(&resolved);
        let debug = format!("{command:?}");
        // argv-positional, never string-interpolated: the shell sees
        // `"$@"` expand to distinct arguments, so a metacharacter in an
        // argument can't break out of the script string.
        assert!(debug.contains("\"sh\""));
        assert!(debug.contains("\"-c\""));
        assert!(debug.contains("\"/bin/echo\""));
        assert!(debug.contains("\"hello; rm -rf /\""));
    }

    #[test]
    fn build_command_invokes_directly_without_shell() {
        let resolved = ResolvedCommand {
            executable: "/bin/echo".to_string(),
            args: vec!["hi".to_string()],
            env: BTreeMap::new(),
            use_shell: false,
        };
        let command = build_command(&resolved);
        let debug = format!("{command:?}");
        assert!(debug.starts_with("\"/bin/echo\""));
        assert!(!debug.contains("\"sh\""));
    }
}
