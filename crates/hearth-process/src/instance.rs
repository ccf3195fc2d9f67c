//! Lifecycle controller for one managed instance

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::ConsoleLog;
use crate::capture;
use crate::child::{self, LaunchSpec};
use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::id::InstanceId;
use crate::monitor::MonitorTask;
use crate::runtime::RuntimeLocator;
use crate::store::InstanceStore;
use crate::stream::ConsoleStream;

/// Liveness poll interval of `stop`
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Grace on top of the drain timeout for the monitor to record a kill
const REAP_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle state of an instance
///
/// One run goes `Stopped → Starting → Running`, then either
/// `Stopping → Stopped` when asked to stop, or `Crashed` when the process
/// ended on its own with a non-zero code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl InstanceState {
    /// Whether a process is (or is about to be) attached
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Crashed => "crashed",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent view of an instance taken under its lifecycle lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    #[serde(rename = "server_id")]
    pub id: InstanceId,
    pub state: InstanceState,
    pub running: bool,
    /// PID of the live process, or of the last one if it has exited
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
}

/// The live process of the current run
struct ProcessHandle {
    pid: u32,
    stdin: Option<ChildStdin>,
    kill: CancellationToken,
}

/// Everything guarded by the lifecycle lock
struct Lifecycle {
    process: Option<ProcessHandle>,
    state: InstanceState,
    exit_code: Option<i32>,
    last_pid: Option<u32>,
    /// Monitor of the most recent run; finished once `process` is cleared
    monitor: Option<JoinHandle<()>>,
    /// Set once the instance is being deleted; no further runs may start
    retired: bool,
}

/// State shared between the controller and its background tasks
pub(crate) struct Shared {
    pub id: InstanceId,
    pub console: ConsoleLog,
    lifecycle: Mutex<Lifecycle>,
    state: watch::Sender<InstanceState>,
}

impl Shared {
    fn set_state(&self, lifecycle: &mut Lifecycle, state: InstanceState) {
        lifecycle.state = state;
        self.state.send_replace(state);
    }

    /// Called by the monitor once the process is gone and output drained
    pub(crate) async fn record_exit(&self, pid: u32, waited: std::io::Result<ExitStatus>) {
        let mut lifecycle = self.lifecycle.lock().await;
        let unexpected = lifecycle.state == InstanceState::Running;

        let (exit_code, next) = match waited {
            Ok(status) => {
                let code = child::exit_code(status);
                self.console
                    .append(&format!("[process exited with code {code}]"));
                let next = if unexpected && code != 0 {
                    InstanceState::Crashed
                } else {
                    InstanceState::Stopped
                };
                (Some(code), next)
            }
            Err(e) => {
                warn!(instance = %self.id, pid = %pid, error = %e, "Waiting on process failed");
                self.console.append(&format!("[monitor error] {e}"));
                let next = if unexpected {
                    InstanceState::Crashed
                } else {
                    InstanceState::Stopped
                };
                (None, next)
            }
        };

        lifecycle.exit_code = exit_code;
        lifecycle.process = None;
        self.set_state(&mut lifecycle, next);

        if next == InstanceState::Crashed {
            warn!(instance = %self.id, pid = %pid, exit_code = ?exit_code, "Process exited unexpectedly");
        } else {
            info!(instance = %self.id, pid = %pid, exit_code = ?exit_code, "Process exited");
        }
    }
}

/// One managed process slot
///
/// Owns the OS process of the current run. All mutation of the process
/// handle, state and exit code goes through the lifecycle lock; the console
/// has its own lock so readers are never held up by a slow start or stop.
pub struct ManagedInstance {
    shared: Arc<Shared>,
    dir: PathBuf,
    config: Arc<SupervisorConfig>,
    store: Arc<dyn InstanceStore>,
    runtime: Arc<dyn RuntimeLocator>,
}

impl ManagedInstance {
    pub(crate) fn new(
        id: InstanceId,
        config: Arc<SupervisorConfig>,
        store: Arc<dyn InstanceStore>,
        runtime: Arc<dyn RuntimeLocator>,
    ) -> Self {
        let dir = store.instance_dir(&id);
        let (state, _) = watch::channel(InstanceState::Stopped);
        let shared = Arc::new(Shared {
            id,
            console: ConsoleLog::new(config.console_capacity),
            lifecycle: Mutex::new(Lifecycle {
                process: None,
                state: InstanceState::Stopped,
                exit_code: None,
                last_pid: None,
                monitor: None,
                retired: false,
            }),
            state,
        });
        Self {
            shared,
            dir,
            config,
            store,
            runtime,
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.shared.id
    }

    /// Working directory the process runs in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The instance console
    pub fn console(&self) -> &ConsoleLog {
        &self.shared.console
    }

    /// Current lifecycle state, without taking the lifecycle lock
    pub fn state(&self) -> InstanceState {
        *self.shared.state.borrow()
    }

    /// Launch the process and its capture and monitor tasks
    ///
    /// Returns the new PID. On any failure the instance is left `Stopped`
    /// (or untouched, for [`SupervisorError::AlreadyRunning`]).
    pub async fn start(&self, memory: Option<&str>, args: &[String]) -> Result<u32> {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        if lifecycle.retired {
            return Err(SupervisorError::NotFound {
                id: self.id().to_string(),
            });
        }
        if let Some(process) = &lifecycle.process {
            return Err(SupervisorError::AlreadyRunning { pid: process.pid });
        }
        if let Some(previous) = lifecycle.monitor.take() {
            // Already past its final lock release; this only joins it.
            let _ = previous.await;
        }

        let profile = &self.config.profile;
        if !self.store.has_artifact(self.id(), &profile.artifact).await {
            return Err(SupervisorError::MissingArtifact {
                artifact: profile.artifact.clone(),
                dir: self.dir.clone(),
            });
        }
        let program = self.runtime.locate(&profile.runtime).ok_or_else(|| {
            SupervisorError::RuntimeMissing {
                runtime: profile.runtime.clone(),
            }
        })?;

        self.shared.set_state(&mut lifecycle, InstanceState::Starting);
        let spec = LaunchSpec::new(program, profile.command_args(memory, args), &self.dir);
        let mut child = match child::spawn(&spec) {
            Ok(child) => child,
            Err(e) => {
                warn!(instance = %self.id(), error = %e, "Failed to spawn process");
                self.shared.set_state(&mut lifecycle, InstanceState::Stopped);
                return Err(SupervisorError::SpawnFailure(e));
            }
        };
        let pid = child.id().unwrap_or_default();

        let capture = tokio::spawn(capture::run(
            self.id().clone(),
            self.shared.console.clone(),
            child.stdout.take(),
            child.stderr.take(),
        ));
        let stdin = child.stdin.take();
        let kill = CancellationToken::new();
        let monitor = tokio::spawn(
            MonitorTask {
                shared: Arc::clone(&self.shared),
                child,
                pid,
                capture,
                kill: kill.clone(),
                drain_timeout: self.config.drain_timeout(),
            }
            .run(),
        );

        lifecycle.process = Some(ProcessHandle { pid, stdin, kill });
        lifecycle.exit_code = None;
        lifecycle.last_pid = Some(pid);
        lifecycle.monitor = Some(monitor);
        self.shared.set_state(&mut lifecycle, InstanceState::Running);

        info!(instance = %self.id(), pid = %pid, "Instance started");
        Ok(pid)
    }

    /// Ask the process to shut down, killing it if it has not exited
    /// within `timeout`
    ///
    /// No-op when nothing is running. Never reports a timeout: expiry
    /// escalates to [`kill`](Self::kill) instead.
    pub async fn stop(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        {
            let mut lifecycle = self.shared.lifecycle.lock().await;
            if lifecycle.process.is_none() {
                return;
            }
            if lifecycle.state == InstanceState::Running {
                let command = self.config.profile.shutdown_command.clone();
                // The shutdown write shares the stop deadline.
                let limit = self.config.write_timeout().min(timeout);
                let sent = self.write_line(&mut lifecycle, &command, limit).await;
                self.shared.set_state(&mut lifecycle, InstanceState::Stopping);
                if let Err(e) = sent {
                    warn!(instance = %self.id(), error = %e, "Graceful stop failed, killing");
                    self.shared
                        .console
                        .append(&format!("[stop failed: {e}; will attempt kill]"));
                    if let Some(process) = &lifecycle.process {
                        process.kill.cancel();
                    }
                } else {
                    info!(instance = %self.id(), timeout = ?timeout, "Stop requested");
                }
            }
        }

        loop {
            if !self.state().is_alive() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(instance = %self.id(), timeout = ?timeout, "Process ignored stop, killing");
                self.kill().await;
                break;
            }
            sleep(STOP_POLL_INTERVAL.min(deadline - now)).await;
        }

        self.wait_for_exit(self.config.drain_timeout() + REAP_GRACE)
            .await;
    }

    /// Terminate the process immediately; idempotent
    ///
    /// Does not wait for the exit to be recorded.
    pub async fn kill(&self) {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        let Some(process) = &lifecycle.process else {
            return;
        };
        let pid = process.pid;
        process.kill.cancel();
        if matches!(
            lifecycle.state,
            InstanceState::Starting | InstanceState::Running
        ) {
            self.shared.set_state(&mut lifecycle, InstanceState::Stopping);
        }
        info!(instance = %self.id(), pid = %pid, "Kill requested");
    }

    /// Refuse all future starts, then stop and kill whatever is running
    ///
    /// Returns once no process is attached, or after the reap grace if the
    /// exit could not be recorded in time.
    pub(crate) async fn retire(&self, timeout: Duration) {
        self.shared.lifecycle.lock().await.retired = true;
        self.stop(timeout).await;
        self.kill().await;
        self.wait_for_exit(self.config.drain_timeout() + REAP_GRACE)
            .await;
    }

    /// Stop, wait `settle`, then start again
    pub async fn restart(
        &self,
        memory: Option<&str>,
        args: &[String],
        timeout: Duration,
        settle: Duration,
    ) -> Result<u32> {
        self.stop(timeout).await;
        sleep(settle).await;
        self.start(memory, args).await
    }

    /// Write one line to the process's stdin
    pub async fn send_command(&self, text: &str) -> Result<()> {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        self.write_line(&mut lifecycle, text, self.config.write_timeout())
            .await
    }

    /// Snapshot of `{running, pid, exit_code}` under the lifecycle lock
    pub async fn status(&self) -> InstanceStatus {
        let lifecycle = self.shared.lifecycle.lock().await;
        InstanceStatus {
            id: self.id().clone(),
            state: lifecycle.state,
            running: lifecycle.process.is_some(),
            pid: lifecycle
                .process
                .as_ref()
                .map(|process| process.pid)
                .or(lifecycle.last_pid),
            exit_code: lifecycle.exit_code,
        }
    }

    /// The last `n` console lines
    pub fn console_snapshot(&self, n: usize) -> Vec<String> {
        self.shared.console.snapshot(n)
    }

    /// Attach a new replay-then-tail console session
    pub fn subscribe_console(&self) -> ConsoleStream {
        ConsoleStream::attach(
            self.id().clone(),
            self.shared.console.clone(),
            self.shared.state.subscribe(),
            self.config.poll_interval(),
        )
    }

    /// Wait until no process is attached, up to `limit`
    ///
    /// Returns whether the instance is stopped.
    pub async fn wait_for_exit(&self, limit: Duration) -> bool {
        let mut state = self.shared.state.subscribe();
        let stopped = tokio::time::timeout(limit, state.wait_for(|s| !s.is_alive())).await;
        matches!(stopped, Ok(Ok(_)))
    }

    async fn write_line(
        &self,
        lifecycle: &mut Lifecycle,
        text: &str,
        limit: Duration,
    ) -> Result<()> {
        if lifecycle.state != InstanceState::Running {
            return Err(SupervisorError::NotRunning);
        }
        let stdin = lifecycle
            .process
            .as_mut()
            .and_then(|process| process.stdin.as_mut())
            .ok_or(SupervisorError::NotRunning)?;

        let mut line = text.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        match tokio::time::timeout(limit, write).await {
            Ok(Ok(())) => {
                debug!(instance = %self.id(), command = %text.trim_end(), "Command sent");
                Ok(())
            }
            Ok(Err(e)) => Err(SupervisorError::WriteFailure(e.to_string())),
            Err(_) => Err(SupervisorError::WriteFailure(format!(
                "stdin write timed out after {limit:?}"
            ))),
        }
    }
}

impl fmt::Debug for ManagedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedInstance")
            .field("id", self.id())
            .field("dir", &self.dir)
            .field("state", &self.state())
            .finish()
    }
}
