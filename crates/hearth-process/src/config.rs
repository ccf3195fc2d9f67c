//! Supervisor configuration

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_CONSOLE_CAPACITY;

/// Placeholder substituted with the requested memory size
const MEMORY_PLACEHOLDER: &str = "{memory}";
/// Placeholder substituted with the artifact file name
const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// How every instance's process is launched
///
/// The command line is `runtime`, then caller-supplied extra arguments, then
/// the expanded `memory_args`, then the expanded `launch_args`. The process
/// always runs inside the instance's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchProfile {
    /// Runtime executable looked up on `PATH`
    pub runtime: String,
    /// File that must exist in the working directory before a start
    pub artifact: String,
    /// Memory flags; `{memory}` is replaced by the requested size
    pub memory_args: Vec<String>,
    /// Trailing arguments; `{artifact}` is replaced by the artifact name
    pub launch_args: Vec<String>,
    /// Memory size used when a start request names none
    pub default_memory: String,
    /// Line written to stdin to request a graceful shutdown
    pub shutdown_command: String,
    /// Where to point users whose host lacks the runtime
    pub runtime_download_url: String,
    /// Files written into a freshly created working directory
    pub seed_files: BTreeMap<String, String>,
}

impl LaunchProfile {
    /// Create a profile for `runtime` launching `artifact`, with no flags
    pub fn new(runtime: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            artifact: artifact.into(),
            memory_args: Vec::new(),
            launch_args: vec![ARTIFACT_PLACEHOLDER.to_string()],
            default_memory: String::new(),
            shutdown_command: "stop".to_string(),
            runtime_download_url: String::new(),
            seed_files: BTreeMap::new(),
        }
    }

    /// Set memory flags
    pub fn memory_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.memory_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set trailing launch arguments
    pub fn launch_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launch_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the graceful shutdown command
    pub fn shutdown_command(mut self, command: impl Into<String>) -> Self {
        self.shutdown_command = command.into();
        self
    }

    /// Add a file written on instance creation
    pub fn seed_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.seed_files.insert(name.into(), contents.into());
        self
    }

    /// Arguments passed to the runtime for one start
    pub fn command_args(&self, memory: Option<&str>, extra_args: &[String]) -> Vec<String> {
        let memory = memory
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.default_memory.as_str());
        let mut args = extra_args.to_vec();
        args.extend(
            self.memory_args
                .iter()
                .map(|arg| arg.replace(MEMORY_PLACEHOLDER, memory)),
        );
        args.extend(
            self.launch_args
                .iter()
                .map(|arg| arg.replace(ARTIFACT_PLACEHOLDER, &self.artifact)),
        );
        args
    }
}

impl Default for LaunchProfile {
    fn default() -> Self {
        let mut seed_files = BTreeMap::new();
        seed_files.insert("server.jar".to_string(), String::new());
        seed_files.insert(
            "eula.txt".to_string(),
            "# EULA accepted by server manager\neula=true\n".to_string(),
        );
        seed_files.insert(
            "server.properties".to_string(),
            "# Basic server.properties generated by manager\nmotd=Managed by hearth\n"
                .to_string(),
        );
        Self {
            runtime: "java".to_string(),
            artifact: "server.jar".to_string(),
            memory_args: vec![
                format!("-Xmx{MEMORY_PLACEHOLDER}"),
                format!("-Xms{MEMORY_PLACEHOLDER}"),
            ],
            launch_args: vec![
                "-jar".to_string(),
                ARTIFACT_PLACEHOLDER.to_string(),
                "nogui".to_string(),
            ],
            default_memory: "1G".to_string(),
            shutdown_command: "stop".to_string(),
            runtime_download_url:
                "https://www.oracle.com/java/technologies/javase-jdk17-downloads.html".to_string(),
            seed_files,
        }
    }
}

/// Supervisor-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Directory holding one working directory per instance
    pub servers_dir: PathBuf,
    /// Console lines retained per instance
    pub console_capacity: usize,
    /// Tail poll interval of console streams
    pub stream_poll_interval_ms: u64,
    /// Default grace period of a stop before it escalates to kill
    pub stop_timeout_ms: u64,
    /// Pause between the stop and start halves of a restart
    pub restart_settle_ms: u64,
    /// Upper bound on a single stdin write
    pub command_write_timeout_ms: u64,
    /// How long the monitor waits for output to drain after exit
    pub exit_drain_timeout_ms: u64,
    /// Lines returned by a snapshot that names no count
    pub snapshot_default_lines: usize,
    /// Launch profile shared by all instances
    pub profile: LaunchProfile,
}

impl SupervisorConfig {
    /// Default settings rooted at `servers_dir`
    pub fn new(servers_dir: impl Into<PathBuf>) -> Self {
        Self {
            servers_dir: servers_dir.into(),
            ..Self::default()
        }
    }

    /// Set the launch profile
    pub fn profile(mut self, profile: LaunchProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the console capacity
    pub fn console_capacity(mut self, capacity: usize) -> Self {
        self.console_capacity = capacity;
        self
    }

    /// Set the stream poll interval
    pub fn stream_poll_interval(mut self, interval: Duration) -> Self {
        self.stream_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the default stop timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the bound on a single stdin write
    pub fn command_write_timeout(mut self, timeout: Duration) -> Self {
        self.command_write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the restart settle delay
    pub fn restart_settle(mut self, settle: Duration) -> Self {
        self.restart_settle_ms = settle.as_millis() as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.stream_poll_interval_ms.max(1))
    }

    pub fn default_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.command_write_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_drain_timeout_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            servers_dir: PathBuf::from("servers"),
            console_capacity: DEFAULT_CONSOLE_CAPACITY,
            stream_poll_interval_ms: 200,
            stop_timeout_ms: 30_000,
            restart_settle_ms: 1_000,
            command_write_timeout_ms: 5_000,
            exit_drain_timeout_ms: 2_000,
            snapshot_default_lines: 200,
            profile: LaunchProfile::default(),
        }
    }
}
