//! API request and response models

use std::path::PathBuf;

use hearth_process::InstanceSummary;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Server version
    pub version: String,
    /// Uptime in seconds
    pub uptime: u64,
}

/// Query of `POST /servers`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateQuery {
    /// Requested identifier; generated when absent
    pub server_id: Option<String>,
}

/// Body of start and restart requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    /// Memory size substituted into the memory flags
    pub memory: Option<String>,
    /// Extra runtime arguments placed before the memory flags
    #[serde(alias = "java_args")]
    pub args: Option<Vec<String>>,
}

/// Body of a stop request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StopRequest {
    /// Seconds to wait before escalating to kill
    pub timeout_secs: Option<u64>,
}

/// Body of a command request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandRequest {
    /// Line written to the process's stdin
    pub command: Option<String>,
}

/// Query of `GET /servers/:id/console`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsoleQuery {
    /// Number of trailing lines to return
    pub last_n: Option<usize>,
}

/// Outcome of a lifecycle action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    /// What happened: `created`, `started`, `stopped`, ...
    pub status: String,
    /// Instance acted on
    pub server_id: String,
    /// PID of the launched process, for start and restart
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Working directory, for create
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ActionResponse {
    /// Response without PID or path
    pub fn new(status: &str, server_id: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            server_id: server_id.into(),
            pid: None,
            path: None,
        }
    }

    /// Attach a PID
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attach a working directory
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Response of `GET /servers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    /// Every known instance, sorted by id
    pub servers: Vec<InstanceSummary>,
}

/// Response of `GET /servers/:id/console`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleResponse {
    /// Instance the lines belong to
    pub server_id: String,
    /// Console lines, oldest first
    pub lines: Vec<String>,
}

/// Response of `POST /servers/:id/command`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Always `sent`
    pub status: String,
    /// The command as written
    pub command: String,
}
