//! Error types for instance supervision

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Supervisor errors
///
/// Every control operation resolves to either success or one of these
/// variants. Background task failures never surface here; they are written
/// into the instance console as diagnostic lines instead.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// No instance is loaded and no working directory exists for the id
    #[error("Instance not found: {id}")]
    NotFound { id: String },

    /// An instance (or its working directory) already exists
    #[error("Instance already exists: {id}")]
    AlreadyExists { id: String },

    /// The instance already owns a live process
    #[error("Instance already running (PID: {pid})")]
    AlreadyRunning { pid: u32 },

    /// The instance has no running process to talk to
    #[error("Instance is not running")]
    NotRunning,

    /// The launch artifact is absent from the working directory
    #[error("{artifact} not found in instance directory {}", dir.display())]
    MissingArtifact { artifact: String, dir: PathBuf },

    /// The launch runtime is not installed on this host
    #[error("Runtime `{runtime}` not found on this host")]
    RuntimeMissing { runtime: String },

    /// Spawning the child process failed
    #[error("Failed to spawn process: {0}")]
    SpawnFailure(#[source] io::Error),

    /// Writing to the child's input failed or timed out
    #[error("Failed to send command: {0}")]
    WriteFailure(String),

    /// Removing the instance directory failed
    #[error("Failed to delete instance {id}: {reason}")]
    DeleteFailed { id: String, reason: String },

    /// A console stream could not be delivered to its subscriber
    #[error("Console stream error: {0}")]
    StreamError(String),

    /// The identifier is empty once sanitized
    #[error("Invalid instance id: {0:?}")]
    InvalidId(String),

    /// Filesystem collaborator failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SupervisorError {
    /// Stable machine-readable code for transports
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::AlreadyRunning { .. } => "already_running",
            Self::NotRunning => "not_running",
            Self::MissingArtifact { .. } => "missing_artifact",
            Self::RuntimeMissing { .. } => "runtime_missing",
            Self::SpawnFailure(_) => "spawn_failed",
            Self::WriteFailure(_) => "write_failed",
            Self::DeleteFailed { .. } => "delete_failed",
            Self::StreamError(_) => "stream_error",
            Self::InvalidId(_) => "invalid_id",
            Self::Io(_) => "io_error",
        }
    }
}

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;
