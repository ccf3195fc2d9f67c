//! Application state for the API server

use std::sync::Arc;
use std::time::Instant;

use hearth_process::InstanceRegistry;
use tokio_util::sync::CancellationToken;

/// Application state shared across all API handlers
#[derive(Clone)]
pub struct AppState {
    /// Registry of managed instances
    pub registry: Arc<InstanceRegistry>,
    /// Cancelled when the server should shut down
    pub shutdown: CancellationToken,
    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self {
            registry,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Where to send callers whose host lacks the runtime
    pub fn runtime_download_url(&self) -> &str {
        &self.registry.config().profile.runtime_download_url
    }
}
