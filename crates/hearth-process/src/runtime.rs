//! Host runtime discovery

use std::path::PathBuf;

/// Finds the runtime executable an instance is launched with
pub trait RuntimeLocator: Send + Sync {
    /// Resolved path of `runtime`, or `None` when it is not installed
    fn locate(&self, runtime: &str) -> Option<PathBuf>;
}

/// Looks runtimes up on `PATH`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRuntimeLocator;

impl RuntimeLocator for SystemRuntimeLocator {
    fn locate(&self, runtime: &str) -> Option<PathBuf> {
        which::which(runtime).ok()
    }
}
