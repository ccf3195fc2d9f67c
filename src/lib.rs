//! Shared fixtures for the cross-crate scenario tests

use std::time::Duration;

use hearth_process::{InstanceRegistry, LaunchProfile, SupervisorConfig};
use tempfile::TempDir;

/// A registry whose instances run `script` with `sh`
///
/// Every created instance is seeded with the script as its artifact. The
/// returned directory must outlive the registry.
pub fn sh_supervisor(script: &str) -> (TempDir, InstanceRegistry) {
    let root = match tempfile::tempdir() {
        Ok(root) => root,
        Err(e) => panic!("failed to create scratch directory: {e}"),
    };
    let profile = LaunchProfile::new("sh", "server.sh").seed_file("server.sh", script);
    let config = SupervisorConfig::new(root.path())
        .profile(profile)
        .stream_poll_interval(Duration::from_millis(25))
        .restart_settle(Duration::from_millis(50));
    (root, InstanceRegistry::new(config))
}

/// Wait until the console of `id` holds at least `count` lines
pub async fn wait_for_lines(registry: &InstanceRegistry, id: &str, count: usize) {
    for _ in 0..250 {
        let lines = registry
            .console_snapshot(id, Some(usize::MAX))
            .await
            .unwrap_or_default();
        if lines.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("console of {id} never reached {count} lines");
}
