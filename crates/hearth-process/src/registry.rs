//! Instance registry

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::id::InstanceId;
use crate::instance::{InstanceStatus, ManagedInstance};
use crate::runtime::{RuntimeLocator, SystemRuntimeLocator};
use crate::store::{InstanceStore, LocalInstanceStore};
use crate::stream::ConsoleStream;

/// One row of [`InstanceRegistry::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    #[serde(rename = "server_id")]
    pub id: InstanceId,
    pub path: PathBuf,
    pub running: bool,
    pub status: InstanceStatus,
}

/// Maps identifiers to managed instances
///
/// Instances are loaded lazily from their working directories or created
/// explicitly, and stay registered across any number of runs until deleted.
/// The map lock is only held for a lookup, insert or removal, never across
/// an instance operation.
pub struct InstanceRegistry {
    config: Arc<SupervisorConfig>,
    store: Arc<dyn InstanceStore>,
    runtime: Arc<dyn RuntimeLocator>,
    instances: Mutex<HashMap<InstanceId, Arc<ManagedInstance>>>,
}

impl InstanceRegistry {
    /// Registry over `servers_dir` using `PATH` runtime lookup
    pub fn new(config: SupervisorConfig) -> Self {
        let store = Arc::new(LocalInstanceStore::new(config.servers_dir.clone()));
        Self::with_collaborators(config, store, Arc::new(SystemRuntimeLocator))
    }

    /// Registry with explicit filesystem and runtime collaborators
    pub fn with_collaborators(
        config: SupervisorConfig,
        store: Arc<dyn InstanceStore>,
        runtime: Arc<dyn RuntimeLocator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            runtime,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// The loaded instance for `id`, loading it from disk if needed
    pub async fn ensure_loaded(&self, id: &str) -> Result<Arc<ManagedInstance>> {
        let id = InstanceId::parse(id)?;
        if let Some(instance) = self.instances.lock().get(&id) {
            return Ok(Arc::clone(instance));
        }
        if !self.store.exists(&id).await {
            return Err(SupervisorError::NotFound { id: id.to_string() });
        }
        Ok(self.register(id))
    }

    /// Create a new instance, generating an id when none is given
    pub async fn create(&self, id: Option<&str>) -> Result<Arc<ManagedInstance>> {
        let id = match id.filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => InstanceId::parse(raw)?,
            None => InstanceId::generate(),
        };
        if self.instances.lock().contains_key(&id) {
            return Err(SupervisorError::AlreadyExists { id: id.to_string() });
        }

        self.store
            .provision(&id, &self.config.profile.seed_files)
            .await?;

        let instance = self.build(id.clone());
        let mut instances = self.instances.lock();
        if instances.contains_key(&id) {
            return Err(SupervisorError::AlreadyExists { id: id.to_string() });
        }
        instances.insert(id.clone(), Arc::clone(&instance));
        info!(instance = %id, "Instance created");
        Ok(instance)
    }

    /// Start the instance's process; returns the PID
    pub async fn start(&self, id: &str, memory: Option<&str>, args: &[String]) -> Result<u32> {
        self.ensure_loaded(id).await?.start(memory, args).await
    }

    /// Stop gracefully, escalating to kill after `timeout`
    /// (the configured stop timeout when `None`)
    pub async fn stop(&self, id: &str, timeout: Option<Duration>) -> Result<()> {
        let instance = self.ensure_loaded(id).await?;
        instance.stop(self.stop_timeout(timeout)).await;
        Ok(())
    }

    /// Stop, pause for the settle delay, start
    pub async fn restart(&self, id: &str, memory: Option<&str>, args: &[String]) -> Result<u32> {
        let instance = self.ensure_loaded(id).await?;
        instance
            .restart(
                memory,
                args,
                self.config.default_stop_timeout(),
                self.config.settle_delay(),
            )
            .await
    }

    pub async fn kill(&self, id: &str) -> Result<()> {
        self.ensure_loaded(id).await?.kill().await;
        Ok(())
    }

    pub async fn send_command(&self, id: &str, text: &str) -> Result<()> {
        self.ensure_loaded(id).await?.send_command(text).await
    }

    pub async fn status(&self, id: &str) -> Result<InstanceStatus> {
        Ok(self.ensure_loaded(id).await?.status().await)
    }

    /// The last `n` console lines (the configured default when `None`)
    pub async fn console_snapshot(&self, id: &str, n: Option<usize>) -> Result<Vec<String>> {
        let n = n.unwrap_or(self.config.snapshot_default_lines);
        Ok(self.ensure_loaded(id).await?.console_snapshot(n))
    }

    /// Attach a fresh replay-then-tail console session
    pub async fn console_stream(&self, id: &str) -> Result<ConsoleStream> {
        Ok(self.ensure_loaded(id).await?.subscribe_console())
    }

    /// Stop the instance, forget it and remove its working directory
    ///
    /// The instance is retired first, so a start racing with the delete
    /// fails with [`SupervisorError::NotFound`] instead of spawning a
    /// process nobody tracks. It stays registered until its directory is
    /// gone, which keeps lookups from loading a fresh copy meanwhile.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let instance = self.ensure_loaded(id).await?;
        instance.retire(self.config.default_stop_timeout()).await;

        let id = instance.id().clone();
        let removed = self.store.remove(&id).await;
        self.instances.lock().remove(&id);
        removed?;
        info!(instance = %id, "Instance deleted");
        Ok(())
    }

    /// Every known instance with its status, sorted by id
    ///
    /// Working directories on disk that were never loaded are registered
    /// along the way.
    pub async fn list(&self) -> Result<Vec<InstanceSummary>> {
        for id in self.store.list().await? {
            let known = self.instances.lock().contains_key(&id);
            if !known {
                debug!(instance = %id, "Discovered instance directory");
                self.register(id);
            }
        }

        let mut summaries = Vec::new();
        for instance in self.loaded() {
            let status = instance.status().await;
            summaries.push(InstanceSummary {
                id: instance.id().clone(),
                path: instance.dir().to_path_buf(),
                running: status.running,
                status,
            });
        }
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    /// Stop every loaded instance concurrently
    pub async fn shutdown_all(&self, timeout: Option<Duration>) {
        let timeout = self.stop_timeout(timeout);
        let instances = self.loaded();
        info!(count = instances.len(), "Stopping all instances");
        join_all(instances.iter().map(|instance| instance.stop(timeout))).await;
    }

    fn loaded(&self) -> Vec<Arc<ManagedInstance>> {
        self.instances.lock().values().cloned().collect()
    }

    fn stop_timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| self.config.default_stop_timeout())
    }

    fn build(&self, id: InstanceId) -> Arc<ManagedInstance> {
        Arc::new(ManagedInstance::new(
            id,
            Arc::clone(&self.config),
            Arc::clone(&self.store),
            Arc::clone(&self.runtime),
        ))
    }

    /// Insert unless another caller got there first; returns the winner
    fn register(&self, id: InstanceId) -> Arc<ManagedInstance> {
        let mut instances = self.instances.lock();
        if let Some(existing) = instances.get(&id) {
            return Arc::clone(existing);
        }
        let instance = self.build(id.clone());
        instances.insert(id, Arc::clone(&instance));
        instance
    }
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("servers_dir", &self.config.servers_dir)
            .field("loaded", &self.instances.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(root: &std::path::Path) -> InstanceRegistry {
        InstanceRegistry::new(SupervisorConfig::new(root))
    }

    #[tokio::test]
    async fn test_unknown_instance_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let registry = registry(root.path());

        let err = registry.status("ghost").await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_lazy_load_from_directory() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("alpha")).unwrap();
        let registry = registry(root.path());

        let first = registry.ensure_loaded("alpha").await.unwrap();
        let second = registry.ensure_loaded(" alpha ").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!registry.status("alpha").await.unwrap().running);
    }

    #[tokio::test]
    async fn test_create_then_create_again_fails() {
        let root = tempfile::tempdir().unwrap();
        let registry = registry(root.path());

        let instance = registry.create(Some("alpha")).await.unwrap();
        assert!(instance.dir().join("server.jar").is_file());
        assert!(instance.dir().join("eula.txt").is_file());

        let err = registry.create(Some("alpha")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_create_over_unloaded_directory_fails() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("alpha")).unwrap();
        let registry = registry(root.path());

        let err = registry.create(Some("alpha")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_create_without_id_generates_one() {
        let root = tempfile::tempdir().unwrap();
        let registry = registry(root.path());

        let instance = registry.create(None).await.unwrap();
        assert!(instance.id().as_str().starts_with("server_"));
    }

    #[tokio::test]
    async fn test_list_discovers_directories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("beta")).unwrap();
        let registry = registry(root.path());
        registry.create(Some("alpha")).await.unwrap();

        let listed: Vec<String> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|summary| summary.id.to_string())
            .collect();

        assert_eq!(listed, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_delete_removes_directory_and_entry() {
        let root = tempfile::tempdir().unwrap();
        let registry = registry(root.path());
        let dir = registry.create(Some("alpha")).await.unwrap().dir().to_path_buf();

        registry.delete("alpha").await.unwrap();

        assert!(!dir.exists());
        assert!(matches!(
            registry.status("alpha").await,
            Err(SupervisorError::NotFound { .. })
        ));
        assert!(matches!(
            registry.delete("alpha").await,
            Err(SupervisorError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_never_loaded_directory() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("stale")).unwrap();
        let registry = registry(root.path());

        registry.delete("stale").await.unwrap();
        assert!(!root.path().join("stale").exists());
    }
}
