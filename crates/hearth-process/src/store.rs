//! Filesystem collaborator: one working directory per instance

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Result, SupervisorError};
use crate::id::InstanceId;

/// Storage of instance working directories
///
/// The supervisor never touches the filesystem directly; every existence
/// check, provisioning step and removal goes through this trait.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Working directory of `id`, whether or not it exists
    fn instance_dir(&self, id: &InstanceId) -> PathBuf;

    /// Whether the working directory exists
    async fn exists(&self, id: &InstanceId) -> bool;

    /// Whether `artifact` exists inside the working directory
    async fn has_artifact(&self, id: &InstanceId, artifact: &str) -> bool;

    /// Create the working directory and write `seed_files` into it
    ///
    /// Fails with [`SupervisorError::AlreadyExists`] if the directory exists.
    async fn provision(
        &self,
        id: &InstanceId,
        seed_files: &BTreeMap<String, String>,
    ) -> Result<PathBuf>;

    /// Recursively remove the working directory
    async fn remove(&self, id: &InstanceId) -> Result<()>;

    /// Identifiers of every working directory on disk
    async fn list(&self) -> Result<Vec<InstanceId>>;
}

/// Working directories under a local root directory
#[derive(Debug, Clone)]
pub struct LocalInstanceStore {
    root: PathBuf,
}

impl LocalInstanceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl InstanceStore for LocalInstanceStore {
    fn instance_dir(&self, id: &InstanceId) -> PathBuf {
        self.root.join(id.as_str())
    }

    async fn exists(&self, id: &InstanceId) -> bool {
        tokio::fs::metadata(self.instance_dir(id))
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    async fn has_artifact(&self, id: &InstanceId, artifact: &str) -> bool {
        tokio::fs::metadata(self.instance_dir(id).join(artifact))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    async fn provision(
        &self,
        id: &InstanceId,
        seed_files: &BTreeMap<String, String>,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let dir = self.instance_dir(id);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SupervisorError::AlreadyExists {
                    id: id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        for (name, contents) in seed_files {
            // Seed files land directly in the instance directory.
            let Some(file_name) = Path::new(name).file_name() else {
                continue;
            };
            tokio::fs::write(dir.join(file_name), contents).await?;
        }

        info!(instance = %id, dir = %dir.display(), "Provisioned instance directory");
        Ok(dir)
    }

    async fn remove(&self, id: &InstanceId) -> Result<()> {
        let dir = self.instance_dir(id);
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| SupervisorError::DeleteFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        info!(instance = %id, "Removed instance directory");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<InstanceId>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            // Directories whose names would not survive sanitizing are not ours.
            match InstanceId::parse(name) {
                Ok(id) if id.as_str() == name => ids.push(id),
                _ => debug!(dir = %name, "Skipping foreign directory"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> InstanceId {
        InstanceId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_provision_writes_seed_files() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalInstanceStore::new(root.path().join("servers"));
        let mut seeds = BTreeMap::new();
        seeds.insert("server.jar".to_string(), String::new());
        seeds.insert("eula.txt".to_string(), "eula=true\n".to_string());

        let dir = store.provision(&id("alpha"), &seeds).await.unwrap();

        assert!(store.exists(&id("alpha")).await);
        assert!(store.has_artifact(&id("alpha"), "server.jar").await);
        assert_eq!(
            std::fs::read_to_string(dir.join("eula.txt")).unwrap(),
            "eula=true\n"
        );
    }

    #[tokio::test]
    async fn test_provision_twice_fails() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalInstanceStore::new(root.path());
        store.provision(&id("alpha"), &BTreeMap::new()).await.unwrap();

        let err = store
            .provision(&id("alpha"), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_list_skips_files_and_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalInstanceStore::new(root.path().join("absent"));
        assert!(store.list().await.unwrap().is_empty());

        let store = LocalInstanceStore::new(root.path());
        std::fs::create_dir(root.path().join("beta")).unwrap();
        std::fs::create_dir(root.path().join("alpha")).unwrap();
        std::fs::write(root.path().join("notes.txt"), "x").unwrap();
        assert_eq!(store.list().await.unwrap(), vec![id("alpha"), id("beta")]);
    }

    #[tokio::test]
    async fn test_remove_missing_is_delete_failed() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalInstanceStore::new(root.path());
        let err = store.remove(&id("ghost")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::DeleteFailed { .. }));
    }
}
