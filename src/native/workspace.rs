use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use tokio::fs;
use uuid::Uuid;

use crate::core::errors::WorkspaceError;

/// Allocates one scratch directory per pipeline run.
///
/// Names are random v4 UUIDs, so concurrent `acquire` calls never need a lock.
/// The manager only keeps a registry of live workspaces for accounting.
#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
    live: Arc<DashMap<Uuid, PathBuf>>,
}

impl WorkspaceManager {
    pub fn new<T: AsRef<Path>>(root: T) -> Self {
        WorkspaceManager {
            root: root.as_ref().into(),
            live: Arc::new(DashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: self.root.clone(),
                source,
            })?;

        let id = Uuid::new_v4();
        let dir = self.root.join(format!("run_{}", id));
        // `create_dir` fails on an existing path, so a name clash is an error
        // rather than two runs silently sharing a directory.
        fs::create_dir(&dir)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: dir.clone(),
                source,
            })?;

        self.live.insert(id, dir.clone());
        tracing::debug!(workspace = %dir.display(), "workspace acquired");

        Ok(Workspace {
            id,
            dir,
            live: self.live.clone(),
            released: false,
        })
    }

    /// Number of workspaces acquired and not yet released.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// A private scratch directory. Deleted by `release`, or on drop if the
/// owner never got that far.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    live: Arc<DashMap<Uuid, PathBuf>>,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub async fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.dir.join(name);
        fs::write(&path, contents)
            .await
            .map_err(|source| WorkspaceError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    pub async fn release(mut self) -> Result<(), WorkspaceError> {
        self.released = true;
        self.live.remove(&self.id);

        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                tracing::debug!(workspace = %self.dir.display(), "workspace released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::Remove {
                path: self.dir.clone(),
                source,
            }),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        self.live.remove(&self.id);
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != ErrorKind::NotFound {
                tracing::error!(
                    workspace = %self.dir.display(),
                    error = %e,
                    "failed to remove dropped workspace"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn test_root() -> PathBuf {
        std::env::temp_dir().join(format!("playground_ws_{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let manager = WorkspaceManager::new(test_root());
        let workspace = manager.acquire().await.unwrap();
        let dir = workspace.path().to_path_buf();

        let file = workspace.write_file("main.py", "print(1)").await.unwrap();
        assert!(file.starts_with(&dir));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "print(1)");
        assert_eq!(manager.live_count(), 1);

        workspace.release().await.unwrap();
        assert!(!dir.exists());
        assert_eq!(manager.live_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let manager = WorkspaceManager::new(test_root());
        let dir = {
            let workspace = manager.acquire().await.unwrap();
            workspace.write_file("a.txt", "x").await.unwrap();
            workspace.path().to_path_buf()
        };

        assert!(!dir.exists());
        assert_eq!(manager.live_count(), 0);
    }

    #[tokio::test]
    async fn test_release_tolerates_missing_directory() {
        let manager = WorkspaceManager::new(test_root());
        let workspace = manager.acquire().await.unwrap();
        std::fs::remove_dir_all(workspace.path()).unwrap();

        assert!(workspace.release().await.is_ok());
        assert_eq!(manager.live_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_unique_paths() {
        let manager = WorkspaceManager::new(test_root());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.acquire().await.unwrap() })
            })
            .collect();

        let mut workspaces = Vec::new();
        for handle in handles {
            workspaces.push(handle.await.unwrap());
        }

        let paths: HashSet<_> = workspaces.iter().map(|w| w.path().to_path_buf()).collect();
        assert_eq!(paths.len(), 32);
        assert_eq!(manager.live_count(), 32);

        for workspace in workspaces {
            workspace.release().await.unwrap();
        }
        assert_eq!(manager.live_count(), 0);
        assert_eq!(std::fs::read_dir(manager.root()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_fails_under_read_only_root() {
        // /proc is read-only
        let manager = WorkspaceManager::new(format!("/proc/playground_{}", Uuid::new_v4()));
        let result = manager.acquire().await;

        assert!(matches!(result, Err(WorkspaceError::Create { .. })));
        assert_eq!(manager.live_count(), 0);
    }
}
