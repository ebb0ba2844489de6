//! Clone workspace lifecycle.

use std::path::{Path, PathBuf};

use slipway_core::{DeploymentId, Error, Result};
use tracing::{debug, warn};

/// Creates, wipes, and removes per-deployment clone directories under a
/// configured root. Names embed the deployment id plus a random suffix,
/// so concurrent workers never collide.
#[derive(Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Manage workspaces under `root` (created on demand).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty workspace for one deployment attempt.
    pub async fn create(&self, deployment_id: DeploymentId) -> Result<PathBuf> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let path = self.root.join(format!("{deployment_id}-{}", &suffix[..8]));
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(Error::storage)?;
        debug!(workspace = %path.display(), "workspace created");
        Ok(path)
    }

    /// Empty a workspace between clone attempts.
    pub async fn wipe(&self, workspace: &Path) -> Result<()> {
        self.remove(workspace).await?;
        tokio::fs::create_dir_all(workspace)
            .await
            .map_err(Error::storage)?;
        Ok(())
    }

    /// Remove a workspace entirely. Missing directories are fine.
    pub async fn remove(&self, workspace: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(workspace).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(e)),
        }
    }

    /// Remove every workspace under the root. Run at startup so
    /// directories left behind by a crashed worker do not accumulate.
    /// Returns how many were removed.
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::storage(e)),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(Error::storage)? {
            let path = entry.path();
            if path.is_dir() {
                if let Err(error) = tokio::fs::remove_dir_all(&path).await {
                    warn!(workspace = %path.display(), %error, "orphan sweep failed");
                } else {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
