//! The seams the engine consumes the builder through.

use std::path::Path;

use async_trait::async_trait;
use slipway_core::{DeployConfig, DeploymentId, DetectionResult, Result};
use slipway_logbus::LogWriter;
use tokio_util::sync::CancellationToken;

/// Fetches repository contents into a prepared workspace directory.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Clone `repo_url` at `branch` (with fallbacks) into `workspace`.
    async fn fetch(
        &self,
        repo_url: &str,
        branch: &str,
        workspace: &Path,
        log: &LogWriter,
    ) -> Result<()>;
}

/// Runs (or skips) the build inside an isolated environment.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    /// Build the workspace in place. The build output lands inside the
    /// workspace; [`crate::artifact::resolve`] locates it afterwards.
    ///
    /// `cancel` aborts the build cooperatively: the implementation must
    /// kill any container it started and return
    /// [`slipway_core::Error::Cancelled`].
    async fn build(
        &self,
        workspace: &Path,
        deployment_id: DeploymentId,
        detection: &DetectionResult,
        config: &DeployConfig,
        cancel: &CancellationToken,
        log: &LogWriter,
    ) -> Result<()>;
}
