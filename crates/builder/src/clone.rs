//! Shallow git clones with the branch fallback chain.

use std::path::Path;

use async_trait::async_trait;
use slipway_core::{Error, Result};
use slipway_logbus::LogWriter;
use tracing::debug;

use crate::traits::SourceFetcher;
use crate::workspace::WorkspaceManager;

/// Branches tried when the requested one does not exist, in order.
const FALLBACKS: [&str; 4] = ["main", "master", "develop", "dev"];

/// Clones repositories by driving the `git` binary.
pub struct GitFetcher {
    workspaces: WorkspaceManager,
}

impl GitFetcher {
    /// The fetcher wipes the workspace between attempts, so it needs
    /// the manager.
    #[must_use]
    pub fn new(workspaces: WorkspaceManager) -> Self {
        Self { workspaces }
    }
}

/// The fallback chain for a requested branch: the requested branch
/// first, then `main`, `master`, `develop`, `dev` (skipping the one
/// already tried), then the repository default (`None`).
#[must_use]
pub fn fallback_branches(requested: &str) -> Vec<Option<String>> {
    let mut chain: Vec<Option<String>> = vec![Some(requested.to_owned())];
    chain.extend(
        FALLBACKS
            .iter()
            .filter(|b| **b != requested)
            .map(|b| Some((*b).to_owned())),
    );
    chain.push(None);
    chain
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(
        &self,
        repo_url: &str,
        branch: &str,
        workspace: &Path,
        log: &LogWriter,
    ) -> Result<()> {
        let mut original_error: Option<String> = None;
        let mut last_error = String::new();

        for (index, attempt) in fallback_branches(branch).into_iter().enumerate() {
            if index > 0 {
                self.workspaces.wipe(workspace).await?;
                let target = attempt.as_deref().unwrap_or("the repository default");
                log.warn("clone", format!("branch {branch:?} not available, trying {target}"))
                    .await;
            }
            match clone_once(repo_url, attempt.as_deref(), workspace).await {
                Ok(()) => {
                    if index > 0 {
                        debug!(repo_url, "clone succeeded on fallback branch");
                    }
                    return Ok(());
                }
                Err(stderr) => {
                    // Only a missing ref justifies walking the chain;
                    // network-class failures surface immediately and the
                    // queue decides whether to retry the job.
                    let missing_ref = is_branch_not_found(&stderr);
                    if original_error.is_none() {
                        original_error = Some(stderr.clone());
                    }
                    last_error = stderr;
                    if index == 0 && !missing_ref {
                        break;
                    }
                }
            }
        }

        Err(Error::CloneFailed {
            original: original_error.unwrap_or_else(|| "clone failed".to_owned()),
            last: last_error,
        })
    }
}

/// One `git clone --depth 1` invocation. Returns the captured stderr on
/// failure.
async fn clone_once(
    repo_url: &str,
    branch: Option<&str>,
    dest: &Path,
) -> std::result::Result<(), String> {
    let mut command = tokio::process::Command::new("git");
    command.arg("clone").arg("--depth").arg("1").arg("--single-branch");
    if let Some(branch) = branch {
        command.arg("--branch").arg(branch);
    }
    command.arg(repo_url).arg(dest);

    let output = command
        .output()
        .await
        .map_err(|e| format!("failed to run git: {e}"))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_owned())
    }
}

fn is_branch_not_found(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    (lowered.contains("remote branch") && lowered.contains("not found"))
        || lowered.contains("couldn't find remote ref")
        || lowered.contains("could not find remote branch")
        || lowered.contains("not found in upstream")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_starts_with_requested_and_ends_with_default() {
        let chain = fallback_branches("feature/x");
        assert_eq!(chain.first().unwrap().as_deref(), Some("feature/x"));
        assert_eq!(chain.last(), Some(&None));
        assert_eq!(chain.len(), 6);
    }

    #[test]
    fn chain_skips_the_already_requested_branch() {
        let chain = fallback_branches("main");
        let names: Vec<Option<&str>> = chain.iter().map(Option::as_deref).collect();
        assert_eq!(
            names,
            vec![Some("main"), Some("master"), Some("develop"), Some("dev"), None]
        );
    }

    #[test]
    fn branch_not_found_heuristics() {
        assert!(is_branch_not_found(
            "fatal: Remote branch feature/x not found in upstream origin"
        ));
        assert!(is_branch_not_found("fatal: couldn't find remote ref feature/x"));
        assert!(!is_branch_not_found(
            "fatal: unable to access 'https://github.com/a/b/': Could not resolve host"
        ));
        assert!(!is_branch_not_found("fatal: repository 'x' not found"));
    }
}
