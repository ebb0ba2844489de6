//! Clone-protocol tests against real local git repositories.
//!
//! These drive the actual `git` binary; when it is not installed the
//! tests report success after doing nothing.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use slipway_builder::{GitFetcher, SourceFetcher, WorkspaceManager};
use slipway_core::{DeploymentId, Error, LogLevel, LogQuery};
use slipway_logbus::{LogBus, LogWriter};
use slipway_store::MemoryLogStore;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .output()
        .expect("git invocation");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// A single-commit repository whose only branch is `main`.
fn seed_repository(dir: &Path) {
    git(dir, &["init", "--initial-branch=main"]);
    std::fs::write(dir.join("index.html"), "<html>seed</html>").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", "seed"]);
}

struct Setup {
    fetcher: GitFetcher,
    workspace: std::path::PathBuf,
    bus: Arc<LogBus>,
    log: LogWriter,
    _dirs: TempDir,
}

async fn setup() -> (Setup, std::path::PathBuf) {
    let dirs = TempDir::new().unwrap();
    let origin = dirs.path().join("origin");
    std::fs::create_dir_all(&origin).unwrap();
    seed_repository(&origin);

    let workspaces = WorkspaceManager::new(dirs.path().join("workspaces"));
    let workspace = workspaces.create(DeploymentId::generate()).await.unwrap();
    let bus = Arc::new(LogBus::new(Arc::new(MemoryLogStore::new())));
    let log = LogWriter::new(bus.clone(), DeploymentId::generate());
    (
        Setup {
            fetcher: GitFetcher::new(workspaces),
            workspace,
            bus,
            log,
            _dirs: dirs,
        },
        origin,
    )
}

#[tokio::test]
async fn clone_of_existing_branch_succeeds() {
    if !git_available() {
        return;
    }
    let (setup, origin) = setup().await;
    setup
        .fetcher
        .fetch(origin.to_str().unwrap(), "main", &setup.workspace, &setup.log)
        .await
        .unwrap();
    assert!(setup.workspace.join("index.html").is_file());
}

#[tokio::test]
async fn missing_branch_falls_back_to_main_with_warning() {
    if !git_available() {
        return;
    }
    let (setup, origin) = setup().await;
    let log_id = setup.log.deployment_id();
    setup
        .fetcher
        .fetch(
            origin.to_str().unwrap(),
            "feature/x",
            &setup.workspace,
            &setup.log,
        )
        .await
        .unwrap();
    assert!(setup.workspace.join("index.html").is_file());

    let events = setup.bus.read(log_id, &LogQuery::default()).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.level == LogLevel::Warn && e.message.contains("feature/x")));
}

#[tokio::test]
async fn unreachable_repository_is_clone_error() {
    if !git_available() {
        return;
    }
    let (setup, _origin) = setup().await;
    let bogus = setup._dirs.path().join("does-not-exist");
    let err = setup
        .fetcher
        .fetch(bogus.to_str().unwrap(), "main", &setup.workspace, &setup.log)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CloneFailed { .. }));
}
