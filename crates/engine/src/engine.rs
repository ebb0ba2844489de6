//! Engine construction and the cancel entry point.

use std::sync::Arc;

use slipway_builder::{ArtifactBuilder, SourceFetcher, WorkspaceManager};
use slipway_core::{DeploymentId, DeploymentState, Error, Result, StatePatch};
use slipway_logbus::{LogBus, LogWriter};
use slipway_providers::ProviderRegistry;
use slipway_queue::{CancelOutcome, JobQueue};
use slipway_store::DeploymentStore;
use slipway_vault::Vault;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cancel::CancelRegistry;
use crate::worker;

/// Everything the pipeline touches, built once at process start and
/// handed down explicitly.
pub struct EngineDeps {
    /// Deployment records.
    pub store: Arc<dyn DeploymentStore>,
    /// Credential vault.
    pub vault: Arc<Vault>,
    /// Provider adapters.
    pub registry: Arc<ProviderRegistry>,
    /// Work queue.
    pub queue: Arc<JobQueue>,
    /// Progress log bus.
    pub bus: Arc<LogBus>,
    /// Repository fetch stage.
    pub fetcher: Arc<dyn SourceFetcher>,
    /// Build stage.
    pub builder: Arc<dyn ArtifactBuilder>,
    /// Clone workspace lifecycle.
    pub workspaces: WorkspaceManager,
}

/// The deployment engine: N workers over a shared queue, plus the
/// cancel path the API calls into.
pub struct Engine {
    pub(crate) deps: Arc<EngineDeps>,
    pub(crate) cancels: CancelRegistry,
}

impl Engine {
    /// Assemble the engine from its dependencies.
    #[must_use]
    pub fn new(deps: EngineDeps) -> Self {
        Self {
            deps: Arc::new(deps),
            cancels: CancelRegistry::new(),
        }
    }

    /// The engine's queue (the API reads stats from it).
    #[must_use]
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.deps.queue
    }

    /// Number of pipelines currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.cancels.len()
    }

    /// Spawn `count` workers plus the lease-expiry sweeper. Workers
    /// stop leasing when `shutdown` fires; in-flight pipelines are
    /// cancelled cooperatively through their per-job tokens (children
    /// of `shutdown`).
    pub fn spawn_workers(
        self: &Arc<Self>,
        count: usize,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let count = count.max(1);
        info!(workers = count, "starting worker pool");
        let mut handles: Vec<JoinHandle<()>> = (0..count)
            .map(|index| {
                let engine = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker::run(engine, index, shutdown).await })
            })
            .collect();
        handles.push(self.spawn_sweeper(shutdown));
        handles
    }

    fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        engine.deps.queue.expire_leases();
                    }
                }
            }
        })
    }

    /// Request cancellation of a deployment.
    ///
    /// Unleased items are removed and the record transitions
    /// immediately; leased items get an intent the owning worker
    /// observes at its next cooperative checkpoint.
    pub async fn cancel_deployment(&self, id: DeploymentId) -> Result<String> {
        let deployment = self.deps.store.get(id).await?;
        if deployment.state.is_terminal() {
            return Ok(format!(
                "deployment already {}; nothing to cancel",
                deployment.state
            ));
        }

        let log = LogWriter::new(self.deps.bus.clone(), id);
        let outcome = deployment.job_id.map(|job_id| self.deps.queue.cancel(job_id));
        match outcome {
            Some(CancelOutcome::Removed(_)) | None => {
                self.deps
                    .store
                    .update_state(id, DeploymentState::Cancelled, StatePatch::none())
                    .await?;
                log.warn("cancel", "deployment cancelled before execution").await;
                Ok("deployment cancelled".to_owned())
            }
            Some(CancelOutcome::IntentRecorded) => {
                self.cancels.cancel(id);
                log.warn("cancel", "cancellation requested; stopping at next checkpoint")
                    .await;
                Ok("cancellation requested".to_owned())
            }
            Some(CancelOutcome::NotQueued) => {
                // Between queue completion and the record's terminal
                // write, or an in-flight worker that has not leased
                // visibly: trigger the token if one exists.
                if self.cancels.cancel(id) {
                    log.warn("cancel", "cancellation requested; stopping at next checkpoint")
                        .await;
                    Ok("cancellation requested".to_owned())
                } else {
                    Err(Error::conflict(
                        "deployment is finishing and can no longer be cancelled",
                    ))
                }
            }
        }
    }
}
