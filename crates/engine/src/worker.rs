//! The worker loop: lease, run, classify, clean up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use slipway_core::{DeploymentState, Error, JobItem, Result, StatePatch};
use slipway_logbus::LogWriter;
use slipway_queue::{Completion, RetryDecision};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::pipeline::Pipeline;

/// How long a timed-out or cancelled pipeline gets to unwind through
/// its abort path before the future is dropped outright.
const ABORT_GRACE: Duration = Duration::from_secs(30);

pub(crate) async fn run(engine: Arc<Engine>, index: usize, shutdown: CancellationToken) {
    debug!(worker = index, "worker started");
    loop {
        mark_dead_letters(&engine).await;

        let item = tokio::select! {
            () = shutdown.cancelled() => {
                debug!(worker = index, "worker stopping");
                return;
            }
            item = engine.deps.queue.lease() => item,
        };
        info!(
            worker = index,
            deployment_id = %item.deployment_id,
            attempt = item.attempts_made,
            "leased deployment job"
        );
        run_one(&engine, &item, &shutdown).await;
    }
}

/// Items that exhausted their attempts via lease expiry have no owning
/// worker; whichever worker notices first closes their records.
async fn mark_dead_letters(engine: &Arc<Engine>) {
    for item in engine.deps.queue.take_dead_letters() {
        warn!(deployment_id = %item.deployment_id, "closing abandoned deployment");
        let log = LogWriter::new(engine.deps.bus.clone(), item.deployment_id);
        log.error("worker", "deployment abandoned after repeated worker failures")
            .await;
        let _ = engine
            .deps
            .store
            .update_state(
                item.deployment_id,
                DeploymentState::Failed,
                StatePatch::error("deployment abandoned after repeated worker failures"),
            )
            .await;
    }
}

async fn run_one(engine: &Arc<Engine>, item: &JobItem, shutdown: &CancellationToken) {
    let id = item.deployment_id;
    let token = shutdown.child_token();
    engine.cancels.register(id, token.clone());

    let workspace_slot: Arc<Mutex<Option<PathBuf>>> = Arc::new(Mutex::new(None));
    let pipeline = Pipeline::new(engine.deps.clone(), workspace_slot.clone());

    let result = drive(&pipeline, item, &token).await;

    // 9. Cleanup always runs: workspace first, then the token.
    let workspace = workspace_slot.lock().take();
    if let Some(workspace) = workspace {
        if let Err(cleanup_error) = engine.deps.workspaces.remove(&workspace).await {
            warn!(deployment_id = %id, %cleanup_error, "workspace cleanup failed");
        } else {
            debug!(deployment_id = %id, "workspace removed");
        }
    }
    engine.cancels.release(id);

    settle(engine, item, result).await;
}

/// Run the pipeline under the job's wall-clock budget. On expiry the
/// token is cancelled and the pipeline gets a grace window to unwind
/// (killing its build container on the way out).
async fn drive(
    pipeline: &Pipeline,
    item: &JobItem,
    token: &CancellationToken,
) -> Result<String> {
    let budget = item.timeout();
    let execute = pipeline.execute(item, token);
    tokio::pin!(execute);

    tokio::select! {
        result = &mut execute => result,
        () = tokio::time::sleep(budget) => {
            warn!(deployment_id = %item.deployment_id, ?budget, "job wall-clock exceeded");
            token.cancel();
            // Whatever the abort path returns, the outcome is a timeout.
            let _ = tokio::time::timeout(ABORT_GRACE, &mut execute).await;
            Err(Error::Timeout {
                elapsed_secs: budget.as_secs(),
            })
        }
    }
}

/// Convert the pipeline outcome into queue completion + record state +
/// a final log event.
async fn settle(engine: &Arc<Engine>, item: &JobItem, result: Result<String>) {
    let id = item.deployment_id;
    let log = LogWriter::new(engine.deps.bus.clone(), id);
    let queue = &engine.deps.queue;

    match result {
        Ok(url) => {
            info!(deployment_id = %id, url, "deployment succeeded");
            queue.complete(item.job_id, Completion::Success);
        }
        Err(Error::Cancelled) => {
            info!(deployment_id = %id, "deployment cancelled");
            let _ = advance_terminal(engine, item, DeploymentState::Cancelled, None).await;
            log.warn("cancel", "deployment cancelled").await;
            queue.complete(item.job_id, Completion::Cancelled);
        }
        Err(error @ Error::Timeout { .. }) => {
            error!(deployment_id = %id, %error, "deployment timed out");
            let _ =
                advance_terminal(engine, item, DeploymentState::Failed, Some(error.to_string()))
                    .await;
            log.error("worker", error.to_string()).await;
            queue.complete(item.job_id, Completion::TimedOut);
        }
        Err(error) if error.is_retryable() => match queue.retry(item.job_id, error.kind()) {
            RetryDecision::Requeued { delay } => {
                warn!(deployment_id = %id, %error, ?delay, "attempt failed, retrying");
                log.warn(
                    "worker",
                    format!(
                        "attempt {} failed ({}), retrying in {}s",
                        item.attempts_made,
                        error,
                        delay.as_secs()
                    ),
                )
                .await;
            }
            RetryDecision::Exhausted => {
                error!(deployment_id = %id, %error, "attempts exhausted");
                let _ = advance_terminal(
                    engine,
                    item,
                    DeploymentState::Failed,
                    Some(error.to_string()),
                )
                .await;
                log.error("worker", format!("giving up after {} attempts: {error}", item.attempts_made))
                    .await;
            }
        },
        Err(error) => {
            error!(deployment_id = %id, %error, "deployment failed");
            let _ =
                advance_terminal(engine, item, DeploymentState::Failed, Some(error.to_string()))
                    .await;
            log.error("worker", error.to_string()).await;
            queue.complete(item.job_id, Completion::Failed);
        }
    }
}

async fn advance_terminal(
    engine: &Arc<Engine>,
    item: &JobItem,
    state: DeploymentState,
    error_message: Option<String>,
) -> Result<()> {
    let current = engine.deps.store.get(item.deployment_id).await?;
    if current.state.is_terminal() {
        return Ok(());
    }
    let patch = match error_message {
        Some(message) => StatePatch::error(message),
        None => StatePatch::none(),
    };
    engine
        .deps
        .store
        .update_state(item.deployment_id, state, patch)
        .await?;
    Ok(())
}
