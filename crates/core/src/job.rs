//! Work items carried by the job queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deployment::DeployRequest;
use crate::id::{DeploymentId, JobId};

/// Default cap on delivery attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default per-job wall-clock budget: 15 minutes.
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 900_000;

/// One unit of deployment work in the durable queue.
///
/// At most one worker holds a lease on an item at any time; a lease that
/// expires without acknowledgment re-enqueues the item with
/// `attempts_made` incremented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobItem {
    /// Queue-scoped identifier.
    pub job_id: JobId,
    /// The deployment this item drives.
    pub deployment_id: DeploymentId,
    /// Attempts started so far (incremented when a lease is taken).
    pub attempts_made: u32,
    /// Cap on attempts.
    pub max_attempts: u32,
    /// Wall-clock budget for one attempt, in milliseconds.
    pub timeout_ms: u64,
    /// Copy of the intake fields the pipeline needs.
    pub request: DeployRequest,
}

impl JobItem {
    /// Create a fresh item with zero attempts.
    #[must_use]
    pub fn new(
        deployment_id: DeploymentId,
        request: DeployRequest,
        max_attempts: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            job_id: JobId::generate(),
            deployment_id,
            attempts_made: 0,
            max_attempts,
            timeout_ms: timeout.as_millis() as u64,
            request,
        }
    }

    /// The per-attempt wall-clock budget.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether another attempt is allowed after the current one.
    #[must_use]
    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.max_attempts
    }
}
