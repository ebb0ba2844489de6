//! Storage ports.
//!
//! Drivers implement these traits; the rest of the workspace only sees
//! the trait objects. All methods return `slipway_core::Error` so driver
//! failures surface as `Storage` errors the pipeline can reason about.

use async_trait::async_trait;
use chrono::Utc;
use slipway_core::{
    validate_transition, Credential, CredentialId, Deployment, DeploymentId, DeploymentState,
    LogEvent, LogQuery, ProviderKind, Result, StatePatch,
};

use crate::page::{DeploymentFilter, Page, PageRequest};

/// Persistence for [`Deployment`] records.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Persist a fresh record. Fails on duplicate id.
    async fn create(&self, deployment: Deployment) -> Result<()>;

    /// Fetch one record.
    async fn get(&self, id: DeploymentId) -> Result<Deployment>;

    /// List records, newest first.
    async fn list(
        &self,
        filter: DeploymentFilter,
        page: PageRequest,
    ) -> Result<Page<Deployment>>;

    /// Transition a record, applying `patch` alongside.
    ///
    /// Rejects transitions the state machine forbids. Passing the current
    /// state performs a patch-only update. `started_at` is stamped on the
    /// first entry into `building`, `completed_at` on any terminal state.
    async fn update_state(
        &self,
        id: DeploymentId,
        new_state: DeploymentState,
        patch: StatePatch,
    ) -> Result<Deployment>;
}

/// Persistence for [`Credential`] records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a fresh record. Fails on duplicate id.
    async fn insert(&self, credential: Credential) -> Result<()>;

    /// Fetch one record.
    async fn get(&self, id: CredentialId) -> Result<Credential>;

    /// All credentials belonging to `owner`, oldest first.
    async fn list(&self, owner: &str) -> Result<Vec<Credential>>;

    /// The oldest active credential for `provider`, if any.
    async fn find_active(&self, provider: ProviderKind) -> Result<Option<Credential>>;

    /// Replace an existing record.
    async fn update(&self, credential: Credential) -> Result<()>;

    /// Hard-delete a record.
    async fn delete(&self, id: CredentialId) -> Result<()>;
}

/// Persistence for per-deployment append-only logs.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one event. Durable once this returns.
    async fn append(&self, event: LogEvent) -> Result<()>;

    /// Read events in id order, applying `query` filters.
    async fn read(&self, id: DeploymentId, query: &LogQuery) -> Result<Vec<LogEvent>>;

    /// Read the entire log in id order. Empty when none exists.
    async fn read_all(&self, id: DeploymentId) -> Result<Vec<LogEvent>>;

    /// Highest event id for this deployment; 0 when the log is empty.
    async fn last_id(&self, id: DeploymentId) -> Result<u64>;

    /// Remove all events for this deployment.
    async fn clear(&self, id: DeploymentId) -> Result<()>;
}

/// Apply a state change + patch to a record, shared by all drivers.
///
/// Validates the transition, stamps `updated_at`, and maintains
/// `started_at` / `completed_at`.
pub fn apply_state_update(
    mut deployment: Deployment,
    new_state: DeploymentState,
    patch: StatePatch,
) -> Result<Deployment> {
    validate_transition(deployment.state, new_state)?;

    let now = Utc::now();
    deployment.state = new_state;
    deployment.updated_at = now;
    if new_state == DeploymentState::Building && deployment.started_at.is_none() {
        deployment.started_at = Some(now);
    }
    if new_state.is_terminal() && deployment.completed_at.is_none() {
        deployment.completed_at = Some(now);
    }

    if let Some(provider) = patch.chosen_provider {
        deployment.chosen_provider = Some(provider);
    }
    if let Some(url) = patch.deployment_url {
        deployment.deployment_url = Some(url);
    }
    if let Some(message) = patch.error_message {
        deployment.error_message = Some(message);
    }
    if let Some(detected) = patch.detected {
        // Monotonic once set.
        if deployment.detected.is_none() {
            deployment.detected = Some(detected);
        }
    }
    if let Some(job_id) = patch.job_id {
        deployment.job_id = Some(job_id);
    }

    Ok(deployment)
}
