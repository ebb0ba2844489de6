//! In-memory drivers, for tests and ephemeral runs.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use slipway_core::{
    Credential, CredentialId, Deployment, DeploymentId, DeploymentState, Error, LogEvent,
    LogQuery, ProviderKind, Result, StatePatch,
};

use crate::page::{DeploymentFilter, Page, PageRequest};
use crate::traits::{apply_state_update, CredentialStore, DeploymentStore, LogStore};

/// Lock-protected map of deployments.
#[derive(Default)]
pub struct MemoryDeploymentStore {
    records: RwLock<HashMap<DeploymentId, Deployment>>,
}

impl MemoryDeploymentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn create(&self, deployment: Deployment) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&deployment.id) {
            return Err(Error::conflict(format!(
                "deployment {} already exists",
                deployment.id
            )));
        }
        records.insert(deployment.id, deployment);
        Ok(())
    }

    async fn get(&self, id: DeploymentId) -> Result<Deployment> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("deployment", id))
    }

    async fn list(
        &self,
        filter: DeploymentFilter,
        page: PageRequest,
    ) -> Result<Page<Deployment>> {
        let mut all: Vec<Deployment> = self
            .records
            .read()
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::of(all, page))
    }

    async fn update_state(
        &self,
        id: DeploymentId,
        new_state: DeploymentState,
        patch: StatePatch,
    ) -> Result<Deployment> {
        let mut records = self.records.write();
        let current = records
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("deployment", id))?;
        let updated = apply_state_update(current, new_state, patch)?;
        records.insert(id, updated.clone());
        Ok(updated)
    }
}

/// Lock-protected map of credentials.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<CredentialId, Credential>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, credential: Credential) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&credential.id) {
            return Err(Error::conflict(format!(
                "credential {} already exists",
                credential.id
            )));
        }
        records.insert(credential.id, credential);
        Ok(())
    }

    async fn get(&self, id: CredentialId) -> Result<Credential> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("credential", id))
    }

    async fn list(&self, owner: &str) -> Result<Vec<Credential>> {
        let mut all: Vec<Credential> = self
            .records
            .read()
            .values()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn find_active(&self, provider: ProviderKind) -> Result<Option<Credential>> {
        let mut candidates: Vec<Credential> = self
            .records
            .read()
            .values()
            .filter(|c| c.usable_for(provider))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(candidates.into_iter().next())
    }

    async fn update(&self, credential: Credential) -> Result<()> {
        let mut records = self.records.write();
        if !records.contains_key(&credential.id) {
            return Err(Error::not_found("credential", credential.id));
        }
        records.insert(credential.id, credential);
        Ok(())
    }

    async fn delete(&self, id: CredentialId) -> Result<()> {
        self.records
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("credential", id))
    }
}

/// Lock-protected per-deployment event vectors.
#[derive(Default)]
pub struct MemoryLogStore {
    logs: RwLock<HashMap<DeploymentId, Vec<LogEvent>>>,
}

impl MemoryLogStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, event: LogEvent) -> Result<()> {
        self.logs
            .write()
            .entry(event.deployment_id)
            .or_default()
            .push(event);
        Ok(())
    }

    async fn read(&self, id: DeploymentId, query: &LogQuery) -> Result<Vec<LogEvent>> {
        let all = self.read_all(id).await?;
        let mut matched: Vec<LogEvent> =
            all.into_iter().filter(|e| query.matches(e)).collect();
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn read_all(&self, id: DeploymentId) -> Result<Vec<LogEvent>> {
        Ok(self.logs.read().get(&id).cloned().unwrap_or_default())
    }

    async fn last_id(&self, id: DeploymentId) -> Result<u64> {
        Ok(self
            .logs
            .read()
            .get(&id)
            .and_then(|events| events.last())
            .map_or(0, |event| event.id))
    }

    async fn clear(&self, id: DeploymentId) -> Result<()> {
        self.logs.write().remove(&id);
        Ok(())
    }
}
