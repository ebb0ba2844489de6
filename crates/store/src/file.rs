//! Durable file drivers.
//!
//! One JSON document per entity under the data directory:
//!
//! ```text
//! <data_dir>/deployments/<id>.json
//! <data_dir>/credentials/<id>.json
//! <data_dir>/logs/<id>.json        -- array of LogEvent, rewritten on append
//! ```
//!
//! Writes go to a sibling `.tmp` file then rename into place, so a crash
//! mid-write leaves the previous document intact. Mutations serialize on
//! an in-process lock per store; the single-writer-per-deployment rule
//! (the owning worker) keeps cross-process coordination out of scope.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use slipway_core::{
    Credential, CredentialId, Deployment, DeploymentId, DeploymentState, Error, LogEvent,
    LogQuery, ProviderKind, Result, StatePatch,
};

use crate::page::{DeploymentFilter, Page, PageRequest};
use crate::traits::{apply_state_update, CredentialStore, DeploymentStore, LogStore};

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::storage(format!("no parent directory for {}", path.display())))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(Error::storage)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(Error::storage)?;
    tokio::fs::rename(&tmp, path).await.map_err(Error::storage)?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| Error::storage(format!("corrupt document {}: {e}", path.display())))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::storage(e)),
    }
}

async fn list_documents<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut out = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(Error::storage(e)),
    };
    while let Some(entry) = entries.next_entry().await.map_err(Error::storage)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            if let Some(value) = read_json(&path).await? {
                out.push(value);
            }
        }
    }
    Ok(out)
}

/// File-backed [`DeploymentStore`].
pub struct FileDeploymentStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDeploymentStore {
    /// Documents live under `<data_dir>/deployments`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: data_dir.into().join("deployments"),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, id: DeploymentId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl DeploymentStore for FileDeploymentStore {
    async fn create(&self, deployment: Deployment) -> Result<()> {
        let path = self.path(deployment.id);
        if read_json::<Deployment>(&path).await?.is_some() {
            return Err(Error::conflict(format!(
                "deployment {} already exists",
                deployment.id
            )));
        }
        let bytes = serde_json::to_vec_pretty(&deployment).map_err(Error::storage)?;
        write_atomic(&path, &bytes).await
    }

    async fn get(&self, id: DeploymentId) -> Result<Deployment> {
        read_json(&self.path(id))
            .await?
            .ok_or_else(|| Error::not_found("deployment", id))
    }

    async fn list(
        &self,
        filter: DeploymentFilter,
        page: PageRequest,
    ) -> Result<Page<Deployment>> {
        let mut all: Vec<Deployment> = list_documents(&self.dir)
            .await?
            .into_iter()
            .filter(|d| filter.matches(d))
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
        let _guard = self.write_lock.lock().await;
        let current = self.get(id).await?;
        let updated = apply_state_update(current, new_state, patch)?;
        let bytes = serde_json::to_vec_pretty(&updated).map_err(Error::storage)?;
        write_atomic(&self.path(id), &bytes).await?;
        Ok(updated)
    }
}

/// File-backed [`CredentialStore`].
pub struct FileCredentialStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Documents live under `<data_dir>/credentials`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: data_dir.into().join("credentials"),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, id: CredentialId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn insert(&self, credential: Credential) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(credential.id);
        if read_json::<Credential>(&path).await?.is_some() {
            return Err(Error::conflict(format!(
                "credential {} already exists",
                credential.id
            )));
        }
        let bytes = serde_json::to_vec_pretty(&credential).map_err(Error::storage)?;
        write_atomic(&path, &bytes).await
    }

    async fn get(&self, id: CredentialId) -> Result<Credential> {
        read_json(&self.path(id))
            .await?
            .ok_or_else(|| Error::not_found("credential", id))
    }

    async fn list(&self, owner: &str) -> Result<Vec<Credential>> {
        let mut all: Vec<Credential> = list_documents(&self.dir)
            .await?
            .into_iter()
            .filter(|c: &Credential| c.owner == owner)
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn find_active(&self, provider: ProviderKind) -> Result<Option<Credential>> {
        let mut candidates: Vec<Credential> = list_documents(&self.dir)
            .await?
            .into_iter()
            .filter(|c: &Credential| c.usable_for(provider))
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(candidates.into_iter().next())
    }

    async fn update(&self, credential: Credential) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(credential.id);
        if read_json::<Credential>(&path).await?.is_none() {
            return Err(Error::not_found("credential", credential.id));
        }
        let bytes = serde_json::to_vec_pretty(&credential).map_err(Error::storage)?;
        write_atomic(&path, &bytes).await
    }

    async fn delete(&self, id: CredentialId) -> Result<()> {
        match tokio::fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("credential", id))
            }
            Err(e) => Err(Error::storage(e)),
        }
    }
}

/// File-backed [`LogStore`]: one array per deployment, rewritten on
/// append. Fine at the scale of one deployment's log.
pub struct FileLogStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLogStore {
    /// Documents live under `<data_dir>/logs`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: data_dir.into().join("logs"),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, id: DeploymentId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl LogStore for FileLogStore {
    async fn append(&self, event: LogEvent) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(event.deployment_id);
        let mut events: Vec<LogEvent> = read_json(&path).await?.unwrap_or_default();
        events.push(event);
        let bytes = serde_json::to_vec(&events).map_err(Error::storage)?;
        write_atomic(&path, &bytes).await
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
        Ok(read_json(&self.path(id)).await?.unwrap_or_default())
    }

    async fn last_id(&self, id: DeploymentId) -> Result<u64> {
        let events = self.read_all(id).await?;
        Ok(events.last().map_or(0, |event| event.id))
    }

    async fn clear(&self, id: DeploymentId) -> Result<()> {
        match tokio::fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use slipway_core::{Budget, DeployConfig, DeployRequest, Environment, LogLevel};
    use tempfile::TempDir;

    use super::*;

    fn deployment() -> Deployment {
        Deployment::from_request(
            DeploymentId::generate(),
            DeployRequest {
                repo_url: "https://github.com/acme/site".into(),
                branch: "main".into(),
                environment: Environment::Prod,
                budget: Budget::Any,
                preferred_providers: vec![],
                explicit_provider: None,
                explicit_credential_id: None,
                config: DeployConfig::default(),
            },
        )
    }

    fn event(deployment_id: DeploymentId, id: u64) -> LogEvent {
        LogEvent {
            id,
            deployment_id,
            timestamp: Utc::now(),
            level: LogLevel::Info,
            step: Some("clone".into()),
            message: format!("event {id}"),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn deployment_survives_store_reopen() {
        let dir = TempDir::new().unwrap();
        let dep = deployment();
        {
            let store = FileDeploymentStore::new(dir.path());
            store.create(dep.clone()).await.unwrap();
            store
                .update_state(dep.id, DeploymentState::Cloning, StatePatch::none())
                .await
                .unwrap();
        }
        let reopened = FileDeploymentStore::new(dir.path());
        let got = reopened.get(dep.id).await.unwrap();
        assert_eq!(got.state, DeploymentState::Cloning);
    }

    #[tokio::test]
    async fn log_append_is_durable_and_ordered() {
        let dir = TempDir::new().unwrap();
        let id = DeploymentId::generate();
        {
            let store = FileLogStore::new(dir.path());
            for i in 1..=3 {
                store.append(event(id, i)).await.unwrap();
            }
        }
        let reopened = FileLogStore::new(dir.path());
        let all = reopened.read_all(id).await.unwrap();
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(reopened.last_id(id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn credential_update_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path());
        let now = Utc::now();
        let mut cred = Credential {
            id: CredentialId::generate(),
            owner: "acme".into(),
            provider: ProviderKind::Netlify,
            name: "token".into(),
            ciphertext: "aa:bb".into(),
            is_active: true,
            is_valid: true,
            last_validated_at: None,
            created_at: now,
            updated_at: now,
        };
        store.insert(cred.clone()).await.unwrap();

        cred.is_active = false;
        store.update(cred.clone()).await.unwrap();
        assert!(store.find_active(ProviderKind::Netlify).await.unwrap().is_none());

        store.delete(cred.id).await.unwrap();
        assert!(store.get(cred.id).await.is_err());
        assert!(store.delete(cred.id).await.is_err());
    }

    #[tokio::test]
    async fn missing_log_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileLogStore::new(dir.path());
        let id = DeploymentId::generate();
        assert!(store.read_all(id).await.unwrap().is_empty());
        assert_eq!(store.last_id(id).await.unwrap(), 0);
        store.clear(id).await.unwrap();
    }

    #[tokio::test]
    async fn list_paginates_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = FileDeploymentStore::new(dir.path());
        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut dep = deployment();
            // Space creation times out so ordering is deterministic.
            dep.created_at = Utc::now() + chrono::Duration::milliseconds(ids.len() as i64);
            ids.push(dep.id);
            store.create(dep).await.unwrap();
        }
        let page = store
            .list(DeploymentFilter::default(), PageRequest { page: 1, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, ids[2]);
    }
}
