//! Vercel adapter: file-manifest deploys with status polling.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use slipway_core::{
    DeployConfig, Environment, Error, ProjectType, ProviderKind, ProviderSecrets, Result,
    VercelSecrets,
};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::adapter::{
    deploy_request_error, deploy_response_error, Capabilities, DeployOutcome, ProviderAdapter,
    RemoteStatus, StatusReport,
};

const API_BASE: &str = "https://api.vercel.com";
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const POLL_BUDGET: Duration = Duration::from_secs(60);

/// Drives the Vercel REST API.
pub struct VercelAdapter {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    poll_budget: Duration,
}

impl Default for VercelAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl VercelAdapter {
    /// Adapter against the production API.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(API_BASE)
    }

    /// Adapter against an arbitrary endpoint (tests point this at a
    /// mock server).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            poll_interval: POLL_INTERVAL,
            poll_budget: POLL_BUDGET,
        }
    }

    /// Shrink the status-poll cadence, for tests.
    #[must_use]
    pub fn with_polling(mut self, interval: Duration, budget: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_budget = budget;
        self
    }

    fn url(&self, path: &str, fields: &VercelSecrets) -> String {
        match &fields.team_id {
            Some(team) => format!("{}{path}?teamId={team}", self.base_url),
            None => format!("{}{path}", self.base_url),
        }
    }

    async fn fetch(&self, deployment_id: &str, fields: &VercelSecrets) -> Result<DeploymentResponse> {
        let response = self
            .client
            .get(self.url(&format!("/v13/deployments/{deployment_id}"), fields))
            .bearer_auth(fields.token.expose())
            .send()
            .await
            .map_err(|e| Error::transient(format!("vercel status failed: {e}")))?;
        if !response.status().is_success() {
            return Err(deploy_response_error(ProviderKind::Vercel, response).await);
        }
        response
            .json()
            .await
            .map_err(|e| Error::transient(format!("vercel status body: {e}")))
    }

    /// Poll until the deployment leaves the building states, within the
    /// poll budget.
    async fn wait_ready(
        &self,
        deployment_id: &str,
        fields: &VercelSecrets,
    ) -> Result<DeploymentResponse> {
        let deadline = tokio::time::Instant::now() + self.poll_budget;
        loop {
            let deployment = self.fetch(deployment_id, fields).await?;
            match deployment.ready_state.as_deref() {
                Some("READY") => return Ok(deployment),
                Some("ERROR" | "CANCELED") => {
                    return Err(Error::DeployFailed {
                        message: format!(
                            "vercel deployment ended in {}",
                            deployment.ready_state.as_deref().unwrap_or("ERROR")
                        ),
                        retryable: false,
                    });
                }
                state => {
                    debug!(deployment_id, ?state, "vercel deployment not ready yet");
                }
            }
            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Err(Error::DeployFailed {
                    message: "vercel deployment did not become ready in time".into(),
                    retryable: true,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ProviderAdapter for VercelAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Vercel
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_free_tier: true,
            max_artifact_mb: 250.0,
            supported_project_types: &[ProjectType::Static, ProjectType::Spa, ProjectType::Ssr],
            required_credential_fields: &["token"],
            required_config_fields: &["name"],
            optional_config_fields: &["build_command", "build_directory", "env_vars"],
        }
    }

    async fn validate(&self, secrets: &ProviderSecrets) -> Result<bool> {
        let fields = vercel_fields(secrets)?;
        let response = self
            .client
            .get(self.url("/v2/user", fields))
            .bearer_auth(fields.token.expose())
            .send()
            .await
            .map_err(|e| Error::ValidationUnavailable {
                message: format!("vercel unreachable: {e}"),
            })?;
        Ok(response.status().is_success())
    }

    async fn deploy(
        &self,
        artifact: &Path,
        config: &DeployConfig,
        environment: Environment,
        secrets: &ProviderSecrets,
    ) -> Result<DeployOutcome> {
        let fields = vercel_fields(secrets)?;
        let files = collect_files(artifact)?;
        info!(files = files.len(), "posting file manifest to vercel");

        let mut body = serde_json::json!({
            "name": config.name,
            "files": files,
            "projectSettings": {
                "buildCommand": null,
                "outputDirectory": null,
                "framework": null,
            },
        });
        if environment == Environment::Prod {
            body["target"] = serde_json::Value::String("production".into());
        }
        if let Some(project_id) = &fields.project_id {
            body["project"] = serde_json::Value::String(project_id.clone());
        }

        let response = self
            .client
            .post(self.url("/v13/deployments", fields))
            .bearer_auth(fields.token.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| deploy_request_error(ProviderKind::Vercel, &e))?;
        if !response.status().is_success() {
            return Err(deploy_response_error(ProviderKind::Vercel, response).await);
        }
        let created: DeploymentResponse = response
            .json()
            .await
            .map_err(|e| deploy_request_error(ProviderKind::Vercel, &e))?;

        let ready = self.wait_ready(&created.id, fields).await?;
        let url = normalize_url(ready.url.or(created.url));
        let mut metadata = BTreeMap::new();
        if let Some(project_id) = &fields.project_id {
            metadata.insert(
                "project_id".to_owned(),
                serde_json::Value::String(project_id.clone()),
            );
        }
        Ok(DeployOutcome {
            deployment_id: created.id,
            url,
            preview_url: None,
            metadata,
        })
    }

    async fn status(
        &self,
        deployment_id: &str,
        secrets: &ProviderSecrets,
    ) -> Result<StatusReport> {
        let fields = vercel_fields(secrets)?;
        let deployment = self.fetch(deployment_id, fields).await?;
        let status = match deployment.ready_state.as_deref() {
            Some("READY") => RemoteStatus::Success,
            Some("BUILDING") => RemoteStatus::Building,
            Some("ERROR" | "CANCELED") => RemoteStatus::Failed,
            _ => RemoteStatus::Pending,
        };
        Ok(StatusReport {
            status,
            url: deployment.url.map(|u| normalize_url(Some(u))),
            error: deployment.error_message,
            logs: None,
        })
    }

    async fn delete(&self, deployment_id: &str, secrets: &ProviderSecrets) -> Result<bool> {
        let fields = vercel_fields(secrets)?;
        let response = self
            .client
            .delete(self.url(&format!("/v13/deployments/{deployment_id}"), fields))
            .bearer_auth(fields.token.expose())
            .send()
            .await
            .map_err(|e| Error::transient(format!("vercel delete failed: {e}")))?;
        Ok(response.status().is_success())
    }
}

fn vercel_fields(secrets: &ProviderSecrets) -> Result<&VercelSecrets> {
    match secrets {
        ProviderSecrets::Vercel(fields) => Ok(fields),
        ProviderSecrets::Netlify(_) => Err(Error::internal(
            "vercel adapter handed netlify credentials",
        )),
    }
}

fn normalize_url(url: Option<String>) -> String {
    match url {
        Some(url) if url.starts_with("http") => url,
        Some(url) => format!("https://{url}"),
        None => String::new(),
    }
}

/// The `{file, data, encoding}` manifest Vercel expects.
#[derive(Debug, Serialize)]
struct ManifestFile {
    file: String,
    data: String,
    encoding: &'static str,
}

fn collect_files(dir: &Path) -> Result<Vec<ManifestFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name().into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| Error::internal(format!("artifact path escape: {e}")))?;
        let contents = std::fs::read(entry.path())
            .map_err(|e| Error::internal(format!("artifact read failed: {e}")))?;
        files.push(ManifestFile {
            file: relative.to_string_lossy().replace('\\', "/"),
            data: base64::engine::general_purpose::STANDARD.encode(contents),
            encoding: "base64",
        });
    }
    Ok(files)
}

#[derive(Debug, Deserialize)]
struct DeploymentResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "readyState")]
    ready_state: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}
