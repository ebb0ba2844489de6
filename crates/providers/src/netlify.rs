//! Netlify adapter: zip-based directory deploys.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use slipway_core::{
    DeployConfig, Environment, Error, NetlifySecrets, ProjectType, ProviderKind, ProviderSecrets,
    Result,
};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::adapter::{
    deploy_request_error, deploy_response_error, Capabilities, DeployOutcome, ProviderAdapter,
    RemoteStatus, StatusReport,
};

const API_BASE: &str = "https://api.netlify.com/api/v1";

/// Drives the Netlify REST API.
pub struct NetlifyAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl Default for NetlifyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl NetlifyAdapter {
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
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Reuse the credential's site when present, otherwise create one
    /// under a sanitized name (retrying once with a random suffix when
    /// the name is taken).
    async fn resolve_site(&self, config: &DeployConfig, fields: &NetlifySecrets) -> Result<String> {
        if let Some(site_id) = &fields.site_id {
            return Ok(site_id.clone());
        }
        let name = sanitize_site_name(&config.name);
        match self.create_site(&name, fields).await {
            Ok(site_id) => Ok(site_id),
            Err(Error::DeployFailed { retryable: false, .. }) => {
                let fallback = format!("{name}-{}", short_suffix());
                debug!(site = %fallback, "site name taken, retrying with suffix");
                self.create_site(&fallback, fields).await
            }
            Err(other) => Err(other),
        }
    }

    async fn create_site(&self, name: &str, fields: &NetlifySecrets) -> Result<String> {
        let response = self
            .client
            .post(self.url("/sites"))
            .bearer_auth(fields.access_token.expose())
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| deploy_request_error(ProviderKind::Netlify, &e))?;
        if !response.status().is_success() {
            return Err(deploy_response_error(ProviderKind::Netlify, response).await);
        }
        let site: SiteResponse = response
            .json()
            .await
            .map_err(|e| deploy_request_error(ProviderKind::Netlify, &e))?;
        Ok(site.id)
    }
}

#[async_trait]
impl ProviderAdapter for NetlifyAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Netlify
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_free_tier: true,
            max_artifact_mb: 100.0,
            supported_project_types: &[ProjectType::Static, ProjectType::Spa],
            required_credential_fields: &["access_token"],
            required_config_fields: &["name"],
            optional_config_fields: &["build_directory", "env_vars"],
        }
    }

    async fn validate(&self, secrets: &ProviderSecrets) -> Result<bool> {
        let fields = netlify_fields(secrets)?;
        let response = self
            .client
            .get(self.url("/user"))
            .bearer_auth(fields.access_token.expose())
            .send()
            .await
            .map_err(|e| Error::ValidationUnavailable {
                message: format!("netlify unreachable: {e}"),
            })?;
        Ok(response.status().is_success())
    }

    async fn deploy(
        &self,
        artifact: &Path,
        config: &DeployConfig,
        _environment: Environment,
        secrets: &ProviderSecrets,
    ) -> Result<DeployOutcome> {
        let fields = netlify_fields(secrets)?;
        let site_id = self.resolve_site(config, fields).await?;

        let archive = zip_directory(artifact.to_path_buf()).await?;
        info!(
            site_id,
            bytes = archive.len(),
            "uploading zipped artifact to netlify"
        );

        let response = self
            .client
            .post(self.url(&format!("/sites/{site_id}/deploys")))
            .bearer_auth(fields.access_token.expose())
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .body(archive)
            .send()
            .await
            .map_err(|e| deploy_request_error(ProviderKind::Netlify, &e))?;
        if !response.status().is_success() {
            return Err(deploy_response_error(ProviderKind::Netlify, response).await);
        }
        let deploy: DeployResponse = response
            .json()
            .await
            .map_err(|e| deploy_request_error(ProviderKind::Netlify, &e))?;

        let url = deploy
            .ssl_url
            .or(deploy.url)
            .unwrap_or_else(|| format!("https://{site_id}.netlify.app"));
        let mut metadata = BTreeMap::new();
        metadata.insert("site_id".to_owned(), serde_json::Value::String(site_id));
        Ok(DeployOutcome {
            deployment_id: deploy.id,
            url,
            preview_url: deploy.deploy_ssl_url,
            metadata,
        })
    }

    async fn status(
        &self,
        deployment_id: &str,
        secrets: &ProviderSecrets,
    ) -> Result<StatusReport> {
        let fields = netlify_fields(secrets)?;
        let response = self
            .client
            .get(self.url(&format!("/deploys/{deployment_id}")))
            .bearer_auth(fields.access_token.expose())
            .send()
            .await
            .map_err(|e| Error::transient(format!("netlify status failed: {e}")))?;
        if !response.status().is_success() {
            return Err(deploy_response_error(ProviderKind::Netlify, response).await);
        }
        let deploy: DeployResponse = response
            .json()
            .await
            .map_err(|e| Error::transient(format!("netlify status body: {e}")))?;

        let status = match deploy.state.as_deref() {
            Some("ready") => RemoteStatus::Success,
            Some("building" | "processing") => RemoteStatus::Building,
            Some("error" | "stopped") => RemoteStatus::Failed,
            _ => RemoteStatus::Pending,
        };
        Ok(StatusReport {
            status,
            url: deploy.ssl_url.or(deploy.url),
            error: deploy.error_message,
            logs: None,
        })
    }

    async fn delete(&self, deployment_id: &str, secrets: &ProviderSecrets) -> Result<bool> {
        let fields = netlify_fields(secrets)?;
        let response = self
            .client
            .delete(self.url(&format!("/deploys/{deployment_id}")))
            .bearer_auth(fields.access_token.expose())
            .send()
            .await
            .map_err(|e| Error::transient(format!("netlify delete failed: {e}")))?;
        Ok(response.status().is_success())
    }
}

fn netlify_fields(secrets: &ProviderSecrets) -> Result<&NetlifySecrets> {
    match secrets {
        ProviderSecrets::Netlify(fields) => Ok(fields),
        ProviderSecrets::Vercel(_) => Err(Error::internal(
            "netlify adapter handed vercel credentials",
        )),
    }
}

/// Lowercase, alphanumerics and dashes, no leading/trailing dash.
fn sanitize_site_name(name: &str) -> String {
    let mut out: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while out.starts_with('-') {
        out.remove(0);
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out = format!("site-{}", short_suffix());
    }
    out
}

fn short_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_owned()
}

/// Zip a directory tree, paths relative to its root.
async fn zip_directory(dir: PathBuf) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || zip_directory_sync(&dir))
        .await
        .map_err(|e| Error::internal(format!("zip task panicked: {e}")))?
}

fn zip_directory_sync(dir: &Path) -> Result<Vec<u8>> {
    let zip_error = |e: zip::result::ZipError| Error::internal(format!("zip failed: {e}"));
    let io_error = |e: std::io::Error| Error::internal(format!("artifact read failed: {e}"));

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| Error::internal(format!("artifact path escape: {e}")))?;
        let name = relative.to_string_lossy().replace('\\', "/");
        writer.start_file(name, options).map_err(zip_error)?;
        let contents = std::fs::read(entry.path()).map_err(io_error)?;
        writer.write_all(&contents).map_err(io_error)?;
    }
    let cursor = writer.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

#[derive(Debug, Deserialize)]
struct SiteResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DeployResponse {
    id: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    ssl_url: Option<String>,
    #[serde(default)]
    deploy_ssl_url: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use slipway_core::Budget;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn secrets(site_id: Option<&str>) -> ProviderSecrets {
        ProviderSecrets::Netlify(NetlifySecrets {
            access_token: "nfp_token".into(),
            site_id: site_id.map(str::to_owned),
        })
    }

    fn config(name: &str) -> DeployConfig {
        DeployConfig {
            name: name.into(),
            ..DeployConfig::default()
        }
    }

    fn artifact() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>hi</html>").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "console.log(1)").unwrap();
        dir
    }

    #[test]
    fn sanitize_site_names() {
        assert_eq!(sanitize_site_name("My Cool Site!"), "my-cool-site");
        assert_eq!(sanitize_site_name("--edge--"), "edge");
        assert!(sanitize_site_name("").starts_with("site-"));
    }

    #[test]
    fn zip_contains_relative_paths() {
        let dir = artifact();
        let bytes = zip_directory_sync(dir.path()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_owned())
            .collect();
        assert!(names.contains(&"index.html".to_owned()));
        assert!(names.contains(&"assets/app.js".to_owned()));
    }

    #[tokio::test]
    async fn validate_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer nfp_token"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let adapter = NetlifyAdapter::with_base_url(server.uri());
        assert!(adapter.validate(&secrets(None)).await.unwrap());
    }

    #[tokio::test]
    async fn validate_rejection_is_false_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let adapter = NetlifyAdapter::with_base_url(server.uri());
        assert!(!adapter.validate(&secrets(None)).await.unwrap());
    }

    #[tokio::test]
    async fn deploy_creates_site_then_uploads_zip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sites"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "site-123"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sites/site-123/deploys"))
            .and(header("content-type", "application/zip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "deploy-9",
                "state": "processing",
                "ssl_url": "https://my-site.netlify.app"
            })))
            .mount(&server)
            .await;

        let adapter = NetlifyAdapter::with_base_url(server.uri());
        let dir = artifact();
        let outcome = adapter
            .deploy(dir.path(), &config("My Site"), Environment::School, &secrets(None))
            .await
            .unwrap();
        assert_eq!(outcome.deployment_id, "deploy-9");
        assert_eq!(outcome.url, "https://my-site.netlify.app");
        assert_eq!(
            outcome.metadata.get("site_id"),
            Some(&serde_json::Value::String("site-123".into()))
        );
    }

    #[tokio::test]
    async fn deploy_reuses_site_from_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sites/existing/deploys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "deploy-1",
                "url": "http://existing.netlify.app"
            })))
            .mount(&server)
            .await;

        let adapter = NetlifyAdapter::with_base_url(server.uri());
        let dir = artifact();
        let outcome = adapter
            .deploy(
                dir.path(),
                &config("ignored"),
                Environment::Prod,
                &secrets(Some("existing")),
            )
            .await
            .unwrap();
        assert_eq!(outcome.deployment_id, "deploy-1");
    }

    #[tokio::test]
    async fn deploy_4xx_is_terminal_5xx_retryable() {
        for (code, retryable) in [(422u16, false), (502u16, true)] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/sites/existing/deploys"))
                .respond_with(ResponseTemplate::new(code))
                .mount(&server)
                .await;

            let adapter = NetlifyAdapter::with_base_url(server.uri());
            let dir = artifact();
            let err = adapter
                .deploy(
                    dir.path(),
                    &config("x"),
                    Environment::School,
                    &secrets(Some("existing")),
                )
                .await
                .unwrap_err();
            assert_eq!(err.is_retryable(), retryable, "status {code}");
        }
    }

    #[tokio::test]
    async fn status_maps_provider_states() {
        let cases = [
            ("ready", RemoteStatus::Success),
            ("building", RemoteStatus::Building),
            ("processing", RemoteStatus::Building),
            ("error", RemoteStatus::Failed),
            ("stopped", RemoteStatus::Failed),
            ("new", RemoteStatus::Pending),
        ];
        for (state, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/deploys/d1"))
                .respond_with(ResponseTemplate::new(200).set_body_json(
                    serde_json::json!({"id": "d1", "state": state}),
                ))
                .mount(&server)
                .await;
            let adapter = NetlifyAdapter::with_base_url(server.uri());
            let report = adapter.status("d1", &secrets(None)).await.unwrap();
            assert_eq!(report.status, expected, "state {state}");
        }
    }

    #[tokio::test]
    async fn capabilities_fit_static_sites() {
        let adapter = NetlifyAdapter::new();
        let caps = adapter.capabilities();
        assert!(caps.supports_free_tier);
        assert!(caps.supported_project_types.contains(&ProjectType::Static));
        assert!(Budget::Free.prefers_free_tier());
    }
}
