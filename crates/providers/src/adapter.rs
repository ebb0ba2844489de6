//! The uniform provider adapter contract.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use slipway_core::{
    DeployConfig, Environment, Error, ProjectType, ProviderKind, ProviderSecrets, Result,
};

/// What a provider can do, declared statically per adapter.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    /// Whether a free tier exists.
    pub supports_free_tier: bool,
    /// Largest artifact the provider accepts.
    pub max_artifact_mb: f64,
    /// Project categories the provider hosts well.
    pub supported_project_types: &'static [ProjectType],
    /// Credential fields the adapter requires.
    pub required_credential_fields: &'static [&'static str],
    /// Config fields the adapter requires.
    pub required_config_fields: &'static [&'static str],
    /// Config fields the adapter understands but does not require.
    pub optional_config_fields: &'static [&'static str],
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    /// Provider-side deployment identifier.
    pub deployment_id: String,
    /// Live URL.
    pub url: String,
    /// Preview URL, when the provider distinguishes one.
    pub preview_url: Option<String>,
    /// Provider-specific extras (site id, team, ...).
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Provider-side deployment state, normalized across adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    /// Accepted, not yet building.
    Pending,
    /// Provider is building/processing.
    Building,
    /// Live.
    Success,
    /// Provider gave up.
    Failed,
}

/// Snapshot of a provider-side deployment.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Normalized state.
    pub status: RemoteStatus,
    /// Live URL when known.
    pub url: Option<String>,
    /// Provider-reported error when failed.
    pub error: Option<String>,
    /// Provider-side log excerpt when available.
    pub logs: Option<String>,
}

/// A provider adapter: stateless, all context in arguments.
///
/// The set is closed (see [`ProviderKind`]); adapters are constructed
/// once at process start and registered in a fixed order.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider this adapter drives.
    fn kind(&self) -> ProviderKind;

    /// Static capability record.
    fn capabilities(&self) -> Capabilities;

    /// Check a secret against the provider API.
    ///
    /// `Ok(false)` means the provider rejected it; unreachable APIs are
    /// [`Error::ValidationUnavailable`].
    async fn validate(&self, secrets: &ProviderSecrets) -> Result<bool>;

    /// Package the artifact directory the provider's way and upload it.
    /// May block up to an adapter-specific bound.
    async fn deploy(
        &self,
        artifact: &Path,
        config: &DeployConfig,
        environment: Environment,
        secrets: &ProviderSecrets,
    ) -> Result<DeployOutcome>;

    /// Provider-side state of an earlier deployment.
    async fn status(&self, deployment_id: &str, secrets: &ProviderSecrets)
        -> Result<StatusReport>;

    /// Best-effort removal of a provider-side deployment.
    async fn delete(&self, deployment_id: &str, secrets: &ProviderSecrets) -> Result<bool>;
}

/// Map a transport-level failure on the deploy path.
pub(crate) fn deploy_request_error(provider: ProviderKind, error: &reqwest::Error) -> Error {
    Error::DeployFailed {
        message: format!("{provider} request failed: {error}"),
        retryable: true,
    }
}

/// Map an HTTP response status on the deploy path: 4xx-class rejections
/// are terminal, 5xx-class are retryable.
pub(crate) async fn deploy_response_error(
    provider: ProviderKind,
    response: reqwest::Response,
) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = body.chars().take(300).collect::<String>();
    Error::DeployFailed {
        message: format!("{provider} returned {status}: {detail}"),
        retryable: status.is_server_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RemoteStatus::Building).unwrap(),
            "\"building\""
        );
    }
}
