//! The single-deployment pipeline.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use slipway_builder::artifact;
use slipway_core::{
    can_transition, CredentialId, Deployment, DeploymentState, Error, JobItem, ProviderKind,
    ProviderSecrets, Result, StatePatch,
};
use slipway_logbus::LogWriter;
use slipway_providers::{choose, recommend, SelectionPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::engine::EngineDeps;

/// Runs one leased item through the deployment steps.
pub(crate) struct Pipeline {
    deps: Arc<EngineDeps>,
    /// Workspace path, visible to the worker even if the pipeline
    /// future is dropped on a hard timeout.
    workspace_slot: Arc<Mutex<Option<PathBuf>>>,
}

impl Pipeline {
    pub(crate) fn new(deps: Arc<EngineDeps>, workspace_slot: Arc<Mutex<Option<PathBuf>>>) -> Self {
        Self {
            deps,
            workspace_slot,
        }
    }

    /// Drive the full step sequence. Returns the live URL.
    #[instrument(skip_all, fields(deployment_id = %item.deployment_id, attempt = item.attempts_made))]
    pub(crate) async fn execute(
        &self,
        item: &JobItem,
        token: &CancellationToken,
    ) -> Result<String> {
        let id = item.deployment_id;
        let log = LogWriter::new(self.deps.bus.clone(), id);
        let request = &item.request;

        // 1. Initialize.
        self.checkpoint(item, token)?;
        self.advance(id, DeploymentState::Cloning, StatePatch::none()).await?;
        if item.attempts_made > 1 {
            log.warn(
                "start",
                format!(
                    "retrying deployment (attempt {} of {})",
                    item.attempts_made, item.max_attempts
                ),
            )
            .await;
        }

        // 2. Clone.
        self.checkpoint(item, token)?;
        log.info(
            "clone",
            format!("cloning {} (branch {})", request.repo_url, request.branch),
        )
        .await;
        let workspace = self.deps.workspaces.create(id).await?;
        *self.workspace_slot.lock() = Some(workspace.clone());
        let fetch = self
            .deps
            .fetcher
            .fetch(&request.repo_url, &request.branch, &workspace, &log);
        if let Err(error) = abortable(token, fetch).await {
            if !matches!(error, Error::Cancelled) {
                log.error("clone", error.to_string()).await;
            }
            return Err(error);
        }
        log.info("clone", "repository cloned").await;

        // 3. Analyze. Total: always produces a result.
        self.checkpoint(item, token)?;
        log.info("analysis", "analyzing project stack").await;
        let detection = slipway_detector::detect(&workspace);
        self.advance(id, DeploymentState::Cloning, StatePatch::detection(detection.clone()))
            .await?;
        log.info(
            "analysis",
            format!(
                "detected {} ({}), build command {:?}, output {:?}",
                detection.framework,
                detection.project_type,
                detection.build_command,
                detection.build_directory
            ),
        )
        .await;

        // 4. Select provider.
        self.checkpoint(item, token)?;
        let policy = SelectionPolicy {
            environment: request.environment,
            budget: request.budget,
            preferred: request.preferred_providers.clone(),
            explicit: request.explicit_provider,
        };
        let provider = choose(&detection, &policy, &self.deps.registry);
        let why = if request.explicit_provider.is_some() {
            "explicitly requested".to_owned()
        } else {
            recommend(&detection, request.budget, &self.deps.registry)
                .iter()
                .find(|ranked| ranked.provider == provider)
                .map(|ranked| ranked.reasons.join("; "))
                .filter(|reasons| !reasons.is_empty())
                .unwrap_or_else(|| "selected by policy".to_owned())
        };
        log.info("provider-selection", format!("using {provider} ({why})")).await;
        self.advance(id, DeploymentState::Cloning, StatePatch::provider(provider))
            .await?;

        // 5. Load credentials.
        self.checkpoint(item, token)?;
        let (credential_id, secrets) = self
            .load_credentials(provider, request.explicit_credential_id)
            .await
            .inspect_err(|error| debug!(%error, "credential load failed"))?;
        log.info(
            "credentials",
            format!("using credential {credential_id} for {provider}"),
        )
        .await;

        // 6. Build. The state advances even when the build is skipped,
        // so every deployment walks the same forward path.
        self.checkpoint(item, token)?;
        self.advance(id, DeploymentState::Building, StatePatch::none()).await?;
        if detection.is_pure_static {
            log.info("build", "pure static site, no build needed").await;
        } else if detection.skips_build() && request.config.build_command.is_none() {
            log.info("build", "no build script found, deploying tree as-is").await;
        } else {
            log.info("build", "starting containerized build").await;
            let build = self.deps.builder.build(
                &workspace,
                id,
                &detection,
                &request.config,
                token,
                &log,
            );
            if let Err(error) = build.await {
                if !matches!(error, Error::Cancelled) {
                    log.error("build", error.to_string()).await;
                }
                return Err(error);
            }
            log.info("build", "build finished").await;
        }

        let resolution = artifact::resolve(&workspace, &detection, &request.config);
        if let Some(warning) = &resolution.fallback_warning {
            log.warn("artifact", warning.clone()).await;
        }

        // 7. Deploy.
        self.checkpoint(item, token)?;
        self.advance(id, DeploymentState::Deploying, StatePatch::none()).await?;
        log.info("deployment", format!("uploading artifact to {provider}")).await;
        let adapter = self
            .deps
            .registry
            .get(provider)
            .ok_or_else(|| Error::internal(format!("no adapter registered for {provider}")))?;
        let outcome = match abortable(
            token,
            adapter.deploy(&resolution.path, &request.config, request.environment, &secrets),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                if !matches!(error, Error::Cancelled) {
                    log.error("deployment", error.to_string()).await;
                }
                return Err(error);
            }
        };

        // An upload that finished just as cancellation landed gets
        // compensated best-effort.
        if self.is_cancel_requested(item, token) {
            log.warn("deployment", "cancelled after upload, deleting remote deployment")
                .await;
            let _ = adapter.delete(&outcome.deployment_id, &secrets).await;
            return Err(Error::Cancelled);
        }

        // 8. Finalize.
        self.advance(
            id,
            DeploymentState::Success,
            StatePatch {
                deployment_url: Some(outcome.url.clone()),
                ..StatePatch::none()
            },
        )
        .await?;
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "url".to_owned(),
            serde_json::Value::String(outcome.url.clone()),
        );
        metadata.insert(
            "provider_deployment_id".to_owned(),
            serde_json::Value::String(outcome.deployment_id.clone()),
        );
        log.success_with(
            "deployment",
            format!("deployment live at {}", outcome.url),
            metadata,
        )
        .await;

        Ok(outcome.url)
    }

    /// Cooperative checkpoint: a cancel observed here ends the attempt.
    fn checkpoint(&self, item: &JobItem, token: &CancellationToken) -> Result<()> {
        if self.is_cancel_requested(item, token) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn is_cancel_requested(&self, item: &JobItem, token: &CancellationToken) -> bool {
        token.is_cancelled() || self.deps.queue.is_cancel_requested(item.job_id)
    }

    /// Move the record forward, skipping silently when a retry attempt
    /// re-runs steps whose state the record already passed (the state
    /// machine never walks backward).
    async fn advance(
        &self,
        id: slipway_core::DeploymentId,
        target: DeploymentState,
        patch: StatePatch,
    ) -> Result<Deployment> {
        let current = self.deps.store.get(id).await?;
        if current.state == DeploymentState::Cancelled {
            // A cancel command landed while no checkpoint was near.
            return Err(Error::Cancelled);
        }
        if current.state == target || can_transition(current.state, target) {
            self.deps.store.update_state(id, target, patch).await
        } else {
            Ok(current)
        }
    }

    async fn load_credentials(
        &self,
        provider: ProviderKind,
        explicit: Option<CredentialId>,
    ) -> Result<(CredentialId, ProviderSecrets)> {
        match explicit {
            Some(credential_id) => {
                // An explicit credential must exist, be active, and
                // belong to the chosen provider; no silent fallback.
                let secrets = self
                    .deps
                    .vault
                    .get_decrypted(credential_id, None)
                    .await
                    .map_err(|_| Error::MissingCredential { provider })?;
                if secrets.provider() != provider {
                    return Err(Error::MissingCredential { provider });
                }
                Ok((credential_id, secrets))
            }
            None => self
                .deps
                .vault
                .get_first_active(provider)
                .await?
                .ok_or(Error::MissingCredential { provider }),
        }
    }
}

/// Race a step against the cancellation token. Dropping the inner
/// future aborts in-flight I/O best-effort.
async fn abortable<T>(
    token: &CancellationToken,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        () = token.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}
