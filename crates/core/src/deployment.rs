//! The deployment record and its state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::DetectionResult;
use crate::error::Error;
use crate::id::{CredentialId, DeploymentId, JobId};
use crate::provider::ProviderKind;

/// Target environment of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Classroom/demo deployments.
    School,
    /// Pre-production.
    Staging,
    /// Production.
    Prod,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::School => write!(f, "school"),
            Self::Staging => write!(f, "staging"),
            Self::Prod => write!(f, "prod"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "school" => Ok(Self::School),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            other => Err(Error::validation(format!("unknown environment: {other}"))),
        }
    }
}

/// Cost policy for provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Budget {
    /// Free tier only.
    Free,
    /// Prefer free, tolerate low cost.
    Low,
    /// No cost constraint.
    Any,
}

impl Budget {
    /// Whether selection should favor providers with a free tier.
    #[must_use]
    pub fn prefers_free_tier(&self) -> bool {
        matches!(self, Self::Free | Self::Low)
    }
}

impl std::str::FromStr for Budget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "low" => Ok(Self::Low),
            "any" => Ok(Self::Any),
            other => Err(Error::validation(format!("unknown budget: {other}"))),
        }
    }
}

/// Where a deployment is in its lifecycle.
///
/// Transitions follow `queued -> cloning -> building -> deploying ->
/// success`, ending early at `failed`, with `cancelled` able to preempt
/// any non-terminal state. Never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// Accepted, waiting for a worker.
    Queued,
    /// Fetching the repository.
    Cloning,
    /// Running (or skipping) the build.
    Building,
    /// Uploading to the chosen provider.
    Deploying,
    /// Live; `deployment_url` is set.
    Success,
    /// Ended in error; `error_message` is set.
    Failed,
    /// Preempted by a cancel request.
    Cancelled,
}

impl DeploymentState {
    /// Returns `true` if the deployment has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Position in the forward chain, used to reject backward moves.
    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Cloning => 1,
            Self::Building => 2,
            Self::Deploying => 3,
            Self::Success | Self::Failed | Self::Cancelled => 4,
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Cloning => "cloning",
            Self::Building => "building",
            Self::Deploying => "deploying",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Returns `true` if the transition from `from` to `to` is valid.
///
/// `from == to` is permitted so that patch-only updates (setting
/// `detected`, `chosen_provider`, ...) go through the same path.
#[must_use]
pub fn can_transition(from: DeploymentState, to: DeploymentState) -> bool {
    use DeploymentState::{Cancelled, Deploying, Failed, Success};

    if from == to {
        return !from.is_terminal();
    }
    if from.is_terminal() {
        return false;
    }
    match to {
        // Cancel may preempt any non-terminal state.
        Cancelled => true,
        // Failure may strike any active step.
        Failed => true,
        // Success only out of the upload step.
        Success => from == Deploying,
        // Forward moves only, one step at a time.
        _ => to.rank() == from.rank() + 1,
    }
}

/// Validate a transition, returning an error if invalid.
pub fn validate_transition(from: DeploymentState, to: DeploymentState) -> Result<(), Error> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// User-supplied deployment configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Project name, used for provider site naming.
    pub name: String,
    /// Overrides the detected build command.
    #[serde(default)]
    pub build_command: Option<String>,
    /// Overrides the detected build output directory.
    #[serde(default)]
    pub build_directory: Option<String>,
    /// Environment variables injected into the build container.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

/// Everything intake captures about one requested deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// GitHub repository URL.
    pub repo_url: String,
    /// Branch to clone; defaults to `main` at intake.
    pub branch: String,
    /// Target environment.
    pub environment: Environment,
    /// Cost policy.
    pub budget: Budget,
    /// Ordered provider preferences; may be empty.
    #[serde(default)]
    pub preferred_providers: Vec<ProviderKind>,
    /// Skip selection and use exactly this provider.
    #[serde(default)]
    pub explicit_provider: Option<ProviderKind>,
    /// Use exactly this credential instead of the first active one.
    #[serde(default)]
    pub explicit_credential_id: Option<CredentialId>,
    /// Build/site configuration.
    pub config: DeployConfig,
}

/// Fields a worker may set alongside a state change.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    /// Provider chosen by selection; set once.
    pub chosen_provider: Option<ProviderKind>,
    /// Live URL; only ever set together with `Success`.
    pub deployment_url: Option<String>,
    /// Sanitized failure description; only with `Failed`.
    pub error_message: Option<String>,
    /// Detection result; monotonic once set.
    pub detected: Option<DetectionResult>,
    /// Handle of the queue item driving this deployment.
    pub job_id: Option<JobId>,
}

impl StatePatch {
    /// A patch that changes nothing besides the state.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Patch setting only the chosen provider.
    #[must_use]
    pub fn provider(kind: ProviderKind) -> Self {
        Self {
            chosen_provider: Some(kind),
            ..Self::default()
        }
    }

    /// Patch setting only the detection result.
    #[must_use]
    pub fn detection(detected: DetectionResult) -> Self {
        Self {
            detected: Some(detected),
            ..Self::default()
        }
    }

    /// Patch setting only the failure message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One tracked deployment, from intake to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique identifier.
    pub id: DeploymentId,
    /// GitHub repository URL.
    pub repo_url: String,
    /// Requested branch.
    pub branch: String,
    /// Target environment.
    pub environment: Environment,
    /// Cost policy.
    pub budget: Budget,
    /// Ordered provider preferences.
    #[serde(default)]
    pub preferred_providers: Vec<ProviderKind>,
    /// Explicit provider override.
    #[serde(default)]
    pub explicit_provider: Option<ProviderKind>,
    /// Explicit credential override.
    #[serde(default)]
    pub explicit_credential_id: Option<CredentialId>,
    /// Build/site configuration.
    pub config: DeployConfig,
    /// Current lifecycle state.
    pub state: DeploymentState,
    /// Provider chosen by selection.
    #[serde(default)]
    pub chosen_provider: Option<ProviderKind>,
    /// Live URL once successful.
    #[serde(default)]
    pub deployment_url: Option<String>,
    /// Sanitized failure description once failed.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Stack detection result once analyzed.
    #[serde(default)]
    pub detected: Option<DetectionResult>,
    /// When intake accepted the request.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// First entry into `building`.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Entry into a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Queue item handle.
    #[serde(default)]
    pub job_id: Option<JobId>,
}

impl Deployment {
    /// Create a fresh `queued` record from an intake request.
    #[must_use]
    pub fn from_request(id: DeploymentId, request: DeployRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            repo_url: request.repo_url,
            branch: request.branch,
            environment: request.environment,
            budget: request.budget,
            preferred_providers: request.preferred_providers,
            explicit_provider: request.explicit_provider,
            explicit_credential_id: request.explicit_credential_id,
            config: request.config,
            state: DeploymentState::Queued,
            chosen_provider: None,
            deployment_url: None,
            error_message: None,
            detected: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            job_id: None,
        }
    }

    /// Rebuild the intake request this record was created from, used as
    /// the queue payload.
    #[must_use]
    pub fn to_request(&self) -> DeployRequest {
        DeployRequest {
            repo_url: self.repo_url.clone(),
            branch: self.branch.clone(),
            environment: self.environment,
            budget: self.budget,
            preferred_providers: self.preferred_providers.clone(),
            explicit_provider: self.explicit_provider,
            explicit_credential_id: self.explicit_credential_id,
            config: self.config.clone(),
        }
    }
}
