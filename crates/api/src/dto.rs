//! Wire DTOs. The HTTP surface speaks camelCase; the core stays
//! snake_case.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use slipway_core::{
    Budget, CredentialId, DeployConfig, DeployRequest, Deployment, DeploymentState, DetectionResult,
    Environment, Error, ProviderKind,
};

static REPO_URL: LazyLock<Regex> = LazyLock::new(|| {
    // Infallible: the pattern is a literal.
    Regex::new(r"^https://github\.com/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("valid regex")
});

/// Intake body for `POST /deploy`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployBody {
    /// GitHub repository URL.
    pub repo_url: String,
    /// Branch; defaults to `main`.
    #[serde(default)]
    pub branch: Option<String>,
    /// `school` | `staging` | `prod`.
    pub environment: String,
    /// `free` | `low` | `any`.
    pub budget: String,
    /// Ordered provider preferences.
    #[serde(default)]
    pub preferred_providers: Vec<String>,
    /// Skip selection and use exactly this provider.
    #[serde(default)]
    pub provider: Option<String>,
    /// Use exactly this credential.
    #[serde(default)]
    pub credential_id: Option<String>,
    /// Build/site configuration.
    #[serde(default)]
    pub config: DeployBodyConfig,
}

/// Intake sub-body for the project configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployBodyConfig {
    /// Site name; derived from the repository when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Build command override.
    #[serde(default)]
    pub build_command: Option<String>,
    /// Output directory override.
    #[serde(default)]
    pub build_directory: Option<String>,
    /// Environment variables for the build container.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

impl DeployBody {
    /// Validate and convert into the core intake request.
    pub fn into_request(self) -> Result<DeployRequest, Error> {
        if !REPO_URL.is_match(&self.repo_url) {
            return Err(Error::validation(
                "repoUrl must look like https://github.com/<owner>/<repo>",
            ));
        }
        let environment: Environment = self.environment.parse()?;
        let budget: Budget = self.budget.parse()?;
        let preferred_providers = self
            .preferred_providers
            .iter()
            .map(|p| p.parse::<ProviderKind>())
            .collect::<Result<Vec<_>, _>>()?;
        let explicit_provider = self
            .provider
            .as_deref()
            .map(str::parse::<ProviderKind>)
            .transpose()?;
        let explicit_credential_id = self
            .credential_id
            .as_deref()
            .map(CredentialId::parse)
            .transpose()
            .map_err(|e| Error::validation(e.to_string()))?;

        let name = self
            .config
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| repo_name(&self.repo_url));

        Ok(DeployRequest {
            repo_url: self.repo_url,
            branch: self.branch.filter(|b| !b.is_empty()).unwrap_or_else(|| "main".into()),
            environment,
            budget,
            preferred_providers,
            explicit_provider,
            explicit_credential_id,
            config: DeployConfig {
                name,
                build_command: self.config.build_command,
                build_directory: self.config.build_directory,
                env_vars: self.config.env_vars,
            },
        })
    }
}

fn repo_name(repo_url: &str) -> String {
    repo_url
        .rsplit('/')
        .next()
        .map_or_else(|| "site".to_owned(), |name| name.trim_end_matches(".git").to_owned())
}

/// `GET /deploy/{id}/status` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    /// The deployment id.
    pub deployment_id: String,
    /// Current state.
    pub state: DeploymentState,
    /// Repository URL.
    pub repo_url: String,
    /// Branch requested at intake.
    pub branch: String,
    /// Chosen provider, once selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    /// Live URL on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Sanitized failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Detection result once analyzed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected: Option<DetectionResult>,
    /// Intake time.
    pub created_at: DateTime<Utc>,
    /// First entry into building.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Deployment> for DeploymentStatus {
    fn from(deployment: Deployment) -> Self {
        Self {
            deployment_id: deployment.id.to_string(),
            state: deployment.state,
            repo_url: deployment.repo_url,
            branch: deployment.branch,
            provider: deployment.chosen_provider,
            url: deployment.deployment_url,
            error: deployment.error_message,
            detected: deployment.detected,
            created_at: deployment.created_at,
            started_at: deployment.started_at,
            completed_at: deployment.completed_at,
        }
    }
}

/// Ciphertext-free credential view on the wire.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDto {
    /// The credential id.
    pub id: String,
    /// Provider.
    pub provider: ProviderKind,
    /// Display name.
    pub name: String,
    /// Active flag.
    pub is_active: bool,
    /// Last known validation outcome.
    pub is_valid: bool,
    /// When the provider last checked the secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<slipway_core::CredentialSummary> for CredentialDto {
    fn from(summary: slipway_core::CredentialSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            provider: summary.provider,
            name: summary.name,
            is_active: summary.is_active,
            is_valid: summary.is_valid,
            last_validated_at: summary.last_validated_at,
            created_at: summary.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(repo: &str) -> DeployBody {
        DeployBody {
            repo_url: repo.into(),
            branch: None,
            environment: "school".into(),
            budget: "free".into(),
            preferred_providers: vec![],
            provider: None,
            credential_id: None,
            config: DeployBodyConfig::default(),
        }
    }

    #[test]
    fn valid_intake_converts() {
        let request = body("https://github.com/acme/my-site").into_request().unwrap();
        assert_eq!(request.branch, "main");
        assert_eq!(request.environment, Environment::School);
        assert_eq!(request.budget, Budget::Free);
        assert_eq!(request.config.name, "my-site");
    }

    #[test]
    fn repo_url_shape_is_enforced() {
        for bad in [
            "http://github.com/a/b",
            "https://gitlab.com/a/b",
            "https://github.com/a",
            "https://github.com/a/b/c",
            "https://github.com/a/b; rm -rf /",
        ] {
            assert!(body(bad).into_request().is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn unknown_environment_or_budget_rejected() {
        let mut b = body("https://github.com/a/b");
        b.environment = "production".into();
        assert!(b.into_request().is_err());

        let mut b = body("https://github.com/a/b");
        b.budget = "unlimited".into();
        assert!(b.into_request().is_err());
    }

    #[test]
    fn provider_strings_parse() {
        let mut b = body("https://github.com/a/b");
        b.provider = Some("netlify".into());
        b.preferred_providers = vec!["vercel".into()];
        let request = b.into_request().unwrap();
        assert_eq!(request.explicit_provider, Some(ProviderKind::Netlify));
        assert_eq!(request.preferred_providers, vec![ProviderKind::Vercel]);
    }

    #[test]
    fn git_suffix_stripped_from_derived_name() {
        let request = body("https://github.com/acme/site.git").into_request().unwrap();
        assert_eq!(request.config.name, "site");
    }
}
