//! Stored (encrypted) provider credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::CredentialId;
use crate::provider::ProviderKind;

/// An encrypted credential at rest.
///
/// `ciphertext` is `<hex-nonce>:<hex-ciphertext>` and decrypts to the
/// provider's declared field set (see
/// [`crate::secret::ProviderSecrets`]). Plaintext never appears on this
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Unique identifier.
    pub id: CredentialId,
    /// Owning account.
    pub owner: String,
    /// Which provider the secret authenticates against.
    pub provider: ProviderKind,
    /// Display name.
    pub name: String,
    /// `<hex-nonce>:<hex-ciphertext>` of the serialized secret fields.
    pub ciphertext: String,
    /// Deactivated credentials are never used by the pipeline.
    pub is_active: bool,
    /// Outcome of the most recent provider validation.
    pub is_valid: bool,
    /// When the provider last confirmed (or rejected) the secret.
    #[serde(default)]
    pub last_validated_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the pipeline may use this credential for `provider`.
    #[must_use]
    pub fn usable_for(&self, provider: ProviderKind) -> bool {
        self.is_active && self.provider == provider
    }

    /// The ciphertext-free view returned by list operations.
    #[must_use]
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            id: self.id,
            owner: self.owner.clone(),
            provider: self.provider,
            name: self.name.clone(),
            is_active: self.is_active,
            is_valid: self.is_valid,
            last_validated_at: self.last_validated_at,
            created_at: self.created_at,
        }
    }
}

/// A [`Credential`] without its ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSummary {
    /// Unique identifier.
    pub id: CredentialId,
    /// Owning account.
    pub owner: String,
    /// Provider.
    pub provider: ProviderKind,
    /// Display name.
    pub name: String,
    /// Active flag.
    pub is_active: bool,
    /// Last known validation outcome.
    pub is_valid: bool,
    /// When the provider last checked the secret.
    #[serde(default)]
    pub last_validated_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(provider: ProviderKind, is_active: bool) -> Credential {
        let now = Utc::now();
        Credential {
            id: CredentialId::generate(),
            owner: "acme".into(),
            provider,
            name: "team token".into(),
            ciphertext: "00:00".into(),
            is_active,
            is_valid: true,
            last_validated_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn usable_requires_active_and_matching_provider() {
        let cred = credential(ProviderKind::Netlify, true);
        assert!(cred.usable_for(ProviderKind::Netlify));
        assert!(!cred.usable_for(ProviderKind::Vercel));

        let inactive = credential(ProviderKind::Netlify, false);
        assert!(!inactive.usable_for(ProviderKind::Netlify));
    }

    #[test]
    fn summary_omits_ciphertext() {
        let cred = credential(ProviderKind::Vercel, true);
        let summary = cred.summary();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("ciphertext"));
        assert_eq!(summary.id, cred.id);
        assert_eq!(summary.provider, ProviderKind::Vercel);
    }
}
