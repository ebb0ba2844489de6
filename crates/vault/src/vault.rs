//! Credential vault operations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use slipway_core::{
    Credential, CredentialId, CredentialSummary, Error, ProviderKind, ProviderSecrets, Result,
};
use slipway_store::CredentialStore;
use tracing::{info, warn};

use crate::crypto::{Cipher, KeySource};

/// Checks a decrypted secret against its provider's API.
///
/// Implemented by the provider registry; the vault stays independent of
/// the adapters and is handed this seam at construction.
#[async_trait]
pub trait SecretValidator: Send + Sync {
    /// `Ok(true)` -- the provider accepted the secret. `Ok(false)` -- the
    /// provider rejected it. `Err` -- the provider could not be reached
    /// ([`Error::ValidationUnavailable`]); the stored `is_valid` flag
    /// must not change on that path.
    async fn validate(&self, secrets: &ProviderSecrets) -> Result<bool>;
}

/// Fields [`Vault::update`] may change.
#[derive(Debug, Default)]
pub struct CredentialUpdate {
    /// New display name.
    pub name: Option<String>,
    /// Activate/deactivate.
    pub is_active: Option<bool>,
    /// Replace the secret material (revalidated and re-encrypted).
    pub new_secrets: Option<ProviderSecrets>,
}

/// Outcome of an explicit validation call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationOutcome {
    /// Whether the provider accepted the secret.
    pub is_valid: bool,
    /// Provider-reported detail when rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Encrypted at-rest storage of provider secrets.
///
/// Plaintext exists only in memory, between decryption and the adapter
/// call; it never reaches logs or the deployment record.
pub struct Vault {
    store: Arc<dyn CredentialStore>,
    validator: Arc<dyn SecretValidator>,
    cipher: Cipher,
}

impl Vault {
    /// Build the vault. Logs a warning in the ephemeral-key degraded
    /// mode (credentials then do not survive a restart).
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        validator: Arc<dyn SecretValidator>,
        configured_key: Option<&str>,
    ) -> Self {
        let (cipher, source) = Cipher::from_config(configured_key);
        if source == KeySource::Ephemeral {
            warn!(
                "no ENCRYPTION_KEY configured; using an ephemeral vault key -- \
                 stored credentials will not be readable after a restart"
            );
        }
        Self {
            store,
            validator,
            cipher,
        }
    }

    /// Create, validate, encrypt, and persist a credential.
    ///
    /// Rejects with [`Error::Conflict`] when an active credential
    /// already exists for `(owner, provider)`, and with
    /// [`Error::InvalidCredential`] when the provider rejects the
    /// secret.
    pub async fn create(
        &self,
        owner: &str,
        provider: ProviderKind,
        name: &str,
        secrets: ProviderSecrets,
    ) -> Result<CredentialSummary> {
        if secrets.provider() != provider {
            return Err(Error::validation(format!(
                "credential fields are for {} but provider is {provider}",
                secrets.provider()
            )));
        }
        let existing = self.store.list(owner).await?;
        if existing.iter().any(|c| c.is_active && c.provider == provider) {
            return Err(Error::conflict(format!(
                "an active {provider} credential already exists for this owner"
            )));
        }

        if !self.validator.validate(&secrets).await? {
            return Err(Error::InvalidCredential {
                message: format!("{provider} rejected the supplied credentials"),
            });
        }

        let ciphertext = self.cipher.encrypt(secrets.to_json()?.as_bytes())?;
        let now = Utc::now();
        let credential = Credential {
            id: CredentialId::generate(),
            owner: owner.to_owned(),
            provider,
            name: name.to_owned(),
            ciphertext,
            is_active: true,
            is_valid: true,
            last_validated_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        self.store.insert(credential.clone()).await?;
        info!(credential_id = %credential.id, %provider, owner, "credential stored");
        Ok(credential.summary())
    }

    /// Ciphertext-free listing for one owner.
    pub async fn list(&self, owner: &str) -> Result<Vec<CredentialSummary>> {
        Ok(self
            .store
            .list(owner)
            .await?
            .iter()
            .map(Credential::summary)
            .collect())
    }

    /// Decrypt one credential for use.
    ///
    /// With `owner` set, a record belonging to someone else reads as
    /// [`Error::NotFound`]. Inactive credentials are refused.
    pub async fn get_decrypted(
        &self,
        id: CredentialId,
        owner: Option<&str>,
    ) -> Result<ProviderSecrets> {
        let credential = self.store.get(id).await?;
        if owner.is_some_and(|owner| credential.owner != owner) {
            return Err(Error::not_found("credential", id));
        }
        if !credential.is_active {
            return Err(Error::CredentialInactive { id: id.to_string() });
        }
        self.decrypt(&credential)
    }

    /// The oldest active credential for `provider`, decrypted, if any.
    /// Used when a deployment did not name a credential.
    pub async fn get_first_active(
        &self,
        provider: ProviderKind,
    ) -> Result<Option<(CredentialId, ProviderSecrets)>> {
        match self.store.find_active(provider).await? {
            None => Ok(None),
            Some(credential) => {
                let secrets = self.decrypt(&credential)?;
                Ok(Some((credential.id, secrets)))
            }
        }
    }

    /// Update name/activation/secret material.
    ///
    /// A secret change is revalidated and re-encrypted atomically: the
    /// record is rewritten once, with `is_valid` and
    /// `last_validated_at` refreshed as a side effect.
    pub async fn update(
        &self,
        id: CredentialId,
        owner: &str,
        update: CredentialUpdate,
    ) -> Result<CredentialSummary> {
        let mut credential = self.store.get(id).await?;
        if credential.owner != owner {
            return Err(Error::not_found("credential", id));
        }

        if let Some(name) = update.name {
            credential.name = name;
        }
        if let Some(is_active) = update.is_active {
            credential.is_active = is_active;
        }
        if let Some(secrets) = update.new_secrets {
            if secrets.provider() != credential.provider {
                return Err(Error::validation(format!(
                    "replacement fields are for {} but credential is for {}",
                    secrets.provider(),
                    credential.provider
                )));
            }
            if !self.validator.validate(&secrets).await? {
                return Err(Error::InvalidCredential {
                    message: format!(
                        "{} rejected the replacement credentials",
                        credential.provider
                    ),
                });
            }
            credential.ciphertext = self.cipher.encrypt(secrets.to_json()?.as_bytes())?;
            credential.is_valid = true;
            credential.last_validated_at = Some(Utc::now());
        }
        credential.updated_at = Utc::now();
        self.store.update(credential.clone()).await?;
        Ok(credential.summary())
    }

    /// Hard-delete a credential.
    pub async fn delete(&self, id: CredentialId, owner: &str) -> Result<()> {
        let credential = self.store.get(id).await?;
        if credential.owner != owner {
            return Err(Error::not_found("credential", id));
        }
        self.store.delete(id).await?;
        info!(credential_id = %id, owner, "credential deleted");
        Ok(())
    }

    /// Re-check a credential against its provider and persist the
    /// outcome.
    ///
    /// A rejection marks `is_valid = false` but never deletes the
    /// record. Network failures surface as
    /// [`Error::ValidationUnavailable`] and leave `is_valid` untouched.
    pub async fn validate(&self, id: CredentialId) -> Result<ValidationOutcome> {
        let mut credential = self.store.get(id).await?;
        let secrets = self.decrypt(&credential)?;

        let is_valid = self.validator.validate(&secrets).await?;
        credential.is_valid = is_valid;
        credential.last_validated_at = Some(Utc::now());
        credential.updated_at = Utc::now();
        self.store.update(credential).await?;

        Ok(ValidationOutcome {
            is_valid,
            error: (!is_valid).then(|| "provider rejected the credential".to_owned()),
        })
    }

    fn decrypt(&self, credential: &Credential) -> Result<ProviderSecrets> {
        let plaintext = self.cipher.decrypt(&credential.ciphertext)?;
        let json = std::str::from_utf8(&plaintext)
            .map_err(|_| Error::internal("decrypted credential is not utf-8"))?;
        ProviderSecrets::from_json(credential.provider, json)
    }
}
