//! Secret material and provider credential records.
//!
//! [`Secret`] wraps a sensitive string so it cannot leak through `Debug`
//! or `Display` and is zeroed on drop. [`ProviderSecrets`] is the
//! decrypted form of a stored credential; its serialized field set is the
//! provider's declared credential schema.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::error::Error;
use crate::provider::ProviderKind;

/// A sensitive string: redacted in `Debug`/`Display`, zeroed on drop.
///
/// Serde support exists so secrets survive the encrypt/decrypt
/// round-trip; serialized forms must only ever be handed to the vault's
/// cipher, never to logs or API responses.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl Secret {
    /// Wrap a sensitive string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Access the inner value. Call sites should be few and obvious.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the secret is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("****")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Netlify credential fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetlifySecrets {
    /// Personal access token used as a bearer token.
    pub access_token: Secret,
    /// Existing site to deploy into; a site is created when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
}

/// Vercel credential fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VercelSecrets {
    /// API token used as a bearer token.
    pub token: Secret,
    /// Existing project to deploy into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Team scope for all API calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

/// Decrypted, provider-specific credential record.
#[derive(Debug, Clone)]
pub enum ProviderSecrets {
    /// Netlify fields.
    Netlify(NetlifySecrets),
    /// Vercel fields.
    Vercel(VercelSecrets),
}

impl ProviderSecrets {
    /// The provider these secrets belong to.
    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Netlify(_) => ProviderKind::Netlify,
            Self::Vercel(_) => ProviderKind::Vercel,
        }
    }

    /// Serialize to the provider's credential field set, for encryption.
    pub fn to_json(&self) -> Result<String, Error> {
        let result = match self {
            Self::Netlify(fields) => serde_json::to_string(fields),
            Self::Vercel(fields) => serde_json::to_string(fields),
        };
        result.map_err(|e| Error::internal(format!("credential serialization failed: {e}")))
    }

    /// Parse a decrypted (or intake) credential document for `provider`.
    ///
    /// Rejects documents whose field set does not match the provider's
    /// schema with [`Error::InvalidCredential`].
    pub fn from_json(provider: ProviderKind, json: &str) -> Result<Self, Error> {
        let invalid = |e: serde_json::Error| Error::InvalidCredential {
            message: format!("credential fields do not match {provider} schema: {e}"),
        };
        match provider {
            ProviderKind::Netlify => {
                let fields: NetlifySecrets = serde_json::from_str(json).map_err(invalid)?;
                if fields.access_token.is_empty() {
                    return Err(Error::InvalidCredential {
                        message: "access_token must not be empty".into(),
                    });
                }
                Ok(Self::Netlify(fields))
            }
            ProviderKind::Vercel => {
                let fields: VercelSecrets = serde_json::from_str(json).map_err(invalid)?;
                if fields.token.is_empty() {
                    return Err(Error::InvalidCredential {
                        message: "token must not be empty".into(),
                    });
                }
                Ok(Self::Vercel(fields))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("nfp_supersecret");
        assert_eq!(format!("{secret:?}"), "Secret(****)");
        assert_eq!(secret.to_string(), "****");
    }

    #[test]
    fn secret_exposes_inner_value() {
        let secret = Secret::new("tok");
        assert_eq!(secret.expose(), "tok");
    }

    #[test]
    fn netlify_roundtrip() {
        let secrets = ProviderSecrets::Netlify(NetlifySecrets {
            access_token: "nfp_abc".into(),
            site_id: Some("site-1".into()),
        });
        let json = secrets.to_json().unwrap();
        let back = ProviderSecrets::from_json(ProviderKind::Netlify, &json).unwrap();
        match back {
            ProviderSecrets::Netlify(fields) => {
                assert_eq!(fields.access_token.expose(), "nfp_abc");
                assert_eq!(fields.site_id.as_deref(), Some("site-1"));
            }
            ProviderSecrets::Vercel(_) => panic!("wrong provider"),
        }
    }

    #[test]
    fn vercel_optional_fields_default() {
        let back =
            ProviderSecrets::from_json(ProviderKind::Vercel, r#"{"token":"vc_tok"}"#).unwrap();
        match back {
            ProviderSecrets::Vercel(fields) => {
                assert_eq!(fields.token.expose(), "vc_tok");
                assert!(fields.project_id.is_none());
                assert!(fields.team_id.is_none());
            }
            ProviderSecrets::Netlify(_) => panic!("wrong provider"),
        }
    }

    #[test]
    fn wrong_schema_is_invalid_credential() {
        let err = ProviderSecrets::from_json(ProviderKind::Netlify, r#"{"token":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredential { .. }));
    }

    #[test]
    fn empty_token_is_invalid() {
        let err =
            ProviderSecrets::from_json(ProviderKind::Vercel, r#"{"token":""}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidCredential { .. }));
    }

    #[test]
    fn serialized_form_contains_no_redaction() {
        let secrets = ProviderSecrets::Vercel(VercelSecrets {
            token: "vc_tok".into(),
            project_id: None,
            team_id: None,
        });
        let json = secrets.to_json().unwrap();
        assert!(json.contains("vc_tok"));
        assert!(!json.contains("****"));
    }
}
