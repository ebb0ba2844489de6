//! Credential vault endpoints.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use slipway_core::{CredentialId, Error, ProviderKind, ProviderSecrets};
use slipway_vault::{CredentialUpdate, ValidationOutcome};

use crate::dto::CredentialDto;
use crate::error::ApiError;
use crate::state::AppState;

/// Owner scoping comes from a header until real authentication exists
/// in the outer layer; absent means the single default owner.
const OWNER_HEADER: &str = "x-owner";

fn owner(headers: &HeaderMap) -> String {
    headers
        .get(OWNER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or("default")
        .to_owned()
}

/// `POST /credentials` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCredentialBody {
    /// `netlify` | `vercel`.
    pub provider: String,
    /// Display name.
    pub name: String,
    /// Provider-specific credential fields.
    pub credentials: serde_json::Value,
}

/// `POST /credentials`.
pub async fn create_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateCredentialBody>,
) -> Result<(StatusCode, Json<CredentialDto>), ApiError> {
    let provider: ProviderKind = body.provider.parse()?;
    let secrets = parse_secrets(provider, &body.credentials)?;
    let summary = state
        .vault
        .create(&owner(&headers), provider, &body.name, secrets)
        .await?;
    Ok((StatusCode::CREATED, Json(summary.into())))
}

/// `GET /credentials`.
pub async fn list_credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<CredentialDto>>, ApiError> {
    let summaries = state.vault.list(&owner(&headers)).await?;
    Ok(Json(summaries.into_iter().map(Into::into).collect()))
}

/// `PATCH /credentials/{id}` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialBody {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Activate/deactivate.
    #[serde(default)]
    pub is_active: Option<bool>,
    /// Replacement credential fields (revalidated).
    #[serde(default)]
    pub credentials: Option<serde_json::Value>,
}

/// `PATCH /credentials/{id}`.
pub async fn update_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateCredentialBody>,
) -> Result<Json<CredentialDto>, ApiError> {
    let id = parse_id(&id)?;
    let owner = owner(&headers);
    let new_secrets = match body.credentials {
        Some(raw) => {
            let credential = state.vault.list(&owner).await?;
            let provider = credential
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.provider)
                .ok_or_else(|| Error::not_found("credential", id))?;
            Some(parse_secrets(provider, &raw)?)
        }
        None => None,
    };
    let summary = state
        .vault
        .update(
            id,
            &owner,
            CredentialUpdate {
                name: body.name,
                is_active: body.is_active,
                new_secrets,
            },
        )
        .await?;
    Ok(Json(summary.into()))
}

/// `DELETE /credentials/{id}`.
pub async fn delete_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    state.vault.delete(id, &owner(&headers)).await?;
    Ok(Json(serde_json::json!({ "message": "credential deleted" })))
}

/// `POST /credentials/{id}/validate`.
pub async fn validate_credential(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    let ValidationOutcome { is_valid, error } = state.vault.validate(id).await?;
    Ok(Json(serde_json::json!({ "isValid": is_valid, "error": error })))
}

fn parse_secrets(
    provider: ProviderKind,
    raw: &serde_json::Value,
) -> Result<ProviderSecrets, ApiError> {
    let json = serde_json::to_string(raw)
        .map_err(|e| ApiError::from(Error::validation(e.to_string())))?;
    Ok(ProviderSecrets::from_json(provider, &json)?)
}

fn parse_id(raw: &str) -> Result<CredentialId, ApiError> {
    CredentialId::parse(raw).map_err(|_| Error::not_found("credential", raw).into())
}
