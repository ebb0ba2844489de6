#![warn(missing_docs)]

//! # Slipway API
//!
//! The thin HTTP adapter over the deployment core: intake, status,
//! cancel, listing, log reads, SSE log tailing, credential CRUD, and a
//! health endpoint. Handlers translate core error kinds to HTTP
//! statuses and speak camelCase DTOs; all real behavior lives in the
//! crates underneath.

mod credentials;
mod deploy;
mod dto;
mod error;
mod state;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use dto::{DeployBody, DeploymentStatus};
pub use error::ApiError;
pub use state::{AppState, RateLimiter};

/// Build the service router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(deploy::health))
        .route("/deploy", post(deploy::create_deployment).get(deploy::list_deployments))
        .route("/deploy/{id}/status", get(deploy::deployment_status))
        .route("/deploy/{id}/cancel", post(deploy::cancel_deployment))
        .route("/deploy/{id}/logs", get(deploy::read_logs))
        .route("/deploy/{id}/logs/sse", get(deploy::stream_logs))
        .route(
            "/credentials",
            post(credentials::create_credential).get(credentials::list_credentials),
        )
        .route(
            "/credentials/{id}",
            patch(credentials::update_credential).delete(credentials::delete_credential),
        )
        .route("/credentials/{id}/validate", post(credentials::validate_credential))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
