//! Deployment intake, status, cancel, list, and log endpoints.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use slipway_core::{
    Deployment, DeploymentId, DeploymentState, Error, LogLevel, LogQuery, ProviderKind,
    StatePatch,
};
use slipway_logbus::BusMessage;
use slipway_store::{DeploymentFilter, PageRequest};
use tracing::info;

use crate::dto::{DeployBody, DeploymentStatus};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /deploy` -- accept a deployment request.
pub async fn create_deployment(
    State(state): State<AppState>,
    Json(body): Json<DeployBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if !state.limiter.check() {
        return Err(ApiError::RateLimited);
    }
    let request = body.into_request()?;

    let id = DeploymentId::generate();
    state
        .store
        .create(Deployment::from_request(id, request.clone()))
        .await?;
    let item = state.queue.enqueue(id, request)?;
    state
        .store
        .update_state(
            id,
            DeploymentState::Queued,
            StatePatch {
                job_id: Some(item.job_id),
                ..StatePatch::none()
            },
        )
        .await?;
    let _ = state
        .bus
        .append(
            id,
            LogLevel::Info,
            "deployment accepted and queued",
            Some("queue"),
            Default::default(),
        )
        .await;
    info!(deployment_id = %id, "deployment accepted");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "deploymentId": id.to_string() })),
    ))
}

/// `GET /deploy/{id}/status`.
pub async fn deployment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentStatus>, ApiError> {
    let id = parse_id(&id)?;
    let deployment = state.store.get(id).await?;
    Ok(Json(deployment.into()))
}

/// `POST /deploy/{id}/cancel`.
pub async fn cancel_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    let message = state.engine.cancel_deployment(id).await?;
    Ok(Json(serde_json::json!({ "message": message })))
}

/// Query parameters for `GET /deploy`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    provider: Option<String>,
}

/// `GET /deploy?page&limit&status&provider`.
pub async fn list_deployments(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let filter = DeploymentFilter {
        state: params
            .status
            .as_deref()
            .map(parse_state)
            .transpose()?,
        provider: params
            .provider
            .as_deref()
            .map(str::parse::<ProviderKind>)
            .transpose()?,
    };
    let page = PageRequest {
        page: params.page.unwrap_or(1).max(1),
        limit: params.limit.unwrap_or(20).clamp(1, 100),
    };
    let result = state.store.list(filter, page).await?;
    let items: Vec<DeploymentStatus> = result.items.into_iter().map(Into::into).collect();
    Ok(Json(serde_json::json!({
        "items": items,
        "total": result.total,
        "page": result.page,
        "limit": result.limit,
    })))
}

/// Query parameters for `GET /deploy/{id}/logs`.
#[derive(Debug, Deserialize)]
pub struct LogParams {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default, rename = "sinceId")]
    since_id: Option<u64>,
}

/// `GET /deploy/{id}/logs?limit&level&search`.
pub async fn read_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LogParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    // 404 for unknown deployments, empty array for known-but-quiet.
    state.store.get(id).await?;
    let query = LogQuery {
        // Reads are bounded even when the caller asks for everything.
        limit: Some(params.limit.unwrap_or(500).min(1000)),
        level: params.level.as_deref().map(str::parse::<LogLevel>).transpose()?,
        search: params.search,
        since_id: params.since_id,
    };
    let events = state.bus.read(id, &query).await?;
    let summary = state.bus.summary(id).await?;
    Ok(Json(serde_json::json!({
        "events": events,
        "summary": summary,
    })))
}

/// `GET /deploy/{id}/logs/sse` -- replay, then follow.
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let id = parse_id(&id)?;
    state.store.get(id).await?;
    let subscription = state.bus.subscribe(id).await?;

    let stream = futures::stream::unfold(subscription, |mut subscription| async move {
        subscription
            .next()
            .await
            .map(|message| (Ok(sse_event_for(&message)), subscription))
    });
    Ok(Sse::new(stream))
}

/// One bus message as an SSE frame.
pub(crate) fn sse_event_for(message: &BusMessage) -> Event {
    match message {
        BusMessage::Event(event) => Event::default()
            .event("log")
            .json_data(event)
            .unwrap_or_else(|_| Event::default().event("log").data("{}")),
        BusMessage::Gap { missed } => Event::default()
            .event("gap")
            .data(format!("{{\"missed\":{missed}}}")),
        BusMessage::Heartbeat => Event::default().event("heartbeat").data("{}"),
    }
}

fn parse_id(raw: &str) -> Result<DeploymentId, ApiError> {
    // An unparsable id can never name a deployment.
    DeploymentId::parse(raw).map_err(|_| Error::not_found("deployment", raw).into())
}

fn parse_state(raw: &str) -> Result<DeploymentState, Error> {
    serde_json::from_value(serde_json::Value::String(raw.to_owned()))
        .map_err(|_| Error::validation(format!("unknown status filter: {raw}")))
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "queue": state.queue.stats(),
        "inFlight": state.engine.in_flight(),
        "logEventsEmitted": state.bus.total_emitted(),
    }))
}
