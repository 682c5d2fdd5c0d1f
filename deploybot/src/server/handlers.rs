//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::chat::reply::Reply;
use crate::chat::router::InboundEvent;
use crate::control::service::Stats;
use crate::deploy::fsm::DeploymentStatus;
use crate::models::deployment::OwnerId;
use crate::server::state::ServerState;
use crate::telemetry::collect_metrics;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "deploybot".to_string(),
        version: version.version,
    })
}

pub async fn ping_handler() -> &'static str {
    "pong"
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Inbound event as submitted by the transport
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventRequest {
    Text { owner: OwnerId, text: String },
    /// `content` is base64 encoded
    File {
        owner: OwnerId,
        filename: String,
        content: String,
    },
    Button { owner: OwnerId, data: String },
}

impl TryFrom<EventRequest> for InboundEvent {
    type Error = base64::DecodeError;

    fn try_from(request: EventRequest) -> Result<Self, Self::Error> {
        Ok(match request {
            EventRequest::Text { owner, text } => InboundEvent::Text { owner, text },
            EventRequest::File {
                owner,
                filename,
                content,
            } => InboundEvent::File {
                owner,
                filename,
                bytes: STANDARD.decode(content.trim())?,
            },
            EventRequest::Button { owner, data } => InboundEvent::Button { owner, data },
        })
    }
}

/// Replies to an event or drained from an outbox
#[derive(Debug, Serialize, Deserialize)]
pub struct RepliesResponse {
    pub replies: Vec<Reply>,
}

/// Check the transport's bearer token
fn authorize(state: &ServerState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected) = &state.transport_token else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match presented {
        Some(token) if token_matches(token, expected.expose_secret()) => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Constant-time token comparison
fn token_matches(presented: &str, expected: &str) -> bool {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();
    if presented.len() != expected.len() {
        return false;
    }
    presented.ct_eq(expected).into()
}

/// Event handler
pub async fn event_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<EventRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    authorize(&state, &headers)?;
    let event = InboundEvent::try_from(request).map_err(|e| {
        warn!("Rejected event with undecodable file content: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let replies = state.dispatcher.handle(event).await;
    Ok(Json(RepliesResponse { replies }))
}

/// Outbox handler, drains the owner's queued replies
pub async fn outbox_handler(
    State(state): State<Arc<ServerState>>,
    Path(owner): Path<OwnerId>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    authorize(&state, &headers)?;
    Ok(Json(RepliesResponse {
        replies: state.outbox.drain(owner),
    }))
}

/// Stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: Stats,
    pub running: usize,
    pub memory_mb: f64,
    pub hostname: String,
}

/// Stats handler
pub async fn stats_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let stats = state.control.stats().await;
    let metrics = tokio::task::spawn_blocking(collect_metrics)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(StatsResponse {
        running: stats.summary.count(DeploymentStatus::Running),
        stats,
        memory_mb: metrics.memory_mb,
        hostname: metrics.hostname,
    }))
}

/// Public view of a deployment, without token or files
#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub name: String,
    pub owner: OwnerId,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub url: Option<String>,
}

/// Deployments response
#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentsResponse {
    pub deployments: Vec<DeploymentInfo>,
    pub total: usize,
}

/// Deployments handler
pub async fn deployments_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let deployments: Vec<DeploymentInfo> = state
        .store
        .all()
        .await
        .into_iter()
        .map(|deployment| DeploymentInfo {
            name: deployment.name,
            owner: deployment.owner,
            status: deployment.status,
            created_at: deployment.created_at,
            url: deployment.url,
        })
        .collect();

    let total = deployments.len();

    Json(DeploymentsResponse { deployments, total })
}
