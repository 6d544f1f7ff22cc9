// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the control-plane REST API.
//!
//! Admission and rate-limit failures are answered synchronously with a
//! status code the caller can branch on; everything that happens to a
//! session after provisioning flows through the event bus instead.

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use cadenza_core::{
    CadenzaError, DisconnectReason, Priority, SessionId, SessionRecord, SessionStatus,
    TenantId,
};
use cadenza_registry::Admission;

use crate::server::GatewayState;

/// Request body for POST /v1/sessions.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub tenant_id: String,
    /// Session id; generated when omitted.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub is_primary: bool,
}

/// Descriptor of one session as returned by the API.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub tenant_id: String,
    pub status: String,
    pub health_score: u8,
    pub is_primary: bool,
    pub reconnect_attempts: u32,
    pub last_activity_at: String,
    pub created_at: String,
}

impl From<SessionRecord> for SessionResponse {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            tenant_id: record.tenant_id.to_string(),
            status: record.status.to_string(),
            health_score: record.health_score,
            is_primary: record.is_primary,
            reconnect_attempts: record.reconnect_attempts,
            last_activity_at: record.last_activity_at.to_rfc3339(),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// Response body when a create request is queued instead of admitted.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub queued: bool,
    pub position: usize,
    pub eta_ms: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retry_after_secs: None,
        }
    }
}

/// Map a core error onto the HTTP surface.
fn error_response(err: CadenzaError) -> Response {
    let (status, body) = match &err {
        CadenzaError::SessionNotFound(_) => {
            (StatusCode::NOT_FOUND, ErrorResponse::new(err.to_string()))
        }
        CadenzaError::RateLimited { retry_after, .. } => {
            let mut body = ErrorResponse::new(err.to_string());
            body.retry_after_secs = retry_after.map(|d| d.as_secs());
            (StatusCode::TOO_MANY_REQUESTS, body)
        }
        CadenzaError::AdmissionRejected { .. } => {
            (StatusCode::BAD_REQUEST, ErrorResponse::new(err.to_string()))
        }
        CadenzaError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, ErrorResponse::new(err.to_string()))
        }
        CadenzaError::Transport { .. } => {
            (StatusCode::BAD_GATEWAY, ErrorResponse::new(err.to_string()))
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(err.to_string()),
        ),
    };
    (status, Json(body)).into_response()
}

/// POST /v1/sessions
///
/// Runs admission, then provisions through the registry. Capacity answers
/// are 202 (queued); validation failures 400; a transport that cannot
/// connect is 502 and the admission slot is released again.
pub async fn create_session(
    State(state): State<GatewayState>,
    Json(body): Json<CreateSessionRequest>,
) -> Response {
    if body.tenant_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("tenant_id must not be empty")),
        )
            .into_response();
    }
    let tenant_id = TenantId::from(body.tenant_id.as_str());
    let session_key = body
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let priority = body.priority.unwrap_or(Priority::Normal);

    match state.pool.request(&tenant_id, &session_key, priority).await {
        Admission::Rejected { reason } => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(reason))).into_response()
        }
        Admission::Queued { position, eta_ms } => (
            StatusCode::ACCEPTED,
            Json(QueuedResponse {
                queued: true,
                position,
                eta_ms,
            }),
        )
            .into_response(),
        Admission::Admitted { evicted } => {
            if let Some((evicted_tenant, evicted_key)) = evicted {
                let evicted_id = SessionId::from(evicted_key.as_str());
                tracing::info!(
                    tenant_id = %evicted_tenant,
                    session_id = %evicted_id,
                    "low-priority session evicted for admission"
                );
                state.reconnecter.cancel(&evicted_id);
                if let Err(e) = state
                    .registry
                    .disconnect(&evicted_id, DisconnectReason::UserRequested)
                    .await
                {
                    tracing::warn!(session_id = %evicted_id, error = %e, "evicted session disconnect failed");
                }
            }

            let session_id = SessionId::from(session_key.as_str());
            match state
                .registry
                .create_session(&tenant_id, &session_id, body.is_primary)
                .await
            {
                Ok(record) => {
                    (StatusCode::CREATED, Json(SessionResponse::from(record))).into_response()
                }
                Err(e) => {
                    state.pool.release(&tenant_id, &session_key).await;
                    error_response(e)
                }
            }
        }
    }
}

/// Query parameters for GET /v1/sessions.
#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// GET /v1/sessions
pub async fn list_sessions(
    State(state): State<GatewayState>,
    Query(query): Query<ListSessionsQuery>,
) -> Response {
    let tenant_id = query.tenant_id.map(|t| TenantId::from(t.as_str()));
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match SessionStatus::from_str(raw) {
            Ok(status) => Some(status),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new(format!("unknown status '{raw}'"))),
                )
                    .into_response();
            }
        },
    };

    match state.store.list_sessions(tenant_id.as_ref(), status).await {
        Ok(records) => {
            let sessions: Vec<SessionResponse> =
                records.into_iter().map(SessionResponse::from).collect();
            Json(serde_json::json!({ "sessions": sessions })).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /v1/sessions/{id}
pub async fn get_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let session_id = SessionId::from(id.as_str());
    // Live snapshot first, persisted record as fallback.
    if let Ok(record) = state.registry.snapshot(&session_id).await {
        return Json(SessionResponse::from(record)).into_response();
    }
    match state.store.get_session(&session_id).await {
        Ok(Some(record)) => Json(SessionResponse::from(record)).into_response(),
        Ok(None) => error_response(CadenzaError::SessionNotFound(session_id)),
        Err(e) => error_response(e),
    }
}

/// POST /v1/sessions/{id}/set-primary
pub async fn set_primary(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let session_id = SessionId::from(id.as_str());
    let tenant_id = match tenant_for(&state, &session_id).await {
        Ok(tenant_id) => tenant_id,
        Err(e) => return error_response(e),
    };
    match state.registry.set_primary(&tenant_id, &session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/sessions/{id}/disconnect
pub async fn disconnect_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let session_id = SessionId::from(id.as_str());
    state.reconnecter.cancel(&session_id);
    match state
        .registry
        .disconnect(&session_id, DisconnectReason::UserRequested)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/sessions/{id}/reconnect
pub async fn reconnect_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let session_id = SessionId::from(id.as_str());
    state.reconnecter.cancel(&session_id);
    match state.registry.reconnect(&session_id).await {
        Ok(()) => match state.registry.snapshot(&session_id).await {
            Ok(record) => Json(SessionResponse::from(record)).into_response(),
            Err(e) => error_response(e),
        },
        Err(e) => error_response(e),
    }
}

/// Response body for POST /v1/sessions/{id}/regenerate-qr.
#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub qr_code: String,
}

/// POST /v1/sessions/{id}/regenerate-qr
pub async fn regenerate_qr(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let session_id = SessionId::from(id.as_str());
    match state.registry.regenerate_qr(&session_id).await {
        Ok(qr_code) => Json(QrResponse { qr_code }).into_response(),
        Err(e) => error_response(e),
    }
}

/// Query parameters for DELETE /v1/sessions/{id}.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    /// Also remove on-disk session artifacts.
    #[serde(default)]
    pub cleanup: bool,
}

/// DELETE /v1/sessions/{id}
pub async fn delete_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Response {
    let session_id = SessionId::from(id.as_str());
    state.reconnecter.cancel(&session_id);

    let Some(tenant_id) = state.registry.tenant_of(&session_id) else {
        // Not live; remove the persisted record if it exists.
        return match state.store.get_session(&session_id).await {
            Ok(Some(_)) => match state.store.delete_session(&session_id).await {
                Ok(()) => StatusCode::NO_CONTENT.into_response(),
                Err(e) => error_response(e),
            },
            Ok(None) => error_response(CadenzaError::SessionNotFound(session_id)),
            Err(e) => error_response(e),
        };
    };

    match state.registry.destroy(&session_id, query.cleanup).await {
        Ok(()) => {
            state.pool.release(&tenant_id, &session_id.0).await;
            state.limiter.remove(&session_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Response body for GET /v1/stats.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub active_slots: usize,
    pub queue_depth: usize,
    pub live_sessions: usize,
    pub sessions_by_status: std::collections::BTreeMap<String, usize>,
    pub tracked_rate_windows: usize,
    pub uptime_secs: u64,
}

/// GET /v1/stats
pub async fn get_stats(State(state): State<GatewayState>) -> Response {
    let (active_slots, queue_depth) = state.pool.occupancy().await;
    let mut sessions_by_status = std::collections::BTreeMap::new();
    match state.store.list_sessions(None, None).await {
        Ok(records) => {
            for record in records {
                *sessions_by_status
                    .entry(record.status.to_string())
                    .or_insert(0) += 1;
            }
        }
        Err(e) => return error_response(e),
    }

    Json(StatsResponse {
        active_slots,
        queue_depth,
        live_sessions: state.registry.live_count(),
        sessions_by_status,
        tracked_rate_windows: state.limiter.tracked_sessions(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
    .into_response()
}

/// Response body for the public GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health (unauthenticated)
pub async fn get_public_health(State(state): State<GatewayState>) -> Response {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
    .into_response()
}

async fn tenant_for(
    state: &GatewayState,
    session_id: &SessionId,
) -> Result<TenantId, CadenzaError> {
    if let Some(tenant_id) = state.registry.tenant_of(session_id) {
        return Ok(tenant_id);
    }
    match state.store.get_session(session_id).await? {
        Some(record) => Ok(record.tenant_id),
        None => Err(CadenzaError::SessionNotFound(session_id.clone())),
    }
}
