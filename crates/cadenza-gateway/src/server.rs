// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control-plane HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use cadenza_core::{CadenzaError, OrchestratorStore};
use cadenza_pacing::RateLimiter;
use cadenza_registry::{AdmissionPool, AutoReconnect, SessionRegistry};

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;

/// State for unauthenticated health endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub pool: Arc<AdmissionPool>,
    pub limiter: Arc<RateLimiter>,
    pub reconnecter: Arc<AutoReconnect>,
    pub store: Arc<dyn OrchestratorStore>,
    pub health: HealthState,
}

/// Gateway server configuration (mirrors GatewayConfig from cadenza-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token; `None` fail-closes every authenticated route.
    pub bearer_token: Option<String>,
}

/// Build the full route tree.
pub fn build_router(config: &ServerConfig, state: GatewayState) -> Router {
    let auth = AuthConfig {
        bearer_token: config.bearer_token.clone(),
    };

    // Unauthenticated public route for liveness checks.
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/v1/sessions",
            post(handlers::create_session).get(handlers::list_sessions),
        )
        .route(
            "/v1/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/v1/sessions/{id}/set-primary",
            post(handlers::set_primary),
        )
        .route(
            "/v1/sessions/{id}/disconnect",
            post(handlers::disconnect_session),
        )
        .route(
            "/v1/sessions/{id}/reconnect",
            post(handlers::reconnect_session),
        )
        .route(
            "/v1/sessions/{id}/regenerate-qr",
            post(handlers::regenerate_qr),
        )
        .route("/v1/stats", get(handlers::get_stats))
        .route_layer(axum_middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the process shuts down.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
) -> Result<(), CadenzaError> {
    let app = build_router(config, state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CadenzaError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| CadenzaError::Internal(format!("gateway server error: {e}")))
}
