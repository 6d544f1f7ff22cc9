// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control-plane HTTP API for the Cadenza orchestrator.
//!
//! Bearer-auth'd JSON endpoints for session provisioning and lifecycle
//! operations, plus an unauthenticated health route. Session events flow
//! to consumers through the Notifier seam, not through this API.

pub mod auth;
pub mod handlers;
pub mod server;

pub use server::{build_router, start_server, GatewayState, HealthState, ServerConfig};
