// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Cadenza orchestrator.

use std::time::Duration;

use thiserror::Error;

use crate::types::{RateLimitKind, SessionId, SessionStatus};

/// The primary error type used across all Cadenza trait seams and core operations.
#[derive(Debug, Error)]
pub enum CadenzaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport driver errors (connection failure, QR/auth failure, send failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Admission was rejected outright (not queued). Carries the precise cause
    /// so callers can distinguish capacity from validation from provisioning.
    #[error("admission rejected: {reason}")]
    AdmissionRejected { reason: String },

    /// A hard rate limit was hit. The message names which limit, the observed
    /// count against the cap, and how long until the window frees (if computable).
    #[error("rate limit exceeded: {kind} ({current}/{limit}{})", retry_hint(.retry_after))]
    RateLimited {
        kind: RateLimitKind,
        current: u64,
        limit: u64,
        retry_after: Option<Duration>,
    },

    /// A transport event arrived that is not legal in the session's current state.
    #[error("invalid transition for session {session}: {event} while {status}")]
    InvalidTransition {
        session: SessionId,
        status: SessionStatus,
        event: String,
    },

    /// The referenced session does not exist in the registry.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {}s", d.as_secs()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_names_limit_and_counts() {
        let err = CadenzaError::RateLimited {
            kind: RateLimitKind::PerMinute,
            current: 31,
            limit: 30,
            retry_after: Some(Duration::from_secs(12)),
        };
        let msg = err.to_string();
        assert!(msg.contains("messages per minute"), "{msg}");
        assert!(msg.contains("31/30"), "{msg}");
        assert!(msg.contains("retry after 12s"), "{msg}");
    }

    #[test]
    fn rate_limited_without_retry_after() {
        let err = CadenzaError::RateLimited {
            kind: RateLimitKind::BroadcastSize,
            current: 300,
            limit: 256,
            retry_after: None,
        };
        assert!(!err.to_string().contains("retry after"));
    }

    #[test]
    fn session_not_found_displays_id() {
        let err = CadenzaError::SessionNotFound(SessionId::from("sess-9"));
        assert_eq!(err.to_string(), "session not found: sess-9");
    }
}
