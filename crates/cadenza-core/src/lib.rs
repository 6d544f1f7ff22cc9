// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Cadenza session & campaign pacing orchestrator.
//!
//! This crate provides the foundational trait seams, error types, and
//! common types used throughout the Cadenza workspace. The transport
//! driver, persistence, and notification collaborators all implement
//! traits defined here.

pub mod error;
pub mod events;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CadenzaError;
pub use events::{SessionEvent, SessionEventKind, TransportEvent};
pub use types::{
    CampaignId, CampaignRecord, CampaignStatus, CleanupLogEntry, DisconnectReason,
    HealthCheck, MessageReceipt, OutboundMessage, Priority, RateLimitKind,
    SessionId, SessionRecord, SessionStatus, TenantId, TransportHandle,
};

// Re-export the trait seams at crate root.
pub use traits::{LogNotifier, Notifier, OrchestratorStore, ResumeOutcome, Transport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadenza_error_has_all_variants() {
        // Verify all 9 error variants exist and can be constructed.
        let _config = CadenzaError::Config("test".into());
        let _storage = CadenzaError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _transport = CadenzaError::Transport {
            message: "test".into(),
            source: None,
        };
        let _admission = CadenzaError::AdmissionRejected {
            reason: "test".into(),
        };
        let _rate = CadenzaError::RateLimited {
            kind: RateLimitKind::PerHour,
            current: 1001,
            limit: 1000,
            retry_after: None,
        };
        let _transition = CadenzaError::InvalidTransition {
            session: SessionId::from("s"),
            status: SessionStatus::Connected,
            event: "qr_issued".into(),
        };
        let _missing = CadenzaError::SessionNotFound(SessionId::from("s"));
        let _timeout = CadenzaError::Timeout {
            duration: std::time::Duration::from_secs(5),
        };
        let _internal = CadenzaError::Internal("test".into());
    }

    #[test]
    fn all_trait_seams_are_exported() {
        // If any seam is missing or fails to compile, this won't compile.
        fn _assert_transport<T: Transport>() {}
        fn _assert_store<T: OrchestratorStore>() {}
        fn _assert_notifier<T: Notifier>() {}
    }

    #[test]
    fn session_status_display_round_trip() {
        use std::str::FromStr;
        for status in [
            SessionStatus::QrPending,
            SessionStatus::Authenticated,
            SessionStatus::Connected,
            SessionStatus::Disconnected,
            SessionStatus::Failed,
        ] {
            let parsed = SessionStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(status, parsed);
        }
    }
}
