// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle state machine.
//!
//! Transitions are driven exclusively by [`TransportEvent`]s; nothing else
//! may change a session's status. A session reaches `Connected` only after
//! an observed `Authenticated`. Illegal edges are reported as
//! [`CadenzaError::InvalidTransition`] and leave the state untouched.

use cadenza_core::{
    CadenzaError, SessionEventKind, SessionId, SessionStatus, TransportEvent,
};

/// Result of applying one transport event to a session's state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: SessionStatus,
    /// Application-layer event to broadcast, if any.
    pub emit: Option<SessionEventKind>,
    /// Whether the event counts as account activity.
    pub activity: bool,
}

/// Apply `event` to a session currently in `status`.
pub fn apply(
    session: &SessionId,
    status: SessionStatus,
    event: &TransportEvent,
) -> Result<Transition, CadenzaError> {
    use SessionStatus::*;

    let transition = match (status, event) {
        // A fresh QR while already pairing replaces the previous code.
        (QrPending, TransportEvent::QrIssued { .. }) => Transition {
            next: QrPending,
            emit: Some(SessionEventKind::Qr),
            activity: false,
        },
        // Regenerated QR moves a dead session back into pairing.
        (Disconnected | Failed, TransportEvent::QrIssued { .. }) => Transition {
            next: QrPending,
            emit: Some(SessionEventKind::Qr),
            activity: false,
        },
        (QrPending, TransportEvent::Authenticated) => Transition {
            next: Authenticated,
            emit: None,
            activity: true,
        },
        (QrPending, TransportEvent::AuthFailed { .. }) => Transition {
            next: Failed,
            emit: Some(SessionEventKind::AuthFailed),
            activity: false,
        },
        (Authenticated, TransportEvent::Connected) => Transition {
            next: Connected,
            emit: Some(SessionEventKind::Ready),
            activity: true,
        },
        // Idempotent duplicate from the driver.
        (Connected, TransportEvent::Connected) => Transition {
            next: Connected,
            emit: None,
            activity: false,
        },
        (Connected, TransportEvent::MessageReceived { .. }) => Transition {
            next: Connected,
            emit: Some(SessionEventKind::MessageReceived),
            activity: true,
        },
        (Connected, TransportEvent::MessageSent { .. }) => Transition {
            next: Connected,
            emit: Some(SessionEventKind::MessageSent),
            activity: true,
        },
        (QrPending | Authenticated | Connected, TransportEvent::Disconnected { .. }) => {
            Transition {
                next: Disconnected,
                emit: Some(SessionEventKind::Disconnected),
                activity: false,
            }
        }
        // Already down; a second disconnect is driver noise, not an error.
        (Disconnected | Failed, TransportEvent::Disconnected { .. }) => Transition {
            next: status,
            emit: None,
            activity: false,
        },
        _ => {
            return Err(CadenzaError::InvalidTransition {
                session: session.clone(),
                status,
                event: event_label(event).to_string(),
            })
        }
    };
    Ok(transition)
}

fn event_label(event: &TransportEvent) -> &'static str {
    match event {
        TransportEvent::QrIssued { .. } => "qr_issued",
        TransportEvent::Authenticated => "authenticated",
        TransportEvent::Connected => "connected",
        TransportEvent::AuthFailed { .. } => "auth_failed",
        TransportEvent::MessageReceived { .. } => "message_received",
        TransportEvent::MessageSent { .. } => "message_sent",
        TransportEvent::Disconnected { .. } => "disconnected",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::DisconnectReason;

    fn sid() -> SessionId {
        SessionId::from("s1")
    }

    #[test]
    fn happy_path_qr_to_connected() {
        let t = apply(
            &sid(),
            SessionStatus::QrPending,
            &TransportEvent::QrIssued {
                code: "qr".into(),
            },
        )
        .unwrap();
        assert_eq!(t.next, SessionStatus::QrPending);
        assert_eq!(t.emit, Some(SessionEventKind::Qr));

        let t = apply(&sid(), SessionStatus::QrPending, &TransportEvent::Authenticated).unwrap();
        assert_eq!(t.next, SessionStatus::Authenticated);

        let t = apply(&sid(), SessionStatus::Authenticated, &TransportEvent::Connected).unwrap();
        assert_eq!(t.next, SessionStatus::Connected);
        assert_eq!(t.emit, Some(SessionEventKind::Ready));
    }

    #[test]
    fn connected_requires_prior_authentication() {
        let err = apply(&sid(), SessionStatus::QrPending, &TransportEvent::Connected).unwrap_err();
        match err {
            CadenzaError::InvalidTransition { status, event, .. } => {
                assert_eq!(status, SessionStatus::QrPending);
                assert_eq!(event, "connected");
            }
            other => panic!("expected InvalidTransition, got {other}"),
        }
    }

    #[test]
    fn auth_failure_terminates_pairing() {
        let t = apply(
            &sid(),
            SessionStatus::QrPending,
            &TransportEvent::AuthFailed {
                reason: "scan expired".into(),
            },
        )
        .unwrap();
        assert_eq!(t.next, SessionStatus::Failed);
        assert_eq!(t.emit, Some(SessionEventKind::AuthFailed));
    }

    #[test]
    fn disconnect_from_any_live_state() {
        for status in [
            SessionStatus::QrPending,
            SessionStatus::Authenticated,
            SessionStatus::Connected,
        ] {
            let t = apply(
                &sid(),
                status,
                &TransportEvent::Disconnected {
                    reason: DisconnectReason::NetworkError,
                },
            )
            .unwrap();
            assert_eq!(t.next, SessionStatus::Disconnected);
        }
    }

    #[test]
    fn duplicate_disconnect_is_silent() {
        let t = apply(
            &sid(),
            SessionStatus::Disconnected,
            &TransportEvent::Disconnected {
                reason: DisconnectReason::Crash,
            },
        )
        .unwrap();
        assert_eq!(t.next, SessionStatus::Disconnected);
        assert!(t.emit.is_none());
    }

    #[test]
    fn regenerated_qr_reenters_pairing() {
        for status in [SessionStatus::Disconnected, SessionStatus::Failed] {
            let t = apply(
                &sid(),
                status,
                &TransportEvent::QrIssued { code: "qr2".into() },
            )
            .unwrap();
            assert_eq!(t.next, SessionStatus::QrPending);
        }
    }

    #[test]
    fn messages_refresh_activity_only_while_connected() {
        let t = apply(
            &sid(),
            SessionStatus::Connected,
            &TransportEvent::MessageReceived { from: "r".into() },
        )
        .unwrap();
        assert!(t.activity);

        assert!(apply(
            &sid(),
            SessionStatus::Disconnected,
            &TransportEvent::MessageSent { to: "r".into() },
        )
        .is_err());
    }
}
