// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event vocabulary: transport callbacks flowing into the registry, and
//! application-layer events emitted out of it.
//!
//! Transport events for one session are linearized through that session's
//! single-writer loop; application events are broadcast at-least-once and
//! consumers deduplicate on `(session_id, event, timestamp)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{DisconnectReason, SessionId, TenantId};

/// Asynchronous callbacks from the transport driver, dispatched into the
/// registry's per-session event loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// A pairing QR code was issued for the session.
    QrIssued { code: String },
    /// The device scan completed and the session authenticated.
    Authenticated,
    /// The connection is fully established and ready to send.
    Connected,
    /// QR/auth failed for this attempt.
    AuthFailed { reason: String },
    /// An inbound message arrived on the account.
    MessageReceived { from: String },
    /// An outbound message was confirmed sent.
    MessageSent { to: String },
    /// The connection dropped, with a classified reason.
    Disconnected { reason: DisconnectReason },
}

/// Application-layer event kinds, named as they appear on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum SessionEventKind {
    #[strum(serialize = "session.qr")]
    #[serde(rename = "session.qr")]
    Qr,
    #[strum(serialize = "session.ready")]
    #[serde(rename = "session.ready")]
    Ready,
    #[strum(serialize = "session.auth_failed")]
    #[serde(rename = "session.auth_failed")]
    AuthFailed,
    #[strum(serialize = "session.disconnected")]
    #[serde(rename = "session.disconnected")]
    Disconnected,
    #[strum(serialize = "session.reconnected")]
    #[serde(rename = "session.reconnected")]
    Reconnected,
    #[strum(serialize = "session.reconnect_failed")]
    #[serde(rename = "session.reconnect_failed")]
    ReconnectFailed,
    #[strum(serialize = "message.received")]
    #[serde(rename = "message.received")]
    MessageReceived,
    #[strum(serialize = "message.sent")]
    #[serde(rename = "message.sent")]
    MessageSent,
    #[strum(serialize = "session.destroyed")]
    #[serde(rename = "session.destroyed")]
    Destroyed,
    #[strum(serialize = "session.health_alert")]
    #[serde(rename = "session.health_alert")]
    HealthAlert,
}

/// One application-layer event, delivered at-least-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub tenant_id: TenantId,
    pub kind: SessionEventKind,
    pub timestamp: DateTime<Utc>,
    /// Optional detail payload (QR code, disconnect reason, failure text).
    pub detail: Option<String>,
}

impl SessionEvent {
    pub fn now(
        session_id: SessionId,
        tenant_id: TenantId,
        kind: SessionEventKind,
        detail: Option<String>,
    ) -> Self {
        Self {
            session_id,
            tenant_id,
            kind,
            timestamp: Utc::now(),
            detail,
        }
    }
}
