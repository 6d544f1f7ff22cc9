// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the trait seams and the Cadenza orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a tenant (workspace account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Unique identifier for a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub String);

macro_rules! impl_id_display {
    ($($t:ty),*) => {$(
        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
        impl From<&str> for $t {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    )*};
}
impl_id_display!(TenantId, SessionId, CampaignId);

/// Opaque handle to a live transport connection.
///
/// Issued by a [`Transport`](crate::traits::transport::Transport) on connect
/// and owned exclusively by the session's registry entry. All other components
/// reach the connection by session-id lookup, never by holding the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportHandle(pub u64);

/// Lifecycle states of a session.
///
/// Transitions are driven exclusively by transport events; see the registry's
/// per-session state machine for the legal edges.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    QrPending,
    Authenticated,
    Connected,
    Disconnected,
    Failed,
}

impl SessionStatus {
    /// Whether a session in this state holds a live transport handle.
    pub fn is_live(self) -> bool {
        matches!(self, SessionStatus::Authenticated | SessionStatus::Connected)
    }
}

/// Why a session disconnected. Determines whether AutoReconnect may act.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Explicit logout from the device.
    Logout,
    /// The user asked the platform to disconnect.
    UserRequested,
    /// The session was deleted.
    Deleted,
    /// Network failure or connection drop.
    NetworkError,
    /// The transport process crashed.
    Crash,
    /// Anything the transport could not classify.
    Unknown(String),
}

impl DisconnectReason {
    /// User-initiated reasons are terminal: no automatic reconnection.
    pub fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            DisconnectReason::Logout
                | DisconnectReason::UserRequested
                | DisconnectReason::Deleted
        )
    }

    /// Map a raw transport reason label onto the classification vocabulary.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "logout" | "logged_out" => DisconnectReason::Logout,
            "user_requested" | "user-requested" => DisconnectReason::UserRequested,
            "deleted" => DisconnectReason::Deleted,
            "network_error" | "network" => DisconnectReason::NetworkError,
            "crash" | "crashed" => DisconnectReason::Crash,
            other => DisconnectReason::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Logout => write!(f, "logout"),
            DisconnectReason::UserRequested => write!(f, "user_requested"),
            DisconnectReason::Deleted => write!(f, "deleted"),
            DisconnectReason::NetworkError => write!(f, "network_error"),
            DisconnectReason::Crash => write!(f, "crash"),
            DisconnectReason::Unknown(s) => write!(f, "unknown({s})"),
        }
    }
}

/// Lifecycle states of a campaign. The orchestrator only ever writes the
/// pause/resume subset; the rest belong to the external campaign runner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Scheduled,
    Ongoing,
    PausedMobile,
    Completed,
    Failed,
}

/// Admission priority for session slots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString,
    Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Which hard limit a rejected action ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKind {
    PerMinute,
    PerHour,
    UniqueRecipients,
    BroadcastSize,
    RiskScore,
    QrTenantHourly,
    QrTenantDaily,
    QrGlobalHourly,
}

impl std::fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RateLimitKind::PerMinute => "messages per minute",
            RateLimitKind::PerHour => "messages per hour",
            RateLimitKind::UniqueRecipients => "unique recipients per 24h",
            RateLimitKind::BroadcastSize => "broadcast fan-out size",
            RateLimitKind::RiskScore => "ban-risk score",
            RateLimitKind::QrTenantHourly => "QR generations per tenant-hour",
            RateLimitKind::QrTenantDaily => "QR generations per tenant-day",
            RateLimitKind::QrGlobalHourly => "QR generations per hour (global)",
        };
        f.write_str(label)
    }
}

/// An outbound message handed to the transport for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Recipient address in the chat network's namespace.
    pub recipient: String,
    /// Message body.
    pub body: String,
}

/// Delivery receipt returned by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceipt {
    pub message_id: String,
    pub delivered_at: DateTime<Utc>,
}

/// Persisted state of one session. The transport handle lives in the
/// registry, never in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub tenant_id: TenantId,
    pub status: SessionStatus,
    /// 0-100 heuristic updated by the health monitor.
    pub health_score: u8,
    pub last_activity_at: DateTime<Utc>,
    pub reconnect_attempts: u32,
    /// At most one primary session per tenant.
    pub is_primary: bool,
    /// Which runtime instance owns the session (sharding extension point,
    /// recorded but never acted on by this process).
    pub assigned_worker: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Campaign fields the orchestrator reads and mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: CampaignId,
    pub tenant_id: TenantId,
    /// Session this campaign sends through.
    pub session_id: SessionId,
    pub status: CampaignStatus,
    /// Speed tier 1-5 selecting the pacing profile.
    pub speed_tier: u8,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub auto_resume_at: Option<DateTime<Utc>>,
    pub pause_count: u32,
    pub paused_by_session: Option<SessionId>,
    pub updated_at: DateTime<Utc>,
}

/// Durable audit record for destructive internal actions. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupLogEntry {
    pub session_id: SessionId,
    /// What was done: "removed", "forced_disconnect", "skipped", ...
    pub action: String,
    /// Session status at the time of the action.
    pub status: String,
    /// Human-readable reason, written before the action takes effect.
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of one health probe. Only the last value per session is retained;
/// the prior value is used to compute the recovery/regression delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthCheck {
    pub timestamp: DateTime<Utc>,
    pub responsive: bool,
    pub score: u8,
    pub inactive_minutes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn session_status_round_trips_snake_case() {
        assert_eq!(SessionStatus::QrPending.to_string(), "qr_pending");
        assert_eq!(
            SessionStatus::from_str("paused_mobile").is_err(),
            true,
            "campaign status must not parse as session status"
        );
        assert_eq!(
            SessionStatus::from_str("disconnected").unwrap(),
            SessionStatus::Disconnected
        );
    }

    #[test]
    fn live_states_are_authenticated_and_connected() {
        assert!(SessionStatus::Authenticated.is_live());
        assert!(SessionStatus::Connected.is_live());
        assert!(!SessionStatus::QrPending.is_live());
        assert!(!SessionStatus::Disconnected.is_live());
        assert!(!SessionStatus::Failed.is_live());
    }

    #[test]
    fn disconnect_reason_classification() {
        assert!(DisconnectReason::Logout.is_user_initiated());
        assert!(DisconnectReason::UserRequested.is_user_initiated());
        assert!(DisconnectReason::Deleted.is_user_initiated());
        assert!(!DisconnectReason::NetworkError.is_user_initiated());
        assert!(!DisconnectReason::Crash.is_user_initiated());
        assert!(!DisconnectReason::Unknown("flaky".into()).is_user_initiated());
    }

    #[test]
    fn disconnect_reason_from_label_vocabulary() {
        assert_eq!(DisconnectReason::from_label("LOGOUT"), DisconnectReason::Logout);
        assert_eq!(
            DisconnectReason::from_label("network_error"),
            DisconnectReason::NetworkError
        );
        assert_eq!(
            DisconnectReason::from_label("solar flare"),
            DisconnectReason::Unknown("solar flare".into())
        );
    }

    #[test]
    fn priority_ordering_high_wins() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn campaign_status_serde_snake_case() {
        let json = serde_json::to_string(&CampaignStatus::PausedMobile).unwrap();
        assert_eq!(json, "\"paused_mobile\"");
    }
}
