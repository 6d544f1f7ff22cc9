// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row representations and timestamp codecs.
//!
//! Timestamps are stored as RFC 3339 strings with millisecond precision so
//! SQLite's lexicographic ordering matches chronological ordering. Status
//! enums are stored as their snake_case labels.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use cadenza_core::{
    CadenzaError, CampaignId, CampaignRecord, CampaignStatus, SessionId,
    SessionRecord, SessionStatus, TenantId,
};

/// Format a timestamp for storage.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, CadenzaError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CadenzaError::Storage {
            source: Box::new(e),
        })
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, CadenzaError> {
    raw.map(|s| parse_ts(&s)).transpose()
}

/// A `sessions` row as read from SQLite.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub tenant_id: String,
    pub status: String,
    pub health_score: i64,
    pub last_activity_at: String,
    pub reconnect_attempts: i64,
    pub is_primary: bool,
    pub assigned_worker: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRow {
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            tenant_id: record.tenant_id.to_string(),
            status: record.status.to_string(),
            health_score: i64::from(record.health_score),
            last_activity_at: fmt_ts(record.last_activity_at),
            reconnect_attempts: i64::from(record.reconnect_attempts),
            is_primary: record.is_primary,
            assigned_worker: record.assigned_worker.map(i64::from),
            created_at: fmt_ts(record.created_at),
            updated_at: fmt_ts(record.updated_at),
        }
    }

    pub fn into_record(self) -> Result<SessionRecord, CadenzaError> {
        let status = SessionStatus::from_str(&self.status).map_err(|e| {
            CadenzaError::Storage {
                source: Box::new(e),
            }
        })?;
        Ok(SessionRecord {
            id: SessionId(self.id),
            tenant_id: TenantId(self.tenant_id),
            status,
            health_score: self.health_score.clamp(0, 100) as u8,
            last_activity_at: parse_ts(&self.last_activity_at)?,
            reconnect_attempts: self.reconnect_attempts.max(0) as u32,
            is_primary: self.is_primary,
            assigned_worker: self.assigned_worker.map(|w| w.max(0) as u32),
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// A `campaigns` row as read from SQLite.
#[derive(Debug, Clone)]
pub struct CampaignRow {
    pub id: String,
    pub tenant_id: String,
    pub session_id: String,
    pub status: String,
    pub speed_tier: i64,
    pub paused_at: Option<String>,
    pub pause_reason: Option<String>,
    pub auto_resume_at: Option<String>,
    pub pause_count: i64,
    pub paused_by_session: Option<String>,
    pub updated_at: String,
}

impl CampaignRow {
    pub fn from_record(record: &CampaignRecord) -> Self {
        Self {
            id: record.id.to_string(),
            tenant_id: record.tenant_id.to_string(),
            session_id: record.session_id.to_string(),
            status: record.status.to_string(),
            speed_tier: i64::from(record.speed_tier),
            paused_at: record.paused_at.map(fmt_ts),
            pause_reason: record.pause_reason.clone(),
            auto_resume_at: record.auto_resume_at.map(fmt_ts),
            pause_count: i64::from(record.pause_count),
            paused_by_session: record.paused_by_session.as_ref().map(|s| s.to_string()),
            updated_at: fmt_ts(record.updated_at),
        }
    }

    pub fn into_record(self) -> Result<CampaignRecord, CadenzaError> {
        let status = CampaignStatus::from_str(&self.status).map_err(|e| {
            CadenzaError::Storage {
                source: Box::new(e),
            }
        })?;
        Ok(CampaignRecord {
            id: CampaignId(self.id),
            tenant_id: TenantId(self.tenant_id),
            session_id: SessionId(self.session_id),
            status,
            speed_tier: self.speed_tier.clamp(1, u8::MAX as i64) as u8,
            paused_at: parse_opt_ts(self.paused_at)?,
            pause_reason: self.pause_reason,
            auto_resume_at: parse_opt_ts(self.auto_resume_at)?,
            pause_count: self.pause_count.max(0) as u32,
            paused_by_session: self.paused_by_session.map(SessionId),
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 8, 30, 0).unwrap()
    }

    #[test]
    fn timestamps_round_trip_with_millis() {
        let formatted = fmt_ts(ts());
        assert_eq!(formatted, "2026-01-15T08:30:00.000Z");
        assert_eq!(parse_ts(&formatted).unwrap(), ts());
    }

    #[test]
    fn session_row_round_trips() {
        let record = SessionRecord {
            id: SessionId::from("s1"),
            tenant_id: TenantId::from("t1"),
            status: SessionStatus::Connected,
            health_score: 87,
            last_activity_at: ts(),
            reconnect_attempts: 2,
            is_primary: true,
            assigned_worker: Some(3),
            created_at: ts(),
            updated_at: ts(),
        };
        let row = SessionRow::from_record(&record);
        assert_eq!(row.status, "connected");
        assert_eq!(row.into_record().unwrap(), record);
    }

    #[test]
    fn campaign_row_round_trips() {
        let record = CampaignRecord {
            id: CampaignId::from("c1"),
            tenant_id: TenantId::from("t1"),
            session_id: SessionId::from("s1"),
            status: CampaignStatus::PausedMobile,
            speed_tier: 2,
            paused_at: Some(ts()),
            pause_reason: Some("mobile_device_active".to_string()),
            auto_resume_at: Some(ts()),
            pause_count: 1,
            paused_by_session: Some(SessionId::from("s1")),
            updated_at: ts(),
        };
        let row = CampaignRow::from_record(&record);
        assert_eq!(row.status, "paused_mobile");
        assert_eq!(row.into_record().unwrap(), record);
    }

    #[test]
    fn unknown_status_fails_to_parse() {
        let mut row = SessionRow::from_record(&SessionRecord {
            id: SessionId::from("s1"),
            tenant_id: TenantId::from("t1"),
            status: SessionStatus::Failed,
            health_score: 0,
            last_activity_at: ts(),
            reconnect_attempts: 0,
            is_primary: false,
            assigned_worker: None,
            created_at: ts(),
            updated_at: ts(),
        });
        row.status = "zombified".to_string();
        assert!(row.into_record().is_err());
    }
}
