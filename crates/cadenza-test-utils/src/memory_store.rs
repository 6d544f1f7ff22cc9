// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `OrchestratorStore` for tests that don't need SQLite.
//!
//! Pause/resume semantics mirror the durable implementation: pausing hits
//! every ongoing campaign of the tenant-session pair, resuming is
//! idempotent and preserves the pause counter.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use cadenza_core::{
    CadenzaError, CampaignId, CampaignRecord, CampaignStatus, CleanupLogEntry,
    OrchestratorStore, ResumeOutcome, SessionId, SessionRecord, SessionStatus, TenantId,
};

#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
    campaigns: Mutex<HashMap<CampaignId, CampaignRecord>>,
    cleanup_logs: Mutex<Vec<CleanupLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a campaign row.
    pub async fn put_campaign(&self, record: CampaignRecord) {
        self.campaigns
            .lock()
            .await
            .insert(record.id.clone(), record);
    }

    /// Cleanup log entries appended so far, in order.
    pub async fn cleanup_entries(&self) -> Vec<CleanupLogEntry> {
        self.cleanup_logs.lock().await.clone()
    }
}

#[async_trait]
impl OrchestratorStore for MemoryStore {
    async fn initialize(&self) -> Result<(), CadenzaError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), CadenzaError> {
        Ok(())
    }

    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), CadenzaError> {
        self.sessions
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, CadenzaError> {
        Ok(self.sessions.lock().await.get(id).cloned())
    }

    async fn list_sessions(
        &self,
        tenant_id: Option<&TenantId>,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>, CadenzaError> {
        let mut records: Vec<SessionRecord> = self
            .sessions
            .lock()
            .await
            .values()
            .filter(|r| tenant_id.is_none_or(|t| &r.tenant_id == t))
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(records)
    }

    async fn set_primary(
        &self,
        tenant_id: &TenantId,
        id: &SessionId,
    ) -> Result<(), CadenzaError> {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(id) {
            return Err(CadenzaError::SessionNotFound(id.clone()));
        }
        for record in sessions.values_mut() {
            if &record.tenant_id == tenant_id {
                record.is_primary = &record.id == id;
            }
        }
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), CadenzaError> {
        self.sessions.lock().await.remove(id);
        Ok(())
    }

    async fn stale_sessions(
        &self,
        status: Option<SessionStatus>,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, CadenzaError> {
        let mut records: Vec<SessionRecord> = self
            .sessions
            .lock()
            .await
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .filter(|r| r.last_activity_at < cutoff)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.last_activity_at);
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn get_campaign(
        &self,
        id: &CampaignId,
    ) -> Result<Option<CampaignRecord>, CadenzaError> {
        Ok(self.campaigns.lock().await.get(id).cloned())
    }

    async fn pause_ongoing_campaigns(
        &self,
        tenant_id: &TenantId,
        session_id: &SessionId,
        auto_resume_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<CampaignId>, CadenzaError> {
        let mut campaigns = self.campaigns.lock().await;
        let now = Utc::now();
        let mut paused: Vec<CampaignId> = Vec::new();
        for record in campaigns.values_mut() {
            if &record.tenant_id == tenant_id
                && &record.session_id == session_id
                && record.status == CampaignStatus::Ongoing
            {
                record.status = CampaignStatus::PausedMobile;
                record.paused_at = Some(now);
                record.pause_reason = Some(reason.to_string());
                record.auto_resume_at = Some(auto_resume_at);
                record.pause_count += 1;
                record.paused_by_session = Some(session_id.clone());
                record.updated_at = now;
                paused.push(record.id.clone());
            }
        }
        paused.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(paused)
    }

    async fn resume_campaign(&self, id: &CampaignId) -> Result<ResumeOutcome, CadenzaError> {
        let mut campaigns = self.campaigns.lock().await;
        let Some(record) = campaigns.get_mut(id) else {
            return Ok(ResumeOutcome::NotFound);
        };
        match record.status {
            CampaignStatus::Ongoing => Ok(ResumeOutcome::AlreadyOngoing),
            CampaignStatus::PausedMobile => {
                record.status = CampaignStatus::Ongoing;
                record.paused_at = None;
                record.pause_reason = None;
                record.auto_resume_at = None;
                record.paused_by_session = None;
                record.updated_at = Utc::now();
                Ok(ResumeOutcome::Resumed)
            }
            _ => Ok(ResumeOutcome::NotResumable),
        }
    }

    async fn append_cleanup_log(&self, entry: &CleanupLogEntry) -> Result<(), CadenzaError> {
        self.cleanup_logs.lock().await.push(entry.clone());
        Ok(())
    }
}
