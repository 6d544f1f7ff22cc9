// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence trait for sessions, campaign pause/resume, and audit logs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CadenzaError;
use crate::types::{
    CampaignId, CampaignRecord, CleanupLogEntry, SessionId, SessionRecord,
    SessionStatus, TenantId,
};

/// Outcome of an idempotent campaign resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The campaign was paused_mobile and is now ongoing again.
    Resumed,
    /// The campaign was already ongoing; no-op success.
    AlreadyOngoing,
    /// The campaign does not exist (deleted while a resume was scheduled).
    NotFound,
    /// The campaign is in a state that must not be resumed (completed, failed).
    NotResumable,
}

/// Storage seam consumed by the orchestrator.
///
/// Campaign mutations are transactional at the store: pausing a tenant's
/// ongoing campaigns is all-or-nothing, and pause/resume for one campaign
/// is linearized by the store's single writer.
#[async_trait]
pub trait OrchestratorStore: Send + Sync + 'static {
    async fn initialize(&self) -> Result<(), CadenzaError>;
    async fn close(&self) -> Result<(), CadenzaError>;

    // --- Session records ---

    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), CadenzaError>;

    async fn get_session(
        &self,
        id: &SessionId,
    ) -> Result<Option<SessionRecord>, CadenzaError>;

    async fn list_sessions(
        &self,
        tenant_id: Option<&TenantId>,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>, CadenzaError>;

    /// Marks `id` as the tenant's primary session, clearing any previous
    /// primary in the same write.
    async fn set_primary(
        &self,
        tenant_id: &TenantId,
        id: &SessionId,
    ) -> Result<(), CadenzaError>;

    async fn delete_session(&self, id: &SessionId) -> Result<(), CadenzaError>;

    /// Sessions whose `last_activity_at` is older than `cutoff`, optionally
    /// filtered by status, ordered oldest first, capped at `limit`.
    /// Backed by the `(status, last_activity_at)` index.
    async fn stale_sessions(
        &self,
        status: Option<SessionStatus>,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, CadenzaError>;

    // --- Campaign pause/resume ---

    async fn get_campaign(
        &self,
        id: &CampaignId,
    ) -> Result<Option<CampaignRecord>, CadenzaError>;

    /// Atomically pauses every `ongoing` campaign of the tenant bound to
    /// `session_id`: sets paused_mobile, increments pause_count, records
    /// paused_at / paused_by_session / pause_reason, and stamps
    /// `auto_resume_at`. Returns the paused campaign ids. If any row fails
    /// to update, none are paused.
    async fn pause_ongoing_campaigns(
        &self,
        tenant_id: &TenantId,
        session_id: &SessionId,
        auto_resume_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<CampaignId>, CadenzaError>;

    /// Idempotently resumes one campaign: paused_mobile -> ongoing with the
    /// pause fields cleared. Resuming an already-ongoing campaign succeeds
    /// without writing.
    async fn resume_campaign(&self, id: &CampaignId) -> Result<ResumeOutcome, CadenzaError>;

    // --- Audit ---

    /// Appends one audit record. The log is append-only; nothing mutates it.
    async fn append_cleanup_log(&self, entry: &CleanupLogEntry) -> Result<(), CadenzaError>;
}
