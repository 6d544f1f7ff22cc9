// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the OrchestratorStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use cadenza_config::model::StorageConfig;
use cadenza_core::traits::store::ResumeOutcome;
use cadenza_core::{
    CadenzaError, CampaignId, CampaignRecord, CleanupLogEntry, OrchestratorStore,
    SessionId, SessionRecord, SessionStatus, TenantId,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed orchestrator store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`OrchestratorStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new SqliteStore with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, CadenzaError> {
        self.db.get().ok_or_else(|| CadenzaError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl OrchestratorStore for SqliteStore {
    async fn initialize(&self) -> Result<(), CadenzaError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| CadenzaError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), CadenzaError> {
        self.db()?.close().await
    }

    // --- Session records ---

    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), CadenzaError> {
        queries::sessions::upsert_session(self.db()?, record).await
    }

    async fn get_session(
        &self,
        id: &SessionId,
    ) -> Result<Option<SessionRecord>, CadenzaError> {
        queries::sessions::get_session(self.db()?, id).await
    }

    async fn list_sessions(
        &self,
        tenant_id: Option<&TenantId>,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>, CadenzaError> {
        queries::sessions::list_sessions(self.db()?, tenant_id, status).await
    }

    async fn set_primary(
        &self,
        tenant_id: &TenantId,
        id: &SessionId,
    ) -> Result<(), CadenzaError> {
        queries::sessions::set_primary(self.db()?, tenant_id, id).await
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), CadenzaError> {
        queries::sessions::delete_session(self.db()?, id).await
    }

    async fn stale_sessions(
        &self,
        status: Option<SessionStatus>,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, CadenzaError> {
        queries::sessions::stale_sessions(self.db()?, status, cutoff, limit).await
    }

    // --- Campaign pause/resume ---

    async fn get_campaign(
        &self,
        id: &CampaignId,
    ) -> Result<Option<CampaignRecord>, CadenzaError> {
        queries::campaigns::get_campaign(self.db()?, id).await
    }

    async fn pause_ongoing_campaigns(
        &self,
        tenant_id: &TenantId,
        session_id: &SessionId,
        auto_resume_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<CampaignId>, CadenzaError> {
        queries::campaigns::pause_ongoing_campaigns(
            self.db()?,
            tenant_id,
            session_id,
            auto_resume_at,
            reason,
        )
        .await
    }

    async fn resume_campaign(&self, id: &CampaignId) -> Result<ResumeOutcome, CadenzaError> {
        queries::campaigns::resume_campaign(self.db()?, id).await
    }

    // --- Audit ---

    async fn append_cleanup_log(&self, entry: &CleanupLogEntry) -> Result<(), CadenzaError> {
        queries::cleanup_logs::append(self.db()?, entry).await
    }
}
