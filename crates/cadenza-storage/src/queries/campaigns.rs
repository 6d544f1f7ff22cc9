// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign pause/resume mutations.
//!
//! Pausing a tenant's ongoing campaigns is a single transaction, so a crash
//! mid-pause never leaves a tenant half paused. Resume is idempotent and
//! refuses to touch campaigns in terminal states.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use cadenza_core::traits::store::ResumeOutcome;
use cadenza_core::{CadenzaError, CampaignId, CampaignRecord, SessionId, TenantId};

use crate::database::Database;
use crate::models::{fmt_ts, CampaignRow};

const COLUMNS: &str = "id, tenant_id, session_id, status, speed_tier, paused_at,
                       pause_reason, auto_resume_at, pause_count, paused_by_session,
                       updated_at";

fn row_to_campaign(row: &Row<'_>) -> rusqlite::Result<CampaignRow> {
    Ok(CampaignRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        session_id: row.get(2)?,
        status: row.get(3)?,
        speed_tier: row.get(4)?,
        paused_at: row.get(5)?,
        pause_reason: row.get(6)?,
        auto_resume_at: row.get(7)?,
        pause_count: row.get(8)?,
        paused_by_session: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Insert or replace a campaign row. The campaign runner owns creation; this
/// exists for provisioning and tests.
pub async fn upsert_campaign(db: &Database, record: &CampaignRecord) -> Result<(), CadenzaError> {
    let row = CampaignRow::from_record(record);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO campaigns
                     (id, tenant_id, session_id, status, speed_tier, paused_at,
                      pause_reason, auto_resume_at, pause_count, paused_by_session,
                      updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    row.id,
                    row.tenant_id,
                    row.session_id,
                    row.status,
                    row.speed_tier,
                    row.paused_at,
                    row.pause_reason,
                    row.auto_resume_at,
                    row.pause_count,
                    row.paused_by_session,
                    row.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a campaign by ID.
pub async fn get_campaign(
    db: &Database,
    id: &CampaignId,
) -> Result<Option<CampaignRecord>, CadenzaError> {
    let id = id.to_string();
    let row = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM campaigns WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_campaign) {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    row.map(CampaignRow::into_record).transpose()
}

/// Atomically pause every ongoing campaign of a tenant that sends through
/// the given session.
///
/// Campaigns of the same tenant bound to other sessions are untouched.
/// Each paused row gets paused_mobile status, an incremented pause_count,
/// the pausing session, the reason, and the auto-resume deadline. Returns
/// the ids that were paused, in one transaction.
pub async fn pause_ongoing_campaigns(
    db: &Database,
    tenant_id: &TenantId,
    session_id: &SessionId,
    auto_resume_at: DateTime<Utc>,
    reason: &str,
) -> Result<Vec<CampaignId>, CadenzaError> {
    let tenant = tenant_id.to_string();
    let session = session_id.to_string();
    let resume_at = fmt_ts(auto_resume_at);
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM campaigns
                     WHERE tenant_id = ?1 AND session_id = ?2 AND status = 'ongoing'
                     ORDER BY id ASC",
                )?;
                let mapped = stmt.query_map(params![tenant, session], |row| row.get(0))?;
                let mut ids = Vec::new();
                for id in mapped {
                    ids.push(id?);
                }
                ids
            };

            for id in &ids {
                let changed = tx.execute(
                    "UPDATE campaigns SET
                         status = 'paused_mobile',
                         paused_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                         pause_reason = ?1,
                         auto_resume_at = ?2,
                         pause_count = pause_count + 1,
                         paused_by_session = ?3,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?4 AND status = 'ongoing'",
                    params![reason, resume_at, session, id],
                )?;
                if changed != 1 {
                    return Err(rusqlite::Error::StatementChangedRows(changed));
                }
            }
            tx.commit()?;
            Ok(ids.into_iter().map(CampaignId).collect())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Idempotently resume one campaign.
pub async fn resume_campaign(
    db: &Database,
    id: &CampaignId,
) -> Result<ResumeOutcome, CadenzaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let status: Option<String> = {
                let mut stmt = tx.prepare("SELECT status FROM campaigns WHERE id = ?1")?;
                match stmt.query_row(params![id], |row| row.get(0)) {
                    Ok(status) => Some(status),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                }
            };

            let outcome = match status.as_deref() {
                None => ResumeOutcome::NotFound,
                Some("ongoing") => ResumeOutcome::AlreadyOngoing,
                Some("paused_mobile") => {
                    tx.execute(
                        "UPDATE campaigns SET
                             status = 'ongoing',
                             paused_at = NULL,
                             pause_reason = NULL,
                             auto_resume_at = NULL,
                             paused_by_session = NULL,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1 AND status = 'paused_mobile'",
                        params![id],
                    )?;
                    ResumeOutcome::Resumed
                }
                Some(_) => ResumeOutcome::NotResumable,
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
