// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session record CRUD and stale-session scans.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Row};

use cadenza_core::{CadenzaError, SessionId, SessionRecord, SessionStatus, TenantId};

use crate::database::Database;
use crate::models::{fmt_ts, SessionRow};

const COLUMNS: &str = "id, tenant_id, status, health_score, last_activity_at,
                       reconnect_attempts, is_primary, assigned_worker,
                       created_at, updated_at";

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        status: row.get(2)?,
        health_score: row.get(3)?,
        last_activity_at: row.get(4)?,
        reconnect_attempts: row.get(5)?,
        is_primary: row.get(6)?,
        assigned_worker: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Insert or fully replace a session record.
pub async fn upsert_session(db: &Database, record: &SessionRecord) -> Result<(), CadenzaError> {
    let row = SessionRow::from_record(record);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, tenant_id, status, health_score, last_activity_at,
                                       reconnect_attempts, is_primary, assigned_worker,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                     tenant_id = excluded.tenant_id,
                     status = excluded.status,
                     health_score = excluded.health_score,
                     last_activity_at = excluded.last_activity_at,
                     reconnect_attempts = excluded.reconnect_attempts,
                     is_primary = excluded.is_primary,
                     assigned_worker = excluded.assigned_worker,
                     updated_at = excluded.updated_at",
                params![
                    row.id,
                    row.tenant_id,
                    row.status,
                    row.health_score,
                    row.last_activity_at,
                    row.reconnect_attempts,
                    row.is_primary,
                    row.assigned_worker,
                    row.created_at,
                    row.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a session by ID.
pub async fn get_session(
    db: &Database,
    id: &SessionId,
) -> Result<Option<SessionRecord>, CadenzaError> {
    let id = id.to_string();
    let row = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM sessions WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_session) {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    row.map(SessionRow::into_record).transpose()
}

/// List sessions, optionally filtered by tenant and/or status.
pub async fn list_sessions(
    db: &Database,
    tenant_id: Option<&TenantId>,
    status: Option<SessionStatus>,
) -> Result<Vec<SessionRecord>, CadenzaError> {
    let tenant = tenant_id.map(|t| t.to_string());
    let status = status.map(|s| s.to_string());
    let rows = db
        .connection()
        .call(move |conn| {
            let mut clauses = Vec::new();
            let mut values = Vec::new();
            if let Some(tenant) = &tenant {
                values.push(tenant.clone());
                clauses.push(format!("tenant_id = ?{}", values.len()));
            }
            if let Some(status) = &status {
                values.push(status.clone());
                clauses.push(format!("status = ?{}", values.len()));
            }
            let filter = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM sessions {filter} ORDER BY created_at DESC"
            ))?;
            let mapped = stmt.query_map(params_from_iter(values), row_to_session)?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    rows.into_iter().map(SessionRow::into_record).collect()
}

/// Mark `id` as its tenant's primary session, clearing any previous primary
/// in the same transaction.
pub async fn set_primary(
    db: &Database,
    tenant_id: &TenantId,
    id: &SessionId,
) -> Result<(), CadenzaError> {
    let tenant = tenant_id.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE sessions SET is_primary = 0 WHERE tenant_id = ?1 AND is_primary = 1",
                params![tenant],
            )?;
            let changed = tx.execute(
                "UPDATE sessions SET is_primary = 1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND tenant_id = ?2",
                params![id, tenant],
            )?;
            if changed == 0 {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a session row.
pub async fn delete_session(db: &Database, id: &SessionId) -> Result<(), CadenzaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Sessions idle since before `cutoff`, oldest first, optionally filtered by
/// status. Served by the `(status, last_activity_at)` index.
pub async fn stale_sessions(
    db: &Database,
    status: Option<SessionStatus>,
    cutoff: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<SessionRecord>, CadenzaError> {
    let status = status.map(|s| s.to_string());
    let cutoff = fmt_ts(cutoff);
    let rows = db
        .connection()
        .call(move |conn| {
            let mut rows = Vec::new();
            match &status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM sessions
                         WHERE status = ?1 AND last_activity_at < ?2
                         ORDER BY last_activity_at ASC LIMIT ?3"
                    ))?;
                    let mapped =
                        stmt.query_map(params![status, cutoff, limit], row_to_session)?;
                    for row in mapped {
                        rows.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM sessions
                         WHERE last_activity_at < ?1
                         ORDER BY last_activity_at ASC LIMIT ?2"
                    ))?;
                    let mapped = stmt.query_map(params![cutoff, limit], row_to_session)?;
                    for row in mapped {
                        rows.push(row?);
                    }
                }
            }
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    rows.into_iter().map(SessionRow::into_record).collect()
}
