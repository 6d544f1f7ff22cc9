// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only cleanup audit log.

use rusqlite::params;

use cadenza_core::{CadenzaError, CleanupLogEntry, SessionId};

use crate::database::Database;
use crate::models::{fmt_ts, parse_ts};

/// Append one audit record. Nothing ever updates or deletes these rows.
pub async fn append(db: &Database, entry: &CleanupLogEntry) -> Result<(), CadenzaError> {
    let session_id = entry.session_id.to_string();
    let action = entry.action.clone();
    let status = entry.status.clone();
    let reason = entry.reason.clone();
    let timestamp = fmt_ts(entry.timestamp);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO cleanup_logs (session_id, action, status, reason, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, action, status, reason, timestamp],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recent entries, newest first.
pub async fn recent(db: &Database, limit: u32) -> Result<Vec<CleanupLogEntry>, CadenzaError> {
    let raw = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, action, status, reason, timestamp
                 FROM cleanup_logs ORDER BY id DESC LIMIT ?1",
            )?;
            let mapped = stmt.query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    raw.into_iter()
        .map(|(session_id, action, status, reason, timestamp)| {
            Ok(CleanupLogEntry {
                session_id: SessionId(session_id),
                action,
                status,
                reason,
                timestamp: parse_ts(&timestamp)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_and_read_back_in_reverse_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();

        for i in 0..3 {
            append(
                &db,
                &CleanupLogEntry {
                    session_id: SessionId::from(format!("s{i}").as_str()),
                    action: "removed".to_string(),
                    status: "failed".to_string(),
                    reason: "idle beyond threshold".to_string(),
                    timestamp: Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, i).unwrap(),
                },
            )
            .await
            .unwrap();
        }

        let entries = recent(&db, 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].session_id, SessionId::from("s2"));
        assert_eq!(entries[1].session_id, SessionId::from("s1"));
        assert_eq!(entries[0].action, "removed");

        db.close().await.unwrap();
    }
}
