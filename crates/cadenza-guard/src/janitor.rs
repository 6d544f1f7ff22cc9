// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stale-session cleanup janitor.
//!
//! Periodically removes sessions nobody is coming back for: failed ones
//! after a day, disconnected ones after three, anything after a week.
//! Sessions holding a live connection are never touched, removals are
//! capped per run, and dry-run mode reports matches without deleting.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cadenza_config::model::CleanupConfig;
use cadenza_core::{
    CadenzaError, CleanupLogEntry, OrchestratorStore, SessionRecord, SessionStatus,
    Transport,
};
use cadenza_registry::SessionRegistry;

pub struct CleanupJanitor {
    config: CleanupConfig,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn OrchestratorStore>,
    transport: Arc<dyn Transport>,
}

impl CleanupJanitor {
    pub fn new(
        config: CleanupConfig,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn OrchestratorStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            transport,
        }
    }

    /// Sweep on the configured interval until `shutdown` fires.
    pub fn run(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.interval_secs));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.sweep().await {
                            warn!(error = %e, "cleanup sweep failed");
                        }
                    }
                }
            }
            info!("cleanup janitor stopped");
        })
    }

    /// One cleanup pass. Returns how many sessions were removed (or, in
    /// dry-run mode, would have been).
    pub async fn sweep(&self) -> Result<u32, CadenzaError> {
        let now = Utc::now();
        let budget = self.config.max_per_run;
        let mut candidates: Vec<(SessionRecord, String)> = Vec::new();
        let mut seen: HashSet<cadenza_core::SessionId> = HashSet::new();

        let passes: [(Option<SessionStatus>, u32, &str); 3] = [
            (
                Some(SessionStatus::Failed),
                self.config.failed_idle_days,
                "failed",
            ),
            (
                Some(SessionStatus::Disconnected),
                self.config.disconnected_idle_days,
                "disconnected",
            ),
            (None, self.config.any_idle_days, "any"),
        ];

        for (status, days, label) in passes {
            if candidates.len() as u32 >= budget {
                break;
            }
            let cutoff = now - chrono::Duration::days(days as i64);
            for record in self.store.stale_sessions(status, cutoff, budget).await? {
                if candidates.len() as u32 >= budget {
                    break;
                }
                if seen.contains(&record.id) {
                    continue;
                }
                // A record may claim a live status while the connection is
                // long gone, but never remove anything actually connected.
                if record.status.is_live() {
                    continue;
                }
                seen.insert(record.id.clone());
                let reason = format!(
                    "{label} session idle since {} (threshold {days}d)",
                    record.last_activity_at.to_rfc3339()
                );
                candidates.push((record, reason));
            }
        }

        if candidates.is_empty() {
            return Ok(0);
        }

        let mut removed = 0u32;
        for (record, reason) in candidates {
            if self.config.dry_run {
                info!(
                    session_id = %record.id,
                    status = %record.status,
                    reason,
                    "dry run, session would be removed"
                );
                removed += 1;
                continue;
            }

            let entry = CleanupLogEntry {
                session_id: record.id.clone(),
                action: "removed".to_string(),
                status: record.status.to_string(),
                reason: reason.clone(),
                timestamp: Utc::now(),
            };
            self.store.append_cleanup_log(&entry).await?;

            if self.registry.tenant_of(&record.id).is_some() {
                // A registered but dead session: tear down through the
                // registry so the slot goes too.
                if let Err(e) = self.registry.destroy(&record.id, true).await {
                    warn!(session_id = %record.id, error = %e, "janitor destroy failed");
                    continue;
                }
            } else {
                self.store.delete_session(&record.id).await?;
                self.transport.remove_artifacts(&record.id).await?;
            }
            info!(session_id = %record.id, reason, "stale session removed");
            removed += 1;
        }
        Ok(removed)
    }
}
