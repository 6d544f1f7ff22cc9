// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory resource guard.
//!
//! Polls system memory usage and sheds session load in two stages: above
//! the soft threshold it drops sessions that have been idle for a long
//! time, above the emergency threshold it disconnects the heaviest
//! consumers outright. Every destructive action is written to the audit
//! log before it takes effect.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadenza_config::model::GuardConfig;
use cadenza_core::{
    CleanupLogEntry, DisconnectReason, OrchestratorStore, SessionRecord,
};
use cadenza_registry::SessionRegistry;

/// Source of the system memory usage percentage.
pub trait MemoryProbe: Send + 'static {
    fn usage_pct(&mut self) -> u8;
}

/// Real probe backed by sysinfo.
pub struct SysinfoProbe {
    system: sysinfo::System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: sysinfo::System::new(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn usage_pct(&mut self) -> u8 {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return 0;
        }
        ((self.system.used_memory().saturating_mul(100)) / total) as u8
    }
}

pub struct ResourceGuard {
    config: GuardConfig,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn OrchestratorStore>,
    probe: Mutex<Box<dyn MemoryProbe>>,
}

impl ResourceGuard {
    pub fn new(
        config: GuardConfig,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn OrchestratorStore>,
        probe: Box<dyn MemoryProbe>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            probe: Mutex::new(probe),
        }
    }

    /// Poll until `shutdown` fires.
    pub fn run(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut poll =
                tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
            poll.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = poll.tick() => self.check().await,
                }
            }
            info!("resource guard stopped");
        })
    }

    /// One poll cycle: read usage and shed load if thresholds are crossed.
    pub async fn check(&self) {
        let pct = self.probe.lock().await.usage_pct();
        if pct >= self.config.emergency_threshold_pct {
            warn!(usage_pct = pct, "memory usage critical, emergency disconnect");
            self.emergency_disconnect(pct).await;
        } else if pct >= self.config.soft_threshold_pct {
            info!(usage_pct = pct, "memory usage high, dropping idle sessions");
            self.drop_idle(pct).await;
        } else {
            debug!(usage_pct = pct, "memory usage nominal");
        }
    }

    async fn drop_idle(&self, usage_pct: u8) {
        let idle_cutoff = chrono::Duration::seconds(self.config.idle_drop_secs as i64);
        let now = Utc::now();
        for record in self.registry.snapshot_all().await {
            if !record.status.is_live() || now - record.last_activity_at < idle_cutoff {
                continue;
            }
            let reason = format!(
                "memory at {usage_pct}%, idle for {}s",
                (now - record.last_activity_at).num_seconds()
            );
            self.audited_disconnect(&record, "idle_drop", &reason).await;
        }
    }

    async fn emergency_disconnect(&self, usage_pct: u8) {
        let mut weighted: Vec<(u64, SessionRecord)> = Vec::new();
        for record in self.registry.snapshot_all().await {
            if !record.status.is_live() {
                continue;
            }
            let bytes = self.registry.memory_footprint(&record.id).await;
            weighted.push((bytes, record));
        }
        weighted.sort_by(|a, b| b.0.cmp(&a.0));

        for (bytes, record) in weighted
            .into_iter()
            .take(self.config.emergency_disconnect_count)
        {
            let reason = format!("memory at {usage_pct}%, session using {bytes} bytes");
            self.audited_disconnect(&record, "emergency_disconnect", &reason)
                .await;
        }
    }

    /// Audit first, act second: a crash in between leaves the log as
    /// evidence of the intent.
    async fn audited_disconnect(&self, record: &SessionRecord, action: &str, reason: &str) {
        let entry = CleanupLogEntry {
            session_id: record.id.clone(),
            action: action.to_string(),
            status: record.status.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.store.append_cleanup_log(&entry).await {
            warn!(session_id = %record.id, error = %e, "audit log write failed, skipping disconnect");
            return;
        }
        if let Err(e) = self
            .registry
            .disconnect(
                &record.id,
                DisconnectReason::Unknown("memory_pressure".to_string()),
            )
            .await
        {
            warn!(session_id = %record.id, error = %e, "guard disconnect failed");
        } else {
            info!(session_id = %record.id, action, "session disconnected by resource guard");
        }
    }
}
