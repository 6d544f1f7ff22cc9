// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health scoring and the periodic monitor.
//!
//! Each sweep probes every connected session with a bounded timeout and
//! folds the result into a 0-100 score. Low scores alert; very low scores
//! trigger an automatic disconnect-and-reconnect. A slower secondary
//! prober exercises the real send path to catch drivers that died without
//! dropping the connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadenza_config::model::HealthConfig;
use cadenza_core::{
    DisconnectReason, HealthCheck, Notifier, SessionEvent, SessionEventKind, SessionId,
    SessionStatus,
};

use crate::registry::SessionRegistry;

const UNRESPONSIVE_PENALTY: i32 = 40;
const REGRESSION_PENALTY: i32 = 20;
const RECOVERY_BONUS: i32 = 10;

/// Compute the score for one probe result, given the previous check.
pub fn health_score(
    responsive: bool,
    inactive_minutes: i64,
    prior: Option<&HealthCheck>,
) -> u8 {
    let mut score: i32 = 100;
    if !responsive {
        score -= UNRESPONSIVE_PENALTY;
    }
    score -= match inactive_minutes {
        m if m > 60 => 30,
        m if m > 30 => 15,
        m if m > 10 => 5,
        _ => 0,
    };
    if let Some(prior) = prior {
        if !prior.responsive && responsive {
            score += RECOVERY_BONUS;
        } else if prior.responsive && !responsive {
            score -= REGRESSION_PENALTY;
        }
    }
    score.clamp(0, 100) as u8
}

pub struct HealthMonitor {
    config: HealthConfig,
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn Notifier>,
    history: DashMap<SessionId, HealthCheck>,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        registry: Arc<SessionRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            registry,
            notifier,
            history: DashMap::new(),
        }
    }

    /// Run sweeps until `shutdown` fires.
    pub fn run(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep =
                tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));
            let mut silent = tokio::time::interval(Duration::from_secs(
                self.config.silent_probe_interval_secs,
            ));
            // The immediate first tick of each interval.
            sweep.tick().await;
            silent.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sweep.tick() => self.sweep().await,
                    _ = silent.tick() => self.silent_sweep().await,
                }
            }
            info!("health monitor stopped");
        })
    }

    /// Probe every connected session once and act on the scores.
    pub async fn sweep(&self) {
        let timeout = Duration::from_secs(self.config.probe_timeout_secs);
        for record in self.registry.snapshot_all().await {
            if record.status != SessionStatus::Connected {
                self.history.remove(&record.id);
                continue;
            }
            let responsive = self.registry.probe(&record.id, timeout).await;
            let inactive_minutes = (Utc::now() - record.last_activity_at).num_minutes();
            let prior = self.history.get(&record.id).map(|c| *c.value());
            let score = health_score(responsive, inactive_minutes, prior.as_ref());

            self.history.insert(
                record.id.clone(),
                HealthCheck {
                    timestamp: Utc::now(),
                    responsive,
                    score,
                    inactive_minutes,
                },
            );
            if let Err(e) = self.registry.set_health_score(&record.id, score).await {
                debug!(session_id = %record.id, error = %e, "score update skipped");
                continue;
            }

            if score < self.config.recovery_threshold {
                warn!(
                    session_id = %record.id,
                    score,
                    "health below recovery threshold, recycling session"
                );
                self.recycle(&record.id).await;
            } else if score < self.config.alert_threshold {
                let event = SessionEvent::now(
                    record.id.clone(),
                    record.tenant_id.clone(),
                    SessionEventKind::HealthAlert,
                    Some(format!("health score {score}")),
                );
                if let Err(e) = self.notifier.notify(&event).await {
                    warn!(session_id = %record.id, error = %e, "health alert delivery failed");
                }
            }
        }
    }

    /// Exercise the send path of every connected session. A driver that no
    /// longer answers at all gets recycled even though its socket looks up.
    pub async fn silent_sweep(&self) {
        let timeout = Duration::from_secs(self.config.probe_timeout_secs);
        for record in self.registry.snapshot_all().await {
            if record.status != SessionStatus::Connected {
                continue;
            }
            if !self.registry.silent_probe(&record.id, timeout).await {
                warn!(session_id = %record.id, "silent death detected, recycling session");
                self.recycle(&record.id).await;
            }
        }
    }

    /// Last recorded check for a session, if any.
    pub fn last_check(&self, session_id: &SessionId) -> Option<HealthCheck> {
        self.history.get(session_id).map(|c| *c.value())
    }

    async fn recycle(&self, session_id: &SessionId) {
        if let Err(e) = self
            .registry
            .disconnect(session_id, DisconnectReason::Crash)
            .await
        {
            warn!(session_id = %session_id, error = %e, "recycle disconnect failed");
            return;
        }
        self.history.remove(session_id);
        if let Err(e) = self.registry.reconnect(session_id).await {
            // The backoff scheduler owns further attempts.
            debug!(session_id = %session_id, error = %e, "recycle reconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_config::model::{QrConfig, ReconnectConfig};
    use cadenza_core::{TenantId, TransportEvent, TransportHandle};
    use cadenza_pacing::QrLimiter;
    use cadenza_test_utils::{MemoryStore, MockNotifier, MockTransport};

    fn check(responsive: bool, score: u8) -> HealthCheck {
        HealthCheck {
            timestamp: Utc::now(),
            responsive,
            score,
            inactive_minutes: 0,
        }
    }

    #[test]
    fn score_for_a_healthy_session_is_full() {
        assert_eq!(health_score(true, 0, None), 100);
        assert_eq!(health_score(true, 10, None), 100);
    }

    #[test]
    fn unresponsive_probe_costs_forty() {
        assert_eq!(health_score(false, 0, None), 60);
    }

    #[test]
    fn inactivity_tiers() {
        assert_eq!(health_score(true, 11, None), 95);
        assert_eq!(health_score(true, 31, None), 85);
        assert_eq!(health_score(true, 61, None), 70);
    }

    #[test]
    fn recovery_bonus_and_regression_penalty() {
        let prior_down = check(false, 60);
        assert_eq!(health_score(true, 0, Some(&prior_down)), 100);

        let prior_up = check(true, 100);
        assert_eq!(health_score(false, 0, Some(&prior_up)), 40);
    }

    #[test]
    fn score_clamps_at_zero_and_hundred() {
        let prior_up = check(true, 100);
        // Unresponsive, idle > 1h, regressed: 100 - 40 - 30 - 20 = 10.
        assert_eq!(health_score(false, 100, Some(&prior_up)), 10);

        let prior_down = check(false, 30);
        // Bonus never pushes past 100.
        assert_eq!(health_score(true, 0, Some(&prior_down)), 100);
    }

    async fn connected_registry(
        transport: Arc<MockTransport>,
    ) -> (Arc<SessionRegistry>, SessionId) {
        let registry = Arc::new(SessionRegistry::new(
            transport,
            Arc::new(MemoryStore::new()),
            Arc::new(QrLimiter::new(QrConfig::default())),
            ReconnectConfig::default(),
            None,
        ));
        let sid = SessionId::from("s1");
        registry
            .create_session(&TenantId::from("t1"), &sid, false)
            .await
            .unwrap();
        registry
            .deliver_event(&sid, TransportEvent::Authenticated)
            .await
            .unwrap();
        registry
            .deliver_event(&sid, TransportEvent::Connected)
            .await
            .unwrap();
        (registry, sid)
    }

    #[tokio::test]
    async fn sweep_records_scores_and_persists_them() {
        let transport = Arc::new(MockTransport::new());
        let (registry, sid) = connected_registry(transport).await;
        let notifier = Arc::new(MockNotifier::new());
        let monitor = HealthMonitor::new(
            HealthConfig::default(),
            registry.clone(),
            notifier.clone(),
        );

        monitor.sweep().await;

        let checked = monitor.last_check(&sid).unwrap();
        assert!(checked.responsive);
        assert_eq!(checked.score, 100);
        assert_eq!(registry.snapshot(&sid).await.unwrap().health_score, 100);
        assert!(notifier.events().await.is_empty());
    }

    #[tokio::test]
    async fn low_score_raises_a_health_alert() {
        let transport = Arc::new(MockTransport::new());
        let (registry, sid) = connected_registry(transport.clone()).await;

        let notifier = Arc::new(MockNotifier::new());
        let monitor = HealthMonitor::new(
            HealthConfig::default(),
            registry.clone(),
            notifier.clone(),
        );

        // First sweep is healthy; the second regresses: 100 - 40 - 20 = 40,
        // under the default alert threshold of 50.
        monitor.sweep().await;
        assert!(notifier.events().await.is_empty());
        transport.set_probe_result(TransportHandle(1), false).await;
        monitor.sweep().await;

        let alerts = notifier.events_of_kind(SessionEventKind::HealthAlert).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].session_id, sid);
        assert_eq!(registry.snapshot(&sid).await.unwrap().health_score, 40);
    }

    #[tokio::test]
    async fn critical_score_recycles_the_session() {
        let transport = Arc::new(MockTransport::new());
        let (registry, sid) = connected_registry(transport.clone()).await;
        transport.set_probe_result(TransportHandle(1), false).await;

        let notifier = Arc::new(MockNotifier::new());
        let config = HealthConfig {
            // Raise the bar so the first bad sweep already recycles.
            recovery_threshold: 70,
            ..HealthConfig::default()
        };
        let monitor = HealthMonitor::new(config, registry.clone(), notifier);

        monitor.sweep().await;

        // Recycle reconnected through a fresh handle, which probes fine.
        let snapshot = registry.snapshot(&sid).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Connected);
        assert!(monitor.last_check(&sid).is_none());
        assert!(!transport.is_connected(TransportHandle(1)).await);
        assert!(transport.is_connected(TransportHandle(2)).await);
    }

    #[tokio::test]
    async fn silent_sweep_leaves_a_live_driver_alone() {
        let transport = Arc::new(MockTransport::new());
        let (registry, sid) = connected_registry(transport.clone()).await;

        let notifier = Arc::new(MockNotifier::new());
        let config = HealthConfig {
            probe_timeout_secs: 1,
            ..HealthConfig::default()
        };
        let monitor = HealthMonitor::new(config, registry.clone(), notifier);

        monitor.silent_sweep().await;
        assert_eq!(registry.snapshot(&sid).await.unwrap().status, SessionStatus::Connected);
        assert!(transport.is_connected(TransportHandle(1)).await);
        // The sentinel send proves the path was exercised.
        assert_eq!(transport.sent_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sweep_recycles_a_dead_driver() {
        let transport = Arc::new(MockTransport::new());
        let (registry, sid) = connected_registry(transport.clone()).await;
        // The driver hangs on send, well past the probe timeout.
        transport
            .set_send_delay(TransportHandle(1), Duration::from_secs(30))
            .await;

        let notifier = Arc::new(MockNotifier::new());
        let config = HealthConfig {
            probe_timeout_secs: 1,
            ..HealthConfig::default()
        };
        let monitor = HealthMonitor::new(config, registry.clone(), notifier);

        monitor.silent_sweep().await;

        let snapshot = registry.snapshot(&sid).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Connected);
        assert!(!transport.is_connected(TransportHandle(1)).await);
        assert!(transport.is_connected(TransportHandle(2)).await);
    }
}
