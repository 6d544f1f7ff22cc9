// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-reconnect scheduler.
//!
//! The registry counts attempts and decides when to give up; this component
//! only owns the timers. At most one timer exists per session, and a newer
//! request replaces the older timer so a manual reconnect or destroy never
//! races a stale backoff.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use cadenza_config::model::ReconnectConfig;
use cadenza_core::SessionId;

use crate::registry::{ReconnectRequest, SessionRegistry};

pub struct AutoReconnect {
    config: ReconnectConfig,
    timers: DashMap<SessionId, (u64, CancellationToken)>,
    generation: std::sync::atomic::AtomicU64,
}

impl AutoReconnect {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            timers: DashMap::new(),
            generation: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Drain reconnect requests until the channel closes or `shutdown` fires.
    pub fn run(
        self: Arc<Self>,
        registry: Arc<SessionRegistry>,
        mut rx: mpsc::UnboundedReceiver<ReconnectRequest>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    request = rx.recv() => match request {
                        Some(request) => self.schedule(registry.clone(), request),
                        None => break,
                    },
                }
            }
            // Stop any in-flight timers on the way out.
            for entry in self.timers.iter() {
                entry.value().1.cancel();
            }
            info!("auto-reconnect scheduler stopped");
        })
    }

    /// Drop the pending timer for a session, if any. Called when a session
    /// is destroyed or reconnected by hand.
    pub fn cancel(&self, session_id: &SessionId) {
        if let Some((_, (_, token))) = self.timers.remove(session_id) {
            token.cancel();
        }
    }

    /// Number of sessions with a pending backoff timer.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    fn schedule(self: &Arc<Self>, registry: Arc<SessionRegistry>, request: ReconnectRequest) {
        let delay = self
            .config
            .delay_for_attempt(request.attempt.saturating_sub(1));
        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let token = CancellationToken::new();
        if let Some((_, previous)) = self
            .timers
            .insert(request.session_id.clone(), (generation, token.clone()))
        {
            previous.cancel();
        }

        debug!(
            session_id = %request.session_id,
            attempt = request.attempt,
            delay_secs = delay.as_secs(),
            "reconnect scheduled"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            // Only clear our own entry; a newer timer may have replaced it.
            this.timers
                .remove_if(&request.session_id, |_, (g, _)| *g == generation);
            // Failure re-enters the scheduler through the registry.
            if let Err(e) = registry.reconnect(&request.session_id).await {
                debug!(session_id = %request.session_id, error = %e, "reconnect attempt failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_config::model::QrConfig;
    use cadenza_core::{DisconnectReason, SessionStatus, TenantId, TransportEvent};
    use cadenza_pacing::QrLimiter;
    use cadenza_test_utils::MockTransport;
    use std::time::Duration;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> = (0..5)
            .map(|n| config.delay_for_attempt(n).as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80]);
        assert_eq!(config.delay_for_attempt(10).as_secs(), 300);
    }

    async fn registry_with(transport: Arc<MockTransport>) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            transport,
            Arc::new(cadenza_test_utils::MemoryStore::new()),
            Arc::new(QrLimiter::new(QrConfig::default())),
            ReconnectConfig::default(),
            None,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_attempt_fires_after_backoff() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport.clone()).await;
        let (tx, rx) = mpsc::unbounded_channel();
        registry.set_reconnect_channel(tx.clone()).await;

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

        let auto = Arc::new(AutoReconnect::new(ReconnectConfig::default()));
        let shutdown = CancellationToken::new();
        let _task = auto.clone().run(registry.clone(), rx, shutdown.clone());

        registry
            .deliver_event(
                &sid,
                TransportEvent::Disconnected {
                    reason: DisconnectReason::NetworkError,
                },
            )
            .await
            .unwrap();

        // First backoff is 5s; just before it, nothing has happened.
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(
            registry.snapshot(&sid).await.unwrap().status,
            SessionStatus::Disconnected
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        // Yield so the spawned timer task runs to completion.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            registry.snapshot(&sid).await.unwrap().status,
            SessionStatus::Connected
        );
        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_pending_timer() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport.clone()).await;
        let (tx, rx) = mpsc::unbounded_channel();
        registry.set_reconnect_channel(tx.clone()).await;

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

        let auto = Arc::new(AutoReconnect::new(ReconnectConfig::default()));
        let shutdown = CancellationToken::new();
        let _task = auto.clone().run(registry.clone(), rx, shutdown.clone());

        registry
            .deliver_event(
                &sid,
                TransportEvent::Disconnected {
                    reason: DisconnectReason::Crash,
                },
            )
            .await
            .unwrap();
        // Let the scheduler pick the request up.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(auto.pending(), 1);

        auto.cancel(&sid);
        tokio::time::sleep(Duration::from_secs(10)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            registry.snapshot(&sid).await.unwrap().status,
            SessionStatus::Disconnected
        );
        shutdown.cancel();
    }
}
