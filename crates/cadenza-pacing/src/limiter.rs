// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-keyed rate limiter.
//!
//! Wraps one [`RateWindow`] per session behind a concurrent map. Windows
//! are created lazily on first use and must be removed when their session
//! is destroyed, otherwise timestamps for dead sessions accumulate.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use cadenza_config::model::{RateLimitConfig, RiskConfig};
use cadenza_core::{CadenzaError, SessionId};

use crate::rate_window::RateWindow;

pub struct RateLimiter {
    limits: RateLimitConfig,
    risk: RiskConfig,
    windows: DashMap<SessionId, Arc<Mutex<RateWindow>>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimitConfig, risk: RiskConfig) -> Self {
        Self {
            limits,
            risk,
            windows: DashMap::new(),
        }
    }

    fn window(&self, session: &SessionId) -> Arc<Mutex<RateWindow>> {
        self.windows
            .entry(session.clone())
            .or_insert_with(|| Arc::new(Mutex::new(RateWindow::new())))
            .clone()
    }

    /// Gate one outbound message. On success the send is recorded
    /// immediately, so the caller must actually perform it.
    pub async fn acquire_send(
        &self,
        session: &SessionId,
        recipient: &str,
    ) -> Result<(), CadenzaError> {
        let window = self.window(session);
        let mut guard = window.lock().await;
        let now = Utc::now();
        guard.check_send(recipient, &self.limits, &self.risk, now)?;
        guard.record_send(recipient, now);
        Ok(())
    }

    /// Gate a broadcast by fan-out size and record it for risk scoring.
    /// Individual sends within the broadcast still go through
    /// [`acquire_send`](Self::acquire_send).
    pub async fn acquire_broadcast(
        &self,
        session: &SessionId,
        fan_out: u32,
    ) -> Result<(), CadenzaError> {
        let window = self.window(session);
        let mut guard = window.lock().await;
        let now = Utc::now();
        guard.check_broadcast(fan_out, &self.limits, now)?;
        guard.record_broadcast(now);
        Ok(())
    }

    /// Current composite risk score for a session, 0 if it has no window.
    pub async fn risk_score(&self, session: &SessionId) -> u8 {
        let Some(window) = self.windows.get(session).map(|w| w.clone()) else {
            return 0;
        };
        let guard = window.lock().await;
        guard.risk_score(&self.limits, &self.risk, Utc::now())
    }

    /// Whether the session is currently rate-paused.
    pub async fn is_paused(&self, session: &SessionId) -> bool {
        let Some(window) = self.windows.get(session).map(|w| w.clone()) else {
            return false;
        };
        window.lock().await.is_paused(Utc::now())
    }

    /// Drop the window for a destroyed session.
    pub fn remove(&self, session: &SessionId) {
        if self.windows.remove(session).is_some() {
            debug!(session_id = %session, "dropped rate window");
        }
    }

    /// Number of tracked sessions, for stats reporting.
    pub fn tracked_sessions(&self) -> usize {
        self.windows.len()
    }
}
