// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session sliding-window hard limiter.
//!
//! A [`RateWindow`] tracks message timestamps for the rolling minute and
//! hour, unique recipients for the rolling 24 hours, and recent broadcasts.
//! Every check takes an explicit `now` so behavior is fully deterministic
//! under test. Windows are created lazily on first send and dropped when
//! their session is removed; see [`RateLimiter`](crate::RateLimiter).

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use cadenza_config::model::{RateLimitConfig, RiskConfig};
use cadenza_core::{CadenzaError, RateLimitKind};

use crate::risk::{ban_risk_score, RiskInputs};

const MINUTE: TimeDelta = TimeDelta::seconds(60);
const HOUR: TimeDelta = TimeDelta::seconds(3600);
const DAY: TimeDelta = TimeDelta::seconds(86_400);

/// Sliding counters for one session.
#[derive(Debug, Default)]
pub struct RateWindow {
    minute: VecDeque<DateTime<Utc>>,
    hour: VecDeque<DateTime<Utc>>,
    /// Recipient -> most recent send within the 24h window.
    recipients: HashMap<String, DateTime<Utc>>,
    broadcasts: VecDeque<DateTime<Utc>>,
    /// Rate-limit pause: no sends until this instant. Set when the hourly
    /// cap is hit or the ban-risk score crosses its threshold.
    paused_until: Option<DateTime<Utc>>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the session is currently in the rate-paused state.
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.is_some_and(|until| until > now)
    }

    /// Drop timestamps that have aged out of their windows.
    fn prune(&mut self, now: DateTime<Utc>) {
        while self.minute.front().is_some_and(|t| now - *t >= MINUTE) {
            self.minute.pop_front();
        }
        while self.hour.front().is_some_and(|t| now - *t >= HOUR) {
            self.hour.pop_front();
        }
        self.recipients.retain(|_, t| now - *t < DAY);
        while self.broadcasts.front().is_some_and(|t| now - *t >= HOUR) {
            self.broadcasts.pop_front();
        }
        if self.paused_until.is_some_and(|until| until <= now) {
            self.paused_until = None;
        }
    }

    /// Check whether one send to `recipient` is allowed right now.
    ///
    /// Minute and recipient violations reject immediately. An hourly
    /// violation or a risk score at/over the threshold additionally flips
    /// the session into the rate-paused state until the hour window clears.
    pub fn check_send(
        &mut self,
        recipient: &str,
        limits: &RateLimitConfig,
        risk: &RiskConfig,
        now: DateTime<Utc>,
    ) -> Result<(), CadenzaError> {
        self.prune(now);

        if let Some(until) = self.paused_until {
            return Err(CadenzaError::RateLimited {
                kind: RateLimitKind::PerHour,
                current: self.hour.len() as u64,
                limit: u64::from(limits.per_hour),
                retry_after: delta_to_duration(until - now),
            });
        }

        if self.minute.len() as u32 >= limits.per_minute {
            let retry_after = self
                .minute
                .front()
                .map(|oldest| *oldest + MINUTE - now)
                .and_then(delta_to_duration);
            return Err(CadenzaError::RateLimited {
                kind: RateLimitKind::PerMinute,
                current: self.minute.len() as u64 + 1,
                limit: u64::from(limits.per_minute),
                retry_after,
            });
        }

        if self.hour.len() as u32 >= limits.per_hour {
            let resume_at = self
                .hour
                .front()
                .map(|oldest| *oldest + HOUR)
                .unwrap_or(now + HOUR);
            self.paused_until = Some(resume_at);
            return Err(CadenzaError::RateLimited {
                kind: RateLimitKind::PerHour,
                current: self.hour.len() as u64 + 1,
                limit: u64::from(limits.per_hour),
                retry_after: delta_to_duration(resume_at - now),
            });
        }

        let is_new_recipient = !self.recipients.contains_key(recipient);
        if is_new_recipient && self.recipients.len() as u32 >= limits.unique_recipients_24h {
            let retry_after = self
                .recipients
                .values()
                .min()
                .map(|oldest| *oldest + DAY - now)
                .and_then(delta_to_duration);
            return Err(CadenzaError::RateLimited {
                kind: RateLimitKind::UniqueRecipients,
                current: self.recipients.len() as u64 + 1,
                limit: u64::from(limits.unique_recipients_24h),
                retry_after,
            });
        }

        let score = self.risk_score(limits, risk, now);
        if u32::from(score) >= risk.pause_threshold {
            let resume_at = self
                .hour
                .front()
                .map(|oldest| *oldest + HOUR)
                .unwrap_or(now + HOUR);
            self.paused_until = Some(resume_at);
            return Err(CadenzaError::RateLimited {
                kind: RateLimitKind::RiskScore,
                current: u64::from(score),
                limit: u64::from(risk.pause_threshold),
                retry_after: delta_to_duration(resume_at - now),
            });
        }

        Ok(())
    }

    /// Record a successful send. Call only after `check_send` passed.
    pub fn record_send(&mut self, recipient: &str, now: DateTime<Utc>) {
        self.minute.push_back(now);
        self.hour.push_back(now);
        self.recipients.insert(recipient.to_string(), now);
    }

    /// Check a broadcast's fan-out size. Oversized broadcasts reject
    /// immediately without being sent.
    pub fn check_broadcast(
        &mut self,
        fan_out: u32,
        limits: &RateLimitConfig,
        now: DateTime<Utc>,
    ) -> Result<(), CadenzaError> {
        self.prune(now);
        if fan_out > limits.broadcast_max {
            return Err(CadenzaError::RateLimited {
                kind: RateLimitKind::BroadcastSize,
                current: u64::from(fan_out),
                limit: u64::from(limits.broadcast_max),
                retry_after: None,
            });
        }
        Ok(())
    }

    /// Record an issued broadcast for risk scoring.
    pub fn record_broadcast(&mut self, now: DateTime<Utc>) {
        self.broadcasts.push_back(now);
    }

    /// Current composite ban-risk score.
    pub fn risk_score(
        &self,
        limits: &RateLimitConfig,
        risk: &RiskConfig,
        now: DateTime<Utc>,
    ) -> u8 {
        let window = TimeDelta::seconds(risk.broadcast_window_secs as i64);
        let recent_broadcasts = self
            .broadcasts
            .iter()
            .filter(|t| now - **t < window)
            .count() as u32;
        ban_risk_score(
            RiskInputs {
                hour_count: self.hour.len() as u32,
                minute_count: self.minute.len() as u32,
                recipient_count: self.recipients.len() as u32,
                recent_broadcasts,
            },
            limits,
            risk,
        )
    }

    /// Whether every window is empty (eligible for garbage collection).
    pub fn is_empty(&self) -> bool {
        self.minute.is_empty()
            && self.hour.is_empty()
            && self.recipients.is_empty()
            && self.broadcasts.is_empty()
            && self.paused_until.is_none()
    }
}

fn delta_to_duration(delta: TimeDelta) -> Option<Duration> {
    delta.to_std().ok()
}
