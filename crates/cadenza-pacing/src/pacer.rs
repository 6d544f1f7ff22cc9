// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-like send pacing.
//!
//! A [`CampaignPacer`] turns a speed tier into a stream of inter-message
//! delays: a uniform draw from the tier's interval, jittered by the
//! configured variance, floored at the global minimum delay. After every
//! `batch_size` sends the pacer inserts a longer batch break.

use rand::Rng;
use std::time::Duration;

use cadenza_config::model::{SpeedConfig, SpeedTier};

/// What to do before the next send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingStep {
    /// How long to wait before sending.
    pub delay: Duration,
    /// Whether this step closes a batch (batch break applied).
    pub batch_break: bool,
    /// Whether to simulate a typing indicator during the wait.
    pub typing_indicator: bool,
}

pub struct CampaignPacer {
    tier: SpeedTier,
    variance_pct: u32,
    min_delay_ms: u64,
    sent_in_batch: u32,
}

impl CampaignPacer {
    /// Build a pacer for the given tier, falling back to the default tier
    /// when the requested one is not in the table.
    pub fn new(config: &SpeedConfig, tier: u8) -> Self {
        let tier = config
            .tier(tier)
            .or_else(|| config.tier(config.default_tier))
            .cloned()
            .unwrap_or(SpeedTier {
                tier: 0,
                interval_min_ms: 30_000,
                interval_max_ms: 60_000,
                batch_size: 10,
                batch_break_ms: 120_000,
                typing_indicator: false,
            });
        Self {
            tier,
            variance_pct: config.variance_pct,
            min_delay_ms: config.min_delay_ms,
            sent_in_batch: 0,
        }
    }

    pub fn tier(&self) -> u8 {
        self.tier.tier
    }

    /// Compute the wait before the next send and advance batch accounting.
    pub fn next_step<R: Rng>(&mut self, rng: &mut R) -> PacingStep {
        let mut delay_ms = self.jittered_interval(rng);
        let mut batch_break = false;

        self.sent_in_batch += 1;
        if self.sent_in_batch >= self.tier.batch_size {
            delay_ms += self.tier.batch_break_ms;
            batch_break = true;
            self.sent_in_batch = 0;
        }

        PacingStep {
            delay: Duration::from_millis(delay_ms),
            batch_break,
            typing_indicator: self.tier.typing_indicator,
        }
    }

    fn jittered_interval<R: Rng>(&self, rng: &mut R) -> u64 {
        let lo = self.tier.interval_min_ms.min(self.tier.interval_max_ms);
        let hi = self.tier.interval_min_ms.max(self.tier.interval_max_ms);
        let base = if lo == hi {
            lo
        } else {
            rng.gen_range(lo..=hi)
        };

        // Jitter is a signed percentage of the drawn value.
        let span = base as i64 * i64::from(self.variance_pct) / 100;
        let jitter = if span > 0 {
            rng.gen_range(-span..=span)
        } else {
            0
        };
        let jittered = (base as i64 + jitter).max(0) as u64;
        jittered.max(self.min_delay_ms)
    }
}
