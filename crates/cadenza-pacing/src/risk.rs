// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composite ban-risk scoring.
//!
//! The score is a weighted sum of four utilization fractions, recomputed
//! before every send. Weights are product-tuned constants carried in
//! configuration, never hardcoded here.

use cadenza_config::model::{RateLimitConfig, RiskConfig};

/// Current utilization counts feeding the risk score.
#[derive(Debug, Clone, Copy)]
pub struct RiskInputs {
    /// Messages sent in the rolling hour.
    pub hour_count: u32,
    /// Messages sent in the rolling minute.
    pub minute_count: u32,
    /// Unique recipients contacted in the rolling 24 hours.
    pub recipient_count: u32,
    /// Broadcasts issued within the configured recent-broadcast window.
    pub recent_broadcasts: u32,
}

/// Compute the 0-100 composite ban-risk score.
///
/// Each input is normalized against its cap to a fraction in [0,1], then
/// weighted: hourly volume, minute burst, recipient diversity, and recent
/// broadcast frequency.
pub fn ban_risk_score(
    inputs: RiskInputs,
    limits: &RateLimitConfig,
    risk: &RiskConfig,
) -> u8 {
    let hourly = fraction(inputs.hour_count, limits.per_hour);
    let minute = fraction(inputs.minute_count, limits.per_minute);
    let recipients = fraction(inputs.recipient_count, limits.unique_recipients_24h);
    let broadcasts = fraction(inputs.recent_broadcasts, risk.broadcast_norm);

    let score = hourly * f64::from(risk.hourly_weight)
        + minute * f64::from(risk.minute_weight)
        + recipients * f64::from(risk.recipient_weight)
        + broadcasts * f64::from(risk.broadcast_weight);

    score.round().clamp(0.0, 100.0) as u8
}

fn fraction(count: u32, cap: u32) -> f64 {
    if cap == 0 {
        return 1.0;
    }
    (f64::from(count) / f64::from(cap)).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> (RateLimitConfig, RiskConfig) {
        (RateLimitConfig::default(), RiskConfig::default())
    }

    #[test]
    fn idle_session_scores_zero() {
        let (limits, risk) = defaults();
        let score = ban_risk_score(
            RiskInputs {
                hour_count: 0,
                minute_count: 0,
                recipient_count: 0,
                recent_broadcasts: 0,
            },
            &limits,
            &risk,
        );
        assert_eq!(score, 0);
    }

    #[test]
    fn saturated_session_scores_hundred() {
        let (limits, risk) = defaults();
        let score = ban_risk_score(
            RiskInputs {
                hour_count: 1000,
                minute_count: 30,
                recipient_count: 500,
                recent_broadcasts: 10,
            },
            &limits,
            &risk,
        );
        assert_eq!(score, 100);
    }

    #[test]
    fn fractions_cap_at_one() {
        let (limits, risk) = defaults();
        // Double every cap; score must still be 100, not 200.
        let score = ban_risk_score(
            RiskInputs {
                hour_count: 2000,
                minute_count: 60,
                recipient_count: 1000,
                recent_broadcasts: 20,
            },
            &limits,
            &risk,
        );
        assert_eq!(score, 100);
    }

    #[test]
    fn weights_apply_per_component() {
        let (limits, risk) = defaults();
        // Only hourly volume at 50%: 0.5 * 40 = 20.
        let score = ban_risk_score(
            RiskInputs {
                hour_count: 500,
                minute_count: 0,
                recipient_count: 0,
                recent_broadcasts: 0,
            },
            &limits,
            &risk,
        );
        assert_eq!(score, 20);

        // Only minute burst at 100%: 1.0 * 30 = 30.
        let score = ban_risk_score(
            RiskInputs {
                hour_count: 0,
                minute_count: 30,
                recipient_count: 0,
                recent_broadcasts: 0,
            },
            &limits,
            &risk,
        );
        assert_eq!(score, 30);
    }
}
