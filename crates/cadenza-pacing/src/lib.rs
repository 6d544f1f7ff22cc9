// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anti-ban pacing for Cadenza sessions.
//!
//! Three layers keep outbound traffic looking human and under platform
//! radar:
//!
//! - [`RateLimiter`]: per-session sliding-window hard limits (minute, hour,
//!   unique recipients, broadcast size) with an automatic rate-paused state
//!   on hourly or risk violations
//! - [`QrLimiter`]: per-tenant and global QR issuance throttling
//! - [`CampaignPacer`]: speed-tier delays with jitter and batch breaks
//!
//! Risk scoring ([`ban_risk_score`]) feeds the limiter's pause decision and
//! is also exposed for stats reporting.

pub mod limiter;
pub mod pacer;
pub mod qr_limiter;
pub mod rate_window;
pub mod risk;

pub use limiter::RateLimiter;
pub use pacer::{CampaignPacer, PacingStep};
pub use qr_limiter::QrLimiter;
pub use rate_window::RateWindow;
pub use risk::{ban_risk_score, RiskInputs};
