// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Cadenza orchestrator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages. Every
//! product-tuned constant (rate windows, risk weights, tier tables,
//! cooldowns) lives here, not in code, so it can be recalibrated without
//! a code change.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Cadenza configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CadenzaConfig {
    /// Orchestrator identity and runtime settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Admission pool concurrency caps and queueing.
    #[serde(default)]
    pub pool: PoolConfig,

    /// QR issuance rate limits.
    #[serde(default)]
    pub qr: QrConfig,

    /// Per-session hard send limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Ban-risk scoring weights and threshold.
    #[serde(default)]
    pub risk: RiskConfig,

    /// Speed-tier pacing table.
    #[serde(default)]
    pub speed: SpeedConfig,

    /// Health monitor sweep settings.
    #[serde(default)]
    pub health: HealthConfig,

    /// Reconnection backoff policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Mobile-conflict pause/resume settings.
    #[serde(default)]
    pub conflict: ConflictConfig,

    /// Memory resource guard thresholds.
    #[serde(default)]
    pub guard: GuardConfig,

    /// Stale-session cleanup janitor settings.
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Control-plane HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Orchestrator identity and runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Display name of this orchestrator instance.
    #[serde(default = "default_instance_name")]
    pub name: String,

    /// Worker index assigned to sessions created by this instance.
    /// Sharding extension point; recorded on the session, never acted on.
    #[serde(default)]
    pub worker_index: Option<u32>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            name: default_instance_name(),
            worker_index: None,
            log_level: default_log_level(),
        }
    }
}

fn default_instance_name() -> String {
    "cadenza".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Admission pool concurrency caps.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Global ceiling on concurrently active sessions.
    #[serde(default = "default_global_max")]
    pub global_max: usize,

    /// Per-tenant ceiling on concurrently active sessions.
    #[serde(default = "default_tenant_max")]
    pub tenant_max: usize,

    /// Upper bound on the queue-position ETA estimate, in seconds.
    #[serde(default = "default_eta_cap_secs")]
    pub eta_cap_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            global_max: default_global_max(),
            tenant_max: default_tenant_max(),
            eta_cap_secs: default_eta_cap_secs(),
        }
    }
}

fn default_global_max() -> usize {
    50
}

fn default_tenant_max() -> usize {
    10
}

fn default_eta_cap_secs() -> u64 {
    1800
}

/// QR issuance rate limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QrConfig {
    /// QR generations allowed per tenant per rolling hour.
    #[serde(default = "default_qr_tenant_hourly")]
    pub tenant_per_hour: u32,

    /// QR generations allowed per tenant per rolling day.
    #[serde(default = "default_qr_tenant_daily")]
    pub tenant_per_day: u32,

    /// QR generations allowed across all tenants per rolling hour.
    #[serde(default = "default_qr_global_hourly")]
    pub global_per_hour: u32,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            tenant_per_hour: default_qr_tenant_hourly(),
            tenant_per_day: default_qr_tenant_daily(),
            global_per_hour: default_qr_global_hourly(),
        }
    }
}

fn default_qr_tenant_hourly() -> u32 {
    5
}

fn default_qr_tenant_daily() -> u32 {
    20
}

fn default_qr_global_hourly() -> u32 {
    100
}

/// Per-session hard send limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Messages per rolling minute.
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    /// Messages per rolling hour. Exceeding this pauses the session until
    /// the window clears.
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,

    /// Unique recipients per rolling 24 hours.
    #[serde(default = "default_unique_recipients")]
    pub unique_recipients_24h: u32,

    /// Maximum fan-out of a single broadcast.
    #[serde(default = "default_broadcast_max")]
    pub broadcast_max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            unique_recipients_24h: default_unique_recipients(),
            broadcast_max: default_broadcast_max(),
        }
    }
}

fn default_per_minute() -> u32 {
    30
}

fn default_per_hour() -> u32 {
    1000
}

fn default_unique_recipients() -> u32 {
    500
}

fn default_broadcast_max() -> u32 {
    256
}

/// Ban-risk scoring weights. Product-tuned, not derived from a model.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RiskConfig {
    /// Weight of the hourly-volume fraction.
    #[serde(default = "default_hourly_weight")]
    pub hourly_weight: u32,

    /// Weight of the minute-burst fraction.
    #[serde(default = "default_minute_weight")]
    pub minute_weight: u32,

    /// Weight of the recipient-diversity fraction.
    #[serde(default = "default_recipient_weight")]
    pub recipient_weight: u32,

    /// Weight of the recent-broadcast-frequency fraction.
    #[serde(default = "default_broadcast_weight")]
    pub broadcast_weight: u32,

    /// Crossing this composite score forces the rate-paused state.
    #[serde(default = "default_pause_threshold")]
    pub pause_threshold: u32,

    /// Window for counting recent broadcasts, in seconds.
    #[serde(default = "default_broadcast_window_secs")]
    pub broadcast_window_secs: u64,

    /// Broadcast count at which the broadcast-frequency fraction saturates.
    #[serde(default = "default_broadcast_norm")]
    pub broadcast_norm: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            hourly_weight: default_hourly_weight(),
            minute_weight: default_minute_weight(),
            recipient_weight: default_recipient_weight(),
            broadcast_weight: default_broadcast_weight(),
            pause_threshold: default_pause_threshold(),
            broadcast_window_secs: default_broadcast_window_secs(),
            broadcast_norm: default_broadcast_norm(),
        }
    }
}

fn default_hourly_weight() -> u32 {
    40
}

fn default_minute_weight() -> u32 {
    30
}

fn default_recipient_weight() -> u32 {
    20
}

fn default_broadcast_weight() -> u32 {
    10
}

fn default_pause_threshold() -> u32 {
    80
}

fn default_broadcast_window_secs() -> u64 {
    3600
}

fn default_broadcast_norm() -> u32 {
    10
}

/// One speed tier: a named pacing profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpeedTier {
    /// Tier number (1 = slowest/safest, 5 = fastest).
    pub tier: u8,
    /// Lower bound of the per-message interval, in milliseconds.
    pub interval_min_ms: u64,
    /// Upper bound of the per-message interval, in milliseconds.
    pub interval_max_ms: u64,
    /// Messages sent before a batch break is inserted.
    pub batch_size: u32,
    /// Duration of the batch break, in milliseconds.
    pub batch_break_ms: u64,
    /// Whether to simulate a typing indicator before each send.
    #[serde(default)]
    pub typing_indicator: bool,
}

/// Speed pacer configuration: tier table plus jitter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpeedConfig {
    /// Jitter applied to each delay, as a percentage of the picked value.
    #[serde(default = "default_variance_pct")]
    pub variance_pct: u32,

    /// Absolute floor on any computed delay, in milliseconds.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Tier used when a campaign does not choose one.
    #[serde(default = "default_tier")]
    pub default_tier: u8,

    /// The tier table. Defaults to five tiers from cautious to brisk.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<SpeedTier>,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            variance_pct: default_variance_pct(),
            min_delay_ms: default_min_delay_ms(),
            default_tier: default_tier(),
            tiers: default_tiers(),
        }
    }
}

impl SpeedConfig {
    /// Resolve a tier number to its profile, falling back to the default tier.
    pub fn tier(&self, tier: u8) -> Option<&SpeedTier> {
        self.tiers
            .iter()
            .find(|t| t.tier == tier)
            .or_else(|| self.tiers.iter().find(|t| t.tier == self.default_tier))
    }
}

fn default_variance_pct() -> u32 {
    25
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_tier() -> u8 {
    3
}

fn default_tiers() -> Vec<SpeedTier> {
    vec![
        SpeedTier {
            tier: 1,
            interval_min_ms: 90_000,
            interval_max_ms: 180_000,
            batch_size: 10,
            batch_break_ms: 300_000,
            typing_indicator: true,
        },
        SpeedTier {
            tier: 2,
            interval_min_ms: 30_000,
            interval_max_ms: 60_000,
            batch_size: 20,
            batch_break_ms: 180_000,
            typing_indicator: true,
        },
        SpeedTier {
            tier: 3,
            interval_min_ms: 15_000,
            interval_max_ms: 30_000,
            batch_size: 30,
            batch_break_ms: 120_000,
            typing_indicator: true,
        },
        SpeedTier {
            tier: 4,
            interval_min_ms: 8_000,
            interval_max_ms: 15_000,
            batch_size: 40,
            batch_break_ms: 60_000,
            typing_indicator: false,
        },
        SpeedTier {
            tier: 5,
            interval_min_ms: 3_000,
            interval_max_ms: 8_000,
            batch_size: 50,
            batch_break_ms: 30_000,
            typing_indicator: false,
        },
    ]
}

/// Health monitor sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Interval between sweeps over connected sessions, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Responsiveness probe timeout; timeout counts as unresponsive.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Interval of the secondary silent-death prober, in seconds.
    #[serde(default = "default_silent_probe_interval_secs")]
    pub silent_probe_interval_secs: u64,

    /// Scores below this emit an alert to the notifier.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u8,

    /// Scores below this trigger automatic recovery (disconnect + recreate).
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u8,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            silent_probe_interval_secs: default_silent_probe_interval_secs(),
            alert_threshold: default_alert_threshold(),
            recovery_threshold: default_recovery_threshold(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_silent_probe_interval_secs() -> u64 {
    300
}

fn default_alert_threshold() -> u8 {
    50
}

fn default_recovery_threshold() -> u8 {
    30
}

/// Reconnection backoff policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Attempts before giving up and emitting `session.reconnect_failed`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for the exponential backoff, in seconds.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    /// Cap on the backoff delay, in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the n-th attempt: `min(base * 2^n, cap)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_secs.saturating_mul(1u64 << attempt.min(32));
        Duration::from_secs(base.min(self.max_delay_secs))
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_secs() -> u64 {
    5
}

fn default_max_delay_secs() -> u64 {
    300
}

/// Mobile-conflict pause/resume configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictConfig {
    /// Feature flag. Disabled means mobile activity never pauses campaigns.
    #[serde(default = "default_conflict_enabled")]
    pub enabled: bool,

    /// Device-type families that trigger a pause. The platform's own paired
    /// session traffic is never in this set.
    #[serde(default = "default_trigger_devices")]
    pub trigger_devices: Vec<String>,

    /// Cooldown per speed tier, indexed by tier-1. Higher tiers cool down
    /// faster. Tiers beyond the table use the last entry.
    #[serde(default = "default_tier_cooldown_secs")]
    pub tier_cooldown_secs: Vec<u64>,

    /// Bound on auto-resume rescheduling per pause.
    #[serde(default = "default_max_resume_attempts")]
    pub max_resume_attempts: u32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            enabled: default_conflict_enabled(),
            trigger_devices: default_trigger_devices(),
            tier_cooldown_secs: default_tier_cooldown_secs(),
            max_resume_attempts: default_max_resume_attempts(),
        }
    }
}

impl ConflictConfig {
    /// Cooldown for a campaign's speed tier.
    pub fn cooldown_for_tier(&self, tier: u8) -> Duration {
        let idx = (tier.max(1) as usize - 1).min(self.tier_cooldown_secs.len() - 1);
        Duration::from_secs(self.tier_cooldown_secs[idx])
    }
}

fn default_conflict_enabled() -> bool {
    true
}

fn default_trigger_devices() -> Vec<String> {
    vec!["android".to_string(), "ios".to_string()]
}

fn default_tier_cooldown_secs() -> Vec<u64> {
    vec![60, 45, 30, 20, 20]
}

fn default_max_resume_attempts() -> u32 {
    10
}

/// Memory resource guard thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    /// Memory poll interval, in seconds.
    #[serde(default = "default_guard_poll_secs")]
    pub poll_interval_secs: u64,

    /// System memory usage percentage above which soft cleanup begins.
    #[serde(default = "default_soft_threshold_pct")]
    pub soft_threshold_pct: u8,

    /// Usage percentage above which emergency disconnects happen.
    #[serde(default = "default_emergency_threshold_pct")]
    pub emergency_threshold_pct: u8,

    /// Sessions idle longer than this are dropped during soft cleanup.
    #[serde(default = "default_idle_drop_secs")]
    pub idle_drop_secs: u64,

    /// How many top-consuming sessions to disconnect in an emergency.
    #[serde(default = "default_emergency_disconnects")]
    pub emergency_disconnect_count: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_guard_poll_secs(),
            soft_threshold_pct: default_soft_threshold_pct(),
            emergency_threshold_pct: default_emergency_threshold_pct(),
            idle_drop_secs: default_idle_drop_secs(),
            emergency_disconnect_count: default_emergency_disconnects(),
        }
    }
}

fn default_guard_poll_secs() -> u64 {
    60
}

fn default_soft_threshold_pct() -> u8 {
    80
}

fn default_emergency_threshold_pct() -> u8 {
    90
}

fn default_idle_drop_secs() -> u64 {
    3600
}

fn default_emergency_disconnects() -> usize {
    2
}

/// Stale-session cleanup janitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupConfig {
    /// Sweep interval, in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,

    /// Failed sessions idle longer than this many days are removed.
    #[serde(default = "default_failed_idle_days")]
    pub failed_idle_days: u32,

    /// Disconnected sessions idle longer than this many days are removed.
    #[serde(default = "default_disconnected_idle_days")]
    pub disconnected_idle_days: u32,

    /// Any session idle longer than this many days is removed regardless
    /// of status (live connections are still always skipped).
    #[serde(default = "default_any_idle_days")]
    pub any_idle_days: u32,

    /// Bound on removals per run, to limit blast radius.
    #[serde(default = "default_max_per_run")]
    pub max_per_run: u32,

    /// Log matches without removing anything.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval_secs(),
            failed_idle_days: default_failed_idle_days(),
            disconnected_idle_days: default_disconnected_idle_days(),
            any_idle_days: default_any_idle_days(),
            max_per_run: default_max_per_run(),
            dry_run: false,
        }
    }
}

fn default_cleanup_interval_secs() -> u64 {
    86_400
}

fn default_failed_idle_days() -> u32 {
    1
}

fn default_disconnected_idle_days() -> u32 {
    3
}

fn default_any_idle_days() -> u32 {
    7
}

fn default_max_per_run() -> u32 {
    10
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Whether to run SQLite in WAL mode.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("cadenza/cadenza.db").display().to_string())
        .unwrap_or_else(|| "cadenza.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Control-plane gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for the control-plane API. `None` disables auth.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8321
}
