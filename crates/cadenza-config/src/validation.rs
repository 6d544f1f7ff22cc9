// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as ordered thresholds, non-empty tier tables, and
//! well-formed bind addresses.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::CadenzaConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CadenzaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.pool.global_max == 0 {
        errors.push(ConfigError::validation("pool.global_max must be at least 1"));
    }
    if config.pool.tenant_max == 0 {
        errors.push(ConfigError::validation("pool.tenant_max must be at least 1"));
    }
    if config.pool.tenant_max > config.pool.global_max {
        errors.push(ConfigError::validation(format!(
            "pool.tenant_max ({}) must not exceed pool.global_max ({})",
            config.pool.tenant_max, config.pool.global_max
        )));
    }

    if config.rate_limit.per_minute == 0 || config.rate_limit.per_hour == 0 {
        errors.push(ConfigError::validation(
            "rate_limit.per_minute and rate_limit.per_hour must be at least 1",
        ));
    }
    let weight_sum = config.risk.hourly_weight
        + config.risk.minute_weight
        + config.risk.recipient_weight
        + config.risk.broadcast_weight;
    if weight_sum != 100 {
        errors.push(ConfigError::validation(format!(
            "risk weights must sum to 100, got {weight_sum}"
        )));
    }
    if config.risk.pause_threshold > 100 {
        errors.push(ConfigError::validation(format!(
            "risk.pause_threshold must be 0-100, got {}",
            config.risk.pause_threshold
        )));
    }

    if config.speed.tiers.is_empty() {
        errors.push(ConfigError::validation("speed.tiers must not be empty"));
    }
    let mut seen_tiers = HashSet::new();
    for tier in &config.speed.tiers {
        if !seen_tiers.insert(tier.tier) {
            errors.push(ConfigError::validation(format!(
                "duplicate speed tier {} in speed.tiers",
                tier.tier
            )));
        }
        if tier.interval_min_ms > tier.interval_max_ms {
            errors.push(ConfigError::validation(format!(
                "speed tier {}: interval_min_ms ({}) exceeds interval_max_ms ({})",
                tier.tier, tier.interval_min_ms, tier.interval_max_ms
            )));
        }
        if tier.batch_size == 0 {
            errors.push(ConfigError::validation(format!(
                "speed tier {}: batch_size must be at least 1",
                tier.tier
            )));
        }
    }
    if !config.speed.tiers.is_empty()
        && !seen_tiers.contains(&config.speed.default_tier)
    {
        errors.push(ConfigError::validation(format!(
            "speed.default_tier {} is not present in speed.tiers",
            config.speed.default_tier
        )));
    }

    if config.health.recovery_threshold >= config.health.alert_threshold {
        errors.push(ConfigError::validation(format!(
            "health.recovery_threshold ({}) must be below health.alert_threshold ({})",
            config.health.recovery_threshold, config.health.alert_threshold
        )));
    }

    if config.guard.soft_threshold_pct >= config.guard.emergency_threshold_pct {
        errors.push(ConfigError::validation(format!(
            "guard.soft_threshold_pct ({}) must be below guard.emergency_threshold_pct ({})",
            config.guard.soft_threshold_pct, config.guard.emergency_threshold_pct
        )));
    }
    if config.guard.emergency_threshold_pct > 100 {
        errors.push(ConfigError::validation(format!(
            "guard.emergency_threshold_pct must be 0-100, got {}",
            config.guard.emergency_threshold_pct
        )));
    }

    if config.conflict.tier_cooldown_secs.is_empty() {
        errors.push(ConfigError::validation(
            "conflict.tier_cooldown_secs must not be empty",
        ));
    }
    if config.conflict.max_resume_attempts == 0 {
        errors.push(ConfigError::validation(
            "conflict.max_resume_attempts must be at least 1",
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("gateway.host must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::validation(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = CadenzaConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn tenant_cap_above_global_cap_fails() {
        let mut config = CadenzaConfig::default();
        config.pool.tenant_max = 60;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message().contains("tenant_max")));
    }

    #[test]
    fn risk_weights_must_sum_to_hundred() {
        let mut config = CadenzaConfig::default();
        config.risk.hourly_weight = 50;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message().contains("sum to 100")));
    }

    #[test]
    fn inverted_speed_interval_fails() {
        let mut config = CadenzaConfig::default();
        config.speed.tiers[0].interval_min_ms = 10_000;
        config.speed.tiers[0].interval_max_ms = 5_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message().contains("interval_min_ms")));
    }

    #[test]
    fn duplicate_speed_tier_fails() {
        let mut config = CadenzaConfig::default();
        config.speed.tiers[1].tier = 1;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message().contains("duplicate speed tier")));
    }

    #[test]
    fn inverted_guard_thresholds_fail() {
        let mut config = CadenzaConfig::default();
        config.guard.soft_threshold_pct = 95;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message().contains("soft_threshold_pct")));
    }

    #[test]
    fn empty_database_path_fails() {
        let mut config = CadenzaConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message().contains("database_path")));
    }
}
