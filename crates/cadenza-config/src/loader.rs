// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./cadenza.toml` > `~/.config/cadenza/cadenza.toml`
//! > `/etc/cadenza/cadenza.toml` with environment variable overrides via the
//! `CADENZA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CadenzaConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/cadenza/cadenza.toml` (system-wide)
/// 3. `~/.config/cadenza/cadenza.toml` (user XDG config)
/// 4. `./cadenza.toml` (local directory)
/// 5. `CADENZA_*` environment variables
pub fn load_config() -> Result<CadenzaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CadenzaConfig::default()))
        .merge(Toml::file("/etc/cadenza/cadenza.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("cadenza/cadenza.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("cadenza.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<CadenzaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CadenzaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CadenzaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CadenzaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CADENZA_RATE_LIMIT_PER_MINUTE` must map
/// to `rate_limit.per_minute`, not `rate.limit.per.minute`.
fn env_provider() -> Env {
    Env::prefixed("CADENZA_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("orchestrator_", "orchestrator.", 1)
            .replacen("pool_", "pool.", 1)
            .replacen("qr_", "qr.", 1)
            .replacen("rate_limit_", "rate_limit.", 1)
            .replacen("risk_", "risk.", 1)
            .replacen("speed_", "speed.", 1)
            .replacen("health_", "health.", 1)
            .replacen("reconnect_", "reconnect.", 1)
            .replacen("conflict_", "conflict.", 1)
            .replacen("guard_", "guard.", 1)
            .replacen("cleanup_", "cleanup.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1)
            .to_string();
        mapped.into()
    })
}
