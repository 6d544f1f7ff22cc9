// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Cadenza orchestrator.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), XDG file hierarchy lookup, environment variable
//! overrides, and aggregated diagnostic rendering.
//!
//! # Usage
//!
//! ```no_run
//! use cadenza_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("global session cap: {}", config.pool.global_max);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::CadenzaConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// This is the high-level entry point that:
/// 1. Loads config from TOML files + env vars via Figment
/// 2. On success: runs post-deserialization validation
/// 3. On Figment error: converts to per-problem diagnostics
///
/// Returns either a valid `CadenzaConfig` or a list of diagnostic errors.
pub fn load_and_validate() -> Result<CadenzaConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err)),
    }
}

/// Load configuration from a specific TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<CadenzaConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_validate_str_accepts_defaults() {
        let config = load_and_validate_str("").unwrap();
        assert_eq!(config.orchestrator.name, "cadenza");
    }

    #[test]
    fn load_and_validate_str_surfaces_validation_errors() {
        let errors = load_and_validate_str(
            r#"
[pool]
global_max = 5
tenant_max = 10
"#,
        )
        .unwrap_err();
        assert!(errors.iter().any(|e| e.message().contains("tenant_max")));
    }

    #[test]
    fn load_and_validate_str_surfaces_parse_errors() {
        let errors = load_and_validate_str(
            r#"
[pool]
global_max = "not a number"
"#,
        )
        .unwrap_err();
        assert!(!errors.is_empty());
    }
}
