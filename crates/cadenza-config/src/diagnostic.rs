// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostic error types for configuration loading and validation.
//!
//! Figment parse errors and post-deserialization validation failures are
//! normalized into [`ConfigError`] so the binary can render them all at once
//! instead of failing on the first problem.

use thiserror::Error;

/// A single configuration problem, suitable for direct display.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML/env sources failed to parse or merge.
    #[error("config parse error: {message}")]
    Parse { message: String },

    /// The parsed config violated a semantic constraint.
    #[error("config validation error: {message}")]
    Validation { message: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }

    /// The underlying message, regardless of variant.
    pub fn message(&self) -> &str {
        match self {
            ConfigError::Parse { message } | ConfigError::Validation { message } => message,
        }
    }
}

/// Convert a figment error (which may aggregate several failures) into
/// one `ConfigError` per underlying problem.
pub fn figment_to_config_errors(err: figment::Error) -> Vec<ConfigError> {
    err.into_iter()
        .map(|e| ConfigError::Parse {
            message: e.to_string(),
        })
        .collect()
}

/// Render all collected errors to stderr, one per line.
pub fn render_errors(errors: &[ConfigError]) {
    for error in errors {
        eprintln!("cadenza: {error}");
    }
    eprintln!(
        "cadenza: {} configuration error{} found",
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
}
