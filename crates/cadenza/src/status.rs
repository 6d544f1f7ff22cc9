// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cadenza status` command implementation.
//!
//! Connects to the gateway health endpoint to display daemon state and
//! uptime. Falls back gracefully when the daemon is not running.

use std::io::IsTerminal;
use std::time::Duration;

use cadenza_config::model::CadenzaConfig;
use cadenza_core::CadenzaError;
use serde::{Deserialize, Serialize};

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub gateway_host: String,
    pub gateway_port: u16,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Run the `cadenza status` command.
///
/// Connects to the health endpoint on the gateway and displays daemon state.
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(
    config: &CadenzaConfig,
    json: bool,
    plain: bool,
) -> Result<(), CadenzaError> {
    let host = &config.gateway.host;
    let port = config.gateway.port;
    let url = format!("http://{host}:{port}/health");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| CadenzaError::Internal(format!("failed to create HTTP client: {e}")))?;

    let result = client.get(&url).send().await;

    match result {
        Ok(resp) if resp.status().is_success() => {
            let health: HealthResponse = resp.json().await.map_err(|e| {
                CadenzaError::Internal(format!("failed to parse health response: {e}"))
            })?;

            let uptime_human = format_uptime(health.uptime_secs);

            if json {
                let status_resp = StatusResponse {
                    running: true,
                    status: health.status.clone(),
                    version: Some(health.version.clone()),
                    uptime_secs: Some(health.uptime_secs),
                    uptime_human: Some(uptime_human),
                    gateway_host: host.clone(),
                    gateway_port: port,
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status_resp)
                        .unwrap_or_else(|_| "{}".to_string())
                );
            } else {
                let use_color = !plain && std::io::stdout().is_terminal();
                print_status_running(&health.status, &health.version, &uptime_human, use_color);
            }
        }
        _ => {
            if json {
                let status_resp = StatusResponse {
                    running: false,
                    status: "not running".to_string(),
                    version: None,
                    uptime_secs: None,
                    uptime_human: None,
                    gateway_host: host.clone(),
                    gateway_port: port,
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status_resp)
                        .unwrap_or_else(|_| "{}".to_string())
                );
            } else {
                let use_color = !plain && std::io::stdout().is_terminal();
                print_status_offline(host, port, use_color);
            }
        }
    }

    Ok(())
}

/// Print running status with optional colors.
fn print_status_running(status: &str, version: &str, uptime: &str, use_color: bool) {
    println!();
    println!("  cadenza status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        println!(
            "    State:    {} {} v{} (uptime: {})",
            "✓".green(),
            status.green(),
            version,
            uptime
        );
    } else {
        println!("    State:    [OK] {status} v{version} (uptime: {uptime})");
    }
    println!();
}

/// Print offline status with optional colors.
fn print_status_offline(host: &str, port: u16, use_color: bool) {
    println!();
    println!("  cadenza status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        println!("    State:    {} not running", "✗".red());
    } else {
        println!("    State:    [--] not running");
    }
    println!("    Gateway:  http://{host}:{port}/health unreachable");
    println!("    Hint:     start the daemon with `cadenza serve`");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_scale_with_magnitude() {
        assert_eq!(format_uptime(59), "0m");
        assert_eq!(format_uptime(61), "1m");
        assert_eq!(format_uptime(3_700), "1h 1m");
        assert_eq!(format_uptime(90_061), "1d 1h 1m");
    }

    #[test]
    fn health_response_parses_gateway_payload() {
        let payload = r#"{"status":"ok","version":"0.1.0","uptime_secs":42}"#;
        let health: HealthResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.version, "0.1.0");
        assert_eq!(health.uptime_secs, 42);
    }

    #[tokio::test]
    async fn status_reports_offline_when_gateway_is_down() {
        let mut config = CadenzaConfig::default();
        config.gateway.port = 1; // nothing listens here
        let result = run_status(&config, true, true).await;
        assert!(result.is_ok());
    }
}
