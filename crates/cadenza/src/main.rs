// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadenza - multi-tenant chat-session and campaign-pacing orchestrator.
//!
//! This is the binary entry point for the Cadenza daemon.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod loopback;
mod serve;
mod status;

/// Cadenza - multi-tenant chat-session and campaign-pacing orchestrator.
#[derive(Parser, Debug)]
#[command(name = "cadenza", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Cadenza orchestrator daemon.
    Serve,
    /// Show daemon state via the gateway health endpoint.
    Status {
        /// Output structured JSON for scripting.
        #[arg(long)]
        json: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Validate and print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let config = match cadenza_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            cadenza_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        Some(Commands::Config) => run_config(&config),
        None => {
            println!("cadenza: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Print the effective configuration after layered merging, as TOML.
fn run_config(config: &cadenza_config::CadenzaConfig) -> Result<(), cadenza_core::CadenzaError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| cadenza_core::CadenzaError::Config(format!("failed to render config: {e}")))?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn effective_config_renders_as_toml() {
        let config = cadenza_config::CadenzaConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("[pool]"));
        assert!(rendered.contains("global_max = 50"));
    }
}
