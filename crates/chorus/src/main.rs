// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chorus - a multi-account chat relay service.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod status;

use std::path::PathBuf;

use chorus_config::{ChorusConfig, ConfigError};
use clap::{Parser, Subcommand};

/// Chorus - a multi-account chat relay service.
#[derive(Parser, Debug)]
#[command(name = "chorus", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay in the configured mode until interrupted.
    Serve,
    /// Show accounts, proxies, scripts, and the playback cursor.
    Status,
    /// Validate the configuration and exit.
    CheckConfig,
}

fn load(path: Option<&PathBuf>) -> Result<ChorusConfig, Vec<ConfigError>> {
    match path {
        Some(path) => chorus_config::load_and_validate_path(path),
        None => chorus_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            chorus_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status) => status::run_status(&config).await,
        Some(Commands::CheckConfig) => {
            println!(
                "chorus: config ok (mode={}, database={})",
                config.relay.mode, config.storage.database_path
            );
            Ok(())
        }
        None => {
            println!("chorus: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::parse_from(["chorus", "--config", "relay.toml", "check-config"]);
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
        assert_eq!(cli.config, Some(PathBuf::from("relay.toml")));

        let cli = Cli::parse_from(["chorus", "serve"]);
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert!(cli.config.is_none());
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chorus.toml");
        std::fs::write(
            &path,
            "[relay]\nmode = \"playback\"\ninter_message_delay_secs = 3.0\n",
        )
        .unwrap();

        let config = load(Some(&path)).expect("config should load");
        assert_eq!(config.relay.mode, chorus_core::RelayMode::Playback);
        assert_eq!(config.relay.inter_message_delay_secs, 3.0);
    }

    #[test]
    fn invalid_config_file_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chorus.toml");
        std::fs::write(&path, "[relay]\nmoed = \"playback\"\n").unwrap();
        assert!(!load(Some(&path)).unwrap_err().is_empty());
    }
}
