// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - messaging gateway.
//!
//! Binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use courier::serve::run_serve;
use courier::status::run_status;
use courier_config::model::CourierConfig;
use courier_core::CourierError;

/// Courier - durable outbound messaging with paced campaigns and signed notifications.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway until SIGINT or SIGTERM.
    Serve,
    /// Show queue, campaign and target state from the database.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration.
    Config {
        /// Only validate; print nothing on success.
        #[arg(long)]
        check: bool,
    },
}

fn load(path: Option<&PathBuf>) -> CourierConfig {
    let loaded = match path {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn print_config(config: &CourierConfig, check: bool) -> Result<(), CourierError> {
    if check {
        return Ok(());
    }
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| CourierError::Config(format!("failed to render configuration: {e}")))?;
    print!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => run_serve(config).await,
        Some(Commands::Status { json, plain }) => run_status(&config, json, plain).await,
        Some(Commands::Config { check }) => print_config(&config, check),
        None => {
            println!("courier: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("courier: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_parses_status_flags() {
        let cli = Cli::try_parse_from(["courier", "status", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Status { json: true, plain: false })
        ));
    }

    #[test]
    fn default_config_renders_as_toml() {
        let config = courier_config::load_and_validate_str("").unwrap();
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("[queue.direct]"));
        assert!(courier_config::load_and_validate_str(&rendered).is_ok());
        assert!(print_config(&config, true).is_ok());
    }
}
