// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! berthd, the single-host coordination daemon.
//!
//! Gives every logical service a stable TCP port, mediates mutual
//! exclusion between cooperating processes, carries pub/sub traffic, and
//! tracks agent liveness so crashed actors do not leak state.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod serve;
mod shutdown;
mod status;

/// berthd, the single-host coordination daemon.
#[derive(Parser, Debug)]
#[command(name = "berthd", version, about, long_about = None)]
struct Cli {
    /// Path to a berthd.toml, overriding the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the daemon.
    Serve,
    /// Probe a running daemon's /health endpoint.
    Status,
    /// Print the effective configuration.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<berth_config::BerthConfig, String> {
    let result = match path {
        Some(path) => berth_config::load_config_from_path(path),
        None => berth_config::load_config(),
    };
    result.map_err(|e| format!("configuration error: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Status => status::run_status(&config).await,
        Commands::Config => {
            match serde_json::to_string_pretty(&config) {
                Ok(rendered) => {
                    println!("{rendered}");
                    Ok(())
                }
                Err(e) => Err(berth_core::BerthError::Internal(e.to_string())),
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
