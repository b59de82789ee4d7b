// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Marquee - durable message stores for a signage and paging appliance.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod doctor;
mod serve;
mod shutdown;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use marquee_config::MarqueeConfig;

/// Marquee - durable message stores for a signage and paging appliance.
#[derive(Parser, Debug)]
#[command(name = "marquee", version, about, long_about = None)]
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
    /// Run the stores and the periodic retention sweep until interrupted.
    Serve,
    /// Ingest one JSON payload from FILE (or stdin).
    Ingest {
        /// Payload file; reads stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Print records as JSON lines.
    List {
        /// Which store to list.
        #[arg(value_enum)]
        store: StoreKind,
        /// Only records with this status (e.g. `New`, `CopiedToRAM`).
        #[arg(long)]
        status: Option<String>,
        /// Only ingest records whose payload contains TEXT.
        #[arg(long, value_name = "TEXT")]
        containing: Option<String>,
    },
    /// Show record counts per status for both stores.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Apply the retention rules once and print what was removed.
    Sweep,
    /// Run database diagnostics.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StoreKind {
    Ingest,
    Working,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => marquee_config::load_and_validate_path(path),
        None => marquee_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            marquee_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Ingest { file }) => {
            init_tracing(&config);
            commands::run_ingest(&config, file.as_deref()).await
        }
        Some(Commands::List {
            store,
            status,
            containing,
        }) => {
            init_tracing(&config);
            commands::run_list(&config, store, status.as_deref(), containing.as_deref()).await
        }
        Some(Commands::Status { json, plain }) => {
            init_tracing(&config);
            status::run_status(&config, json, plain).await
        }
        Some(Commands::Sweep) => {
            init_tracing(&config);
            commands::run_sweep(&config).await
        }
        Some(Commands::Doctor { plain }) => doctor::run_doctor(&config, plain).await,
        None => {
            println!("marquee: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Install the fmt subscriber. `RUST_LOG` overrides the configured level.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(config: &MarqueeConfig) {
    use tracing_subscriber::EnvFilter;

    let log_level = &config.daemon.log_level;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("marquee={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
