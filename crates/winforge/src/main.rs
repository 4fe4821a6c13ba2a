//! Winforge CLI - declarative analyst workstation provisioning
//!
//! This is the main entry point for the winforge command-line interface.

mod cli;
mod commands;
mod output;
mod preflight;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use winforge_engine::WorkstationPaths;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let install_log = WorkstationPaths::discover().map(|paths| paths.install_log);
    init_tracing(cli.verbose, cli.quiet, install_log);

    match cli.command {
        Commands::Provision(args) => commands::provision::run(args).await,
        Commands::Config(args) => commands::config::run(args).await,
        Commands::Version(args) => commands::version::run(args),
    }
}

/// Initialize tracing with a console layer and, when the layout is known,
/// a plain-text file layer appending to the install log
fn init_tracing(verbose: u8, quiet: bool, install_log: Option<PathBuf>) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let console_layer = fmt::layer().with_target(false);

    let file_layer = install_log.and_then(|path| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;

        Some(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(filter)
        .init();
}
