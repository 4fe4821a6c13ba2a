//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Winforge - declarative analyst workstation provisioning
#[derive(Parser, Debug)]
#[command(name = "winforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output below errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the workstation from the plan
    Provision(ProvisionArgs),

    /// Provisioning plan management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Show version information
    Version(VersionArgs),
}

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Path to a provisioning plan; the embedded default is used otherwise
    #[arg(short, long)]
    pub config: Option<Utf8PathBuf>,

    /// Operator-staged bundle archive with offline payloads
    #[arg(long)]
    pub bundle: Option<Utf8PathBuf>,

    /// Keep the package-manager download cache after the run
    #[arg(long)]
    pub keep_cache: bool,

    /// Skip the final machine restart
    #[arg(long)]
    pub no_restart: bool,

    /// Record the commands that would run without touching the host
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate a provisioning plan
    Validate(ConfigPathArgs),

    /// Print the effective provisioning plan
    Show(ConfigPathArgs),
}

#[derive(Args, Debug)]
pub struct ConfigPathArgs {
    /// Path to a provisioning plan; the embedded default is used otherwise
    #[arg(short, long)]
    pub config: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
