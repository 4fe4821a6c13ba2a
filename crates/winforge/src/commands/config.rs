//! Plan inspection commands

use anyhow::{Context, Result};
use winforge_core::types::Configuration;

use crate::cli::{ConfigCommands, ConfigPathArgs};

pub async fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate(args) => validate(args),
        ConfigCommands::Show(args) => show(args),
    }
}

fn load(args: &ConfigPathArgs) -> Result<Configuration> {
    Configuration::load(args.config.as_deref().map(|path| path.as_std_path()))
        .context("failed to load the provisioning plan")
}

fn validate(args: ConfigPathArgs) -> Result<()> {
    let configuration = load(&args)?;

    let optional_tools: usize = configuration
        .scoop
        .packages
        .values()
        .map(|entries| entries.len())
        .sum();

    println!("Provisioning plan is valid.");
    println!("  buckets:         {}", configuration.scoop.buckets.len());
    println!("  required tools:  {}", configuration.scoop.required.len());
    println!("  optional tools:  {}", optional_tools);
    println!(
        "  registry edits:  {}",
        configuration
            .registry_changes
            .values()
            .map(|changes| changes.len())
            .sum::<usize>()
    );

    Ok(())
}

fn show(args: ConfigPathArgs) -> Result<()> {
    let configuration = load(&args)?;
    println!("{}", serde_json::to_string_pretty(&configuration)?);
    Ok(())
}
