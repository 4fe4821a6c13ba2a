//! Subcommand implementations

pub mod config;
pub mod provision;
pub mod version;
