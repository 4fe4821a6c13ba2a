//! # winforge-engine
//!
//! Provisioning engine for the Winforge CLI:
//! - Command execution with bounded retry and persistent failure logs
//! - Environment reconciliation from the registry into the running process
//! - Bucket registration with verify-and-repair semantics
//! - Bundled-artifact installation through the package manager
//! - Execution-restriction policy construction
//! - The fixed, failure-isolated provisioning pipeline

pub mod archive;
pub mod associations;
pub mod buckets;
pub mod bundled;
pub mod cleanup;
pub mod environment;
pub mod errlog;
pub mod error;
pub mod events;
pub mod exec;
pub mod fixups;
pub mod git;
pub mod misc;
pub mod packages;
pub mod paths;
pub mod pipeline;
pub mod process;
pub mod registry;
pub mod safer;
pub mod scoop;
pub mod taskbar;

pub use errlog::ErrorLog;
pub use error::{EngineError, Result};
pub use events::{CollectingSink, NullSink, ProgressSink, TracingSink};
pub use exec::{CommandExecutor, CommandSpec, CompletedRun, RunOptions};
pub use paths::WorkstationPaths;
pub use pipeline::{ProvisionOptions, Provisioner};
pub use process::{ProcessRunner, RecordingRunner, SystemRunner};
pub use registry::{platform_registry, MemoryRegistry, RegistryStore, RegistryValue};
