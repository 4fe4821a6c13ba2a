//! The provision command: load the plan, check the host, run the pipeline

use std::sync::Arc;

use anyhow::{Context, Result};
use winforge_core::types::Configuration;
use winforge_engine::environment::EnvironmentReconciler;
use winforge_engine::process::ProcessRunner;
use winforge_engine::registry::RegistryStore;
use winforge_engine::{
    platform_registry, CommandExecutor, ErrorLog, MemoryRegistry, ProgressSink, ProvisionOptions,
    Provisioner, RecordingRunner, SystemRunner, WorkstationPaths,
};

use crate::cli::ProvisionArgs;
use crate::output::ConsoleSink;
use crate::preflight;

pub async fn run(args: ProvisionArgs) -> Result<()> {
    let configuration = Configuration::load(args.config.as_deref().map(|path| path.as_std_path()))
        .context("failed to load the provisioning plan")?;

    let paths = WorkstationPaths::discover()
        .context("could not determine the user profile directory")?;

    // Dry runs record commands and write into an in-memory registry;
    // nothing on the host changes.
    let recorder: Option<Arc<RecordingRunner>> = if args.dry_run {
        Some(Arc::new(RecordingRunner::new()))
    } else {
        None
    };

    let runner: Arc<dyn ProcessRunner> = match &recorder {
        Some(recorder) => recorder.clone(),
        None => Arc::new(SystemRunner),
    };

    let registry: Arc<dyn RegistryStore> = if args.dry_run {
        Arc::new(MemoryRegistry::new())
    } else {
        platform_registry()
    };

    let reconciler = Arc::new(EnvironmentReconciler::new(registry.clone()));
    let executor = CommandExecutor::new(runner, ErrorLog::new(paths.error_log.clone()))
        .with_refresher(reconciler);

    let sink: Arc<dyn ProgressSink> = Arc::new(ConsoleSink::new(args.yes || args.dry_run));

    if !args.dry_run {
        preflight::check_host(&executor, sink.as_ref()).await?;
    }

    let options = ProvisionOptions {
        keep_cache: args.keep_cache,
        restart: !args.no_restart && !args.dry_run,
        bundle: args.bundle.map(|path| path.into_std_path_buf()),
    };

    let error_log_path = paths.error_log.clone();
    let provisioner = Provisioner::new(configuration, options, executor, registry, sink, paths);

    provisioner.run().await?;

    if let Some(recorder) = &recorder {
        println!("\nDry run - commands that would have been executed:");
        for command in recorder.commands() {
            println!("  {}", command);
        }
    } else {
        println!(
            "\nProvisioning finished. Review {} for any soft failures.",
            error_log_path.display()
        );
    }

    Ok(())
}
