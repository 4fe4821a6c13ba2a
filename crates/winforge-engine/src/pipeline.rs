//! Provisioning pipeline
//!
//! The step order is fixed and non-configurable: several steps have
//! implicit ordering dependencies (the package manager must exist before
//! anything installs through it; registry changes that affect network
//! behavior apply before the downloads they influence). Steps run strictly
//! sequentially on one task: package managers, the registry, and shared
//! cache directories are not safe for concurrent mutation.
//!
//! Every step is individually wrapped: a failure inside one step is logged
//! with the step's name and does not abort the rest of the run. The two
//! exceptions are bucket registration (fatal, see the registrar) and
//! configuration construction, which happens before the pipeline starts.
//! Completion is reported to the sink after each step's nominal end, not
//! its internal success; the error log holds the authoritative failures.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use winforge_core::types::Configuration;

use crate::associations::AssociationWriter;
use crate::buckets::BucketRegistrar;
use crate::cleanup::DiskCleaner;
use crate::environment::extend_path;
use crate::errlog::ErrorLog;
use crate::error::Result;
use crate::events::ProgressSink;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::fixups::ToolFixups;
use crate::git::GitManager;
use crate::misc::MiscFileInstaller;
use crate::packages::EcosystemInstaller;
use crate::paths::WorkstationPaths;
use crate::registry::{RegistryEditor, RegistryStore};
use crate::safer::SaferPolicyBuilder;
use crate::scoop::ScoopManager;
use crate::taskbar::TaskbarConfigurator;

/// Scalar options from the command line, separate from the plan itself
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Keep the package-manager download cache after the run
    pub keep_cache: bool,

    /// Restart the machine once provisioning finishes
    pub restart: bool,

    /// Operator-staged bundle archive to unpack before installation
    pub bundle: Option<PathBuf>,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            keep_cache: false,
            restart: true,
            bundle: None,
        }
    }
}

/// Runs the fixed provisioning sequence against one host
pub struct Provisioner {
    configuration: Configuration,
    options: ProvisionOptions,
    executor: CommandExecutor,
    registry: Arc<dyn RegistryStore>,
    sink: Arc<dyn ProgressSink>,
    paths: WorkstationPaths,
    error_log: ErrorLog,
}

impl Provisioner {
    pub fn new(
        configuration: Configuration,
        options: ProvisionOptions,
        executor: CommandExecutor,
        registry: Arc<dyn RegistryStore>,
        sink: Arc<dyn ProgressSink>,
        paths: WorkstationPaths,
    ) -> Self {
        let error_log = executor.error_log().clone();

        Self {
            configuration,
            options,
            executor,
            registry,
            sink,
            paths,
            error_log,
        }
    }

    /// Execute the full provisioning sequence
    pub async fn run(&self) -> Result<()> {
        if !self.sink.confirm("Provision this workstation?") {
            tracing::info!("provisioning declined by operator");
            return Ok(());
        }

        tracing::info!("provisioning started");

        self.step("pre-install hooks", self.pre_install_hooks()).await?;
        self.step("stage artifacts", self.stage_artifacts()).await?;
        self.step("install package manager", self.install_package_manager())
            .await?;
        self.step("registry changes", self.apply_registry_changes())
            .await?;
        self.step("repositories and required tooling", self.install_required_tooling())
            .await?;
        self.step("extend PATH", self.patch_toolchain_path()).await?;
        self.step("optional packages", self.install_optional_packages())
            .await?;
        self.step("tool fixups", self.apply_tool_fixups()).await?;
        self.step("conditional features", self.apply_conditional_features())
            .await?;
        self.step("post-install hooks", self.post_install_hooks())
            .await?;
        self.step("disk cleanup", self.cleanup_disk()).await?;
        self.step("normalize install log", self.normalize_install_log())
            .await?;

        if self.options.restart {
            self.step("restart", self.restart()).await?;
        }

        tracing::info!("provisioning finished");
        Ok(())
    }

    /// Run one step with failure isolation
    ///
    /// Soft errors are appended to the error log and the step is still
    /// reported complete; fatal errors abort the run after surfacing.
    async fn step<F>(&self, name: &str, operation: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        tracing::info!(step = name, "starting step");

        match operation.await {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                self.error_log.append(name, &err.to_string());
                self.sink.error(&format!("{}: {}", name, err));
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(step = name, error = %err, "step failed, continuing");
                self.error_log.append(name, &err.to_string());
            }
        }

        self.sink.step_completed(name);
        Ok(())
    }

    // Component constructors; each borrows the run's shared services.

    fn scoop(&self) -> ScoopManager<'_> {
        ScoopManager::new(
            &self.executor,
            &self.paths,
            self.sink.as_ref(),
            self.options.keep_cache,
        )
    }

    fn ecosystem(&self) -> EcosystemInstaller<'_> {
        EcosystemInstaller::new(&self.executor, &self.paths, self.sink.as_ref())
    }

    fn fixups(&self) -> ToolFixups<'_> {
        ToolFixups::new(
            &self.executor,
            self.registry.clone(),
            &self.paths,
            self.sink.as_ref(),
        )
    }

    fn taskbar(&self) -> TaskbarConfigurator<'_> {
        TaskbarConfigurator::new(&self.executor, &self.paths, self.sink.as_ref())
    }

    fn git(&self) -> GitManager<'_> {
        GitManager::new(&self.executor, &self.paths, self.sink.as_ref())
    }

    fn misc(&self) -> MiscFileInstaller<'_> {
        MiscFileInstaller::new(&self.executor, &self.paths, self.sink.as_ref())
    }

    fn cleaner(&self) -> DiskCleaner<'_> {
        DiskCleaner::new(&self.paths, self.sink.as_ref(), self.options.keep_cache)
    }

    // Steps, in pipeline order.

    async fn pre_install_hooks(&self) -> Result<()> {
        self.fixups().keep_host_awake().await?;
        self.ecosystem().remove_python_app_aliases().await?;
        Ok(())
    }

    async fn stage_artifacts(&self) -> Result<()> {
        self.cleaner().remove_stale_shims()?;

        let misc = self.misc();
        misc.extract_staged_bundle(self.options.bundle.as_deref())?;
        misc.extract_package_cache()?;
        Ok(())
    }

    async fn install_package_manager(&self) -> Result<()> {
        let scoop = self.scoop();
        scoop.install_scoop().await?;
        scoop.install_git().await?;
        scoop.install_pwsh().await?;
        Ok(())
    }

    async fn apply_registry_changes(&self) -> Result<()> {
        let editor = RegistryEditor::new(self.registry.clone(), self.error_log.clone());
        editor.apply_changes(&self.configuration.registry_changes);
        Ok(())
    }

    async fn install_required_tooling(&self) -> Result<()> {
        let registrar = BucketRegistrar::new(&self.executor, &self.paths, self.sink.as_ref());
        registrar
            .register_all(&self.configuration.scoop.buckets)
            .await?;

        let scoop = self.scoop();
        scoop.prepare_download_accelerator().await?;
        scoop
            .install_required(&self.configuration.scoop.required)
            .await?;

        self.ecosystem()
            .install_pip(&self.configuration.pip.required)
            .await?;

        Ok(())
    }

    async fn patch_toolchain_path(&self) -> Result<()> {
        let mut candidates = vec![self.paths.scoop_shims_dir()];

        // Interpreter script directories are versioned; take whatever the
        // just-installed prerequisite provides.
        let scripts_pattern = format!(
            "{}/python*/current/Scripts",
            self.paths.apps_dir().display()
        );
        if let Some(scripts) = winforge_core::utils::resolve_path(&scripts_pattern) {
            candidates.push(scripts);
        }

        candidates.push(self.paths.app_current("nodejs"));
        candidates.push(self.paths.app_current("git").join("cmd"));

        let existing: Vec<_> = candidates
            .into_iter()
            .filter(|candidate| candidate.is_dir())
            .collect();

        extend_path(&self.executor, &existing).await?;
        Ok(())
    }

    async fn install_optional_packages(&self) -> Result<()> {
        self.scoop()
            .install_categories(&self.configuration.scoop.packages)
            .await?;

        let ecosystem = self.ecosystem();
        ecosystem
            .install_pip(&self.configuration.pip.packages)
            .await?;
        ecosystem
            .install_npm(&self.configuration.npm.packages)
            .await?;
        ecosystem
            .install_disassembler_plugins(&self.configuration.ida_plugins)
            .await?;
        ecosystem
            .install_editor_extensions(&self.configuration.vscode_extensions)
            .await?;

        let associations = AssociationWriter::new(
            &self.executor,
            self.registry.clone(),
            &self.paths,
            self.sink.as_ref(),
        );
        associations
            .apply(&self.configuration.file_type_associations)
            .await?;

        self.taskbar().pin_apps(&self.configuration.taskbar_pins)?;

        self.git()
            .clone_repositories(&self.configuration.git_repositories)
            .await?;

        self.misc()
            .install_groups(&self.configuration.misc_files)
            .await?;

        Ok(())
    }

    async fn apply_tool_fixups(&self) -> Result<()> {
        let fixups = self.fixups();

        fixups
            .rebind_disassembler_python(&self.configuration.settings.python_dll)
            .await?;

        if self.configuration.settings.make_bindiff_available {
            fixups.wire_binary_diff()?;
        }

        Ok(())
    }

    async fn apply_conditional_features(&self) -> Result<()> {
        if self.configuration.settings.install_zsh_over_git {
            self.fixups().install_zsh_over_git().await?;
        }

        if self.configuration.settings.enable_safer {
            let builder = SaferPolicyBuilder::new(self.registry.clone(), self.sink.as_ref());
            builder.enable_execution_restriction_policy()?;

            for folder in &self.configuration.settings.quarantine_folders {
                builder.register_quarantine_path(folder)?;
            }
        }

        Ok(())
    }

    async fn post_install_hooks(&self) -> Result<()> {
        let taskbar = self.taskbar();
        taskbar.prepare_quick_access().await?;
        taskbar.remove_pin("Microsoft Store").await?;
        taskbar.remove_pin("Microsoft Edge").await?;

        self.git().mark_buckets_safe().await?;
        self.fixups().enable_legacy_dotnet().await?;

        Ok(())
    }

    async fn cleanup_disk(&self) -> Result<()> {
        self.cleaner().clean_disk()
    }

    async fn normalize_install_log(&self) -> Result<()> {
        self.cleaner().normalize_install_log()
    }

    async fn restart(&self) -> Result<()> {
        self.executor
            .run(
                &CommandSpec::script("Restart-Computer"),
                RunOptions::tolerant(),
            )
            .await?;
        Ok(())
    }
}
