//! Scoop package manager driver
//!
//! Installs the manager itself, its prerequisites, and the configured tool
//! set. Package ids ending in `.json` route through the bundled-artifact
//! installer; primary/alternative pairs fall back on failure. Individual
//! package failures are reported and logged but never stop the run.

use winforge_core::types::{PackageEntry, PackageReference};

use crate::bundled::BundledArtifactInstaller;
use crate::error::Result;
use crate::events::ProgressSink;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::paths::WorkstationPaths;

/// Drives the Scoop package manager
pub struct ScoopManager<'a> {
    executor: &'a CommandExecutor,
    paths: &'a WorkstationPaths,
    sink: &'a dyn ProgressSink,
    keep_cache: bool,
}

impl<'a> ScoopManager<'a> {
    pub fn new(
        executor: &'a CommandExecutor,
        paths: &'a WorkstationPaths,
        sink: &'a dyn ProgressSink,
        keep_cache: bool,
    ) -> Self {
        Self {
            executor,
            paths,
            sink,
            keep_cache,
        }
    }

    /// Install Scoop itself, unless already present
    ///
    /// Refreshes the process environment afterwards so the freshly written
    /// shims directory is visible to every later command.
    pub async fn install_scoop(&self) -> Result<()> {
        if which::which("scoop").is_ok() || which::which("scoop.cmd").is_ok() {
            tracing::info!("Scoop is already installed");
            self.sink.info("Scoop is already installed");
            return Ok(());
        }

        let script = [
            "Set-ExecutionPolicy -ExecutionPolicy RemoteSigned -Scope CurrentUser -Force",
            "Invoke-RestMethod -Uri https://get.scoop.sh -OutFile $env:TEMP\\install_scoop.ps1",
            "& $env:TEMP\\install_scoop.ps1 -RunAsAdmin",
        ]
        .join("\n");

        self.executor
            .run(
                &CommandSpec::script(script),
                RunOptions::default().with_refresh(),
            )
            .await?;

        self.sink.success("Installed Scoop");
        Ok(())
    }

    /// Install git, required for bucket management before anything else
    pub async fn install_git(&self) -> Result<()> {
        self.executor
            .run(
                &CommandSpec::shell("scoop install git"),
                RunOptions::default().with_refresh(),
            )
            .await?;

        self.sink.success("Installed Git");
        Ok(())
    }

    /// Install PowerShell Core
    pub async fn install_pwsh(&self) -> Result<()> {
        self.executor
            .run(&CommandSpec::shell("scoop install pwsh"), RunOptions::default())
            .await?;

        self.sink.success("Installed PowerShell 7");
        Ok(())
    }

    /// Install the download accelerator first so later installs can use the
    /// pre-seeded cache, and silence its advisory warning
    pub async fn prepare_download_accelerator(&self) -> Result<()> {
        self.executor
            .run(&CommandSpec::shell("scoop install aria2"), RunOptions::default())
            .await?;
        self.executor
            .run(
                &CommandSpec::shell("scoop config aria2-warning-enabled false"),
                RunOptions::tolerant(),
            )
            .await?;
        Ok(())
    }

    /// Install the required tool list
    pub async fn install_required(&self, entries: &[PackageEntry]) -> Result<()> {
        for entry in entries {
            self.install_entry(entry).await?;
        }
        Ok(())
    }

    /// Install every optional category, in file order
    pub async fn install_categories(
        &self,
        categories: &indexmap::IndexMap<String, Vec<PackageEntry>>,
    ) -> Result<()> {
        for (category, entries) in categories {
            tracing::info!(category = %category, "installing package category");
            for entry in entries {
                self.install_entry(entry).await?;
            }
        }
        Ok(())
    }

    /// Install one entry, falling back to the alternative on failure
    ///
    /// Both attempts are reported independently; a pair where both fail is
    /// a soft outcome recorded in the error log.
    pub async fn install_entry(&self, entry: &PackageEntry) -> Result<()> {
        let primary = entry.primary();

        if self.install_package(primary).await? {
            self.sink
                .success(&format!("Installed {}", primary.display_name()));
            return Ok(());
        }

        let Some(alternative) = entry.alternative() else {
            self.sink
                .warning(&format!("Failed to install {}", primary.display_name()));
            return Ok(());
        };

        tracing::warn!(
            primary = %primary.id,
            alternative = %alternative.id,
            "primary install failed, attempting alternative"
        );
        self.sink.warning(&format!(
            "Failed to install {}, trying {}",
            primary.display_name(),
            alternative.display_name()
        ));

        if self.install_package(alternative).await? {
            self.sink
                .success(&format!("Installed {}", alternative.display_name()));
        } else {
            self.sink.warning(&format!(
                "Failed to install {}",
                alternative.display_name()
            ));
        }

        Ok(())
    }

    /// Install a single package through the standard path
    ///
    /// Ids ending in `.json` install from a staged bundle. Returns whether
    /// the install succeeded; failures are already in the error log.
    pub async fn install_package(&self, reference: &PackageReference) -> Result<bool> {
        tracing::info!(package = %reference.id, "installing package");

        if let Some(app_id) = reference.id.strip_suffix(".json") {
            let installer = BundledArtifactInstaller::new(self.executor, self.paths);
            return installer.install(app_id).await;
        }

        let run = self
            .executor
            .run(
                &CommandSpec::shell(format!("scoop install {}", reference.id)),
                RunOptions::tolerant(),
            )
            .await?;

        if run.succeeded {
            self.post_install(reference).await?;
        }

        Ok(run.succeeded)
    }

    /// Per-tool post-install: shipped registry fragments and cache removal
    async fn post_install(&self, reference: &PackageReference) -> Result<()> {
        // Bucket-qualified ids install under their bare name.
        let name = reference
            .id
            .rsplit('/')
            .next()
            .unwrap_or(reference.id.as_str());

        let tool_dir = self.paths.app_current(name);
        for fragment in ["install-context.reg", "install-file-associations.reg"] {
            let fragment_path = tool_dir.join(fragment);
            if fragment_path.is_file() {
                self.executor
                    .run(
                        &CommandSpec::argv([
                            "regedit".to_string(),
                            "/s".to_string(),
                            fragment_path.display().to_string(),
                        ]),
                        RunOptions::tolerant(),
                    )
                    .await?;
            }
        }

        if !self.keep_cache {
            self.executor
                .run(
                    &CommandSpec::shell(format!("scoop cache rm {}", name)),
                    RunOptions::tolerant(),
                )
                .await?;
        }

        Ok(())
    }
}
