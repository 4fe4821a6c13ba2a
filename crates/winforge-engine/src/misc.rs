//! Miscellaneous file placement and pre-staged artifact extraction
//!
//! Fetches are funneled through the command executor (curl) like every
//! other host mutation; archives among the fetched artifacts are expanded
//! in place.

use std::path::Path;

use indexmap::IndexMap;
use winforge_core::types::MiscFileGroup;
use winforge_core::utils::resolve_path;

use crate::archive::extract_zip;
use crate::error::Result;
use crate::events::ProgressSink;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::paths::WorkstationPaths;

/// Staged bundle archive placed next to the provisioner by the operator
pub const BUNDLE_ARCHIVE_NAME: &str = "winforge_bundle.zip";

/// Staged package-manager cache archive inside the staging directory
pub const CACHE_ARCHIVE_NAME: &str = "scoop_cache.zip";

/// Installs miscellaneous file groups and unpacks staged archives
pub struct MiscFileInstaller<'a> {
    executor: &'a CommandExecutor,
    paths: &'a WorkstationPaths,
    sink: &'a dyn ProgressSink,
}

impl<'a> MiscFileInstaller<'a> {
    pub fn new(
        executor: &'a CommandExecutor,
        paths: &'a WorkstationPaths,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            executor,
            paths,
            sink,
        }
    }

    /// Fetch every configured file group into its target directory
    pub async fn install_groups(
        &self,
        groups: &IndexMap<String, Vec<MiscFileGroup>>,
    ) -> Result<()> {
        for (category, entries) in groups {
            for group in entries {
                self.install_group(category, group).await?;
            }
        }
        Ok(())
    }

    async fn install_group(&self, category: &str, group: &MiscFileGroup) -> Result<()> {
        let Some(target) = resolve_path(&group.target) else {
            tracing::warn!(category = %category, "target directory did not resolve, skipping");
            return Ok(());
        };

        if target.is_file() {
            tracing::warn!(
                target = %target.display(),
                "target is a file, not a directory, skipping"
            );
            return Ok(());
        }

        std::fs::create_dir_all(&target)?;

        for url in &group.sources {
            let file_name = url.rsplit('/').next().unwrap_or(url);
            let destination = target.join(file_name);

            let run = self
                .executor
                .run(
                    &CommandSpec::argv([
                        "curl".to_string(),
                        "-L".to_string(),
                        "-o".to_string(),
                        destination.display().to_string(),
                        url.clone(),
                    ]),
                    RunOptions::tolerant(),
                )
                .await?;

            // Fetched archives expand in place.
            if run.succeeded && destination.extension().is_some_and(|ext| ext == "zip") {
                if let Err(err) = extract_zip(&destination, &target) {
                    tracing::warn!(
                        archive = %destination.display(),
                        error = %err,
                        "failed to expand fetched archive"
                    );
                }
            }
        }

        self.sink
            .success(&format!("Installed {} (miscellaneous)", group.description));
        Ok(())
    }

    /// Unpack the operator-staged bundle into the staging directory
    ///
    /// The bundle carries archives, manifests, and cache payloads for
    /// installs that cannot touch the network. Missing bundle is a normal
    /// online-run condition.
    pub fn extract_staged_bundle(&self, bundle: Option<&Path>) -> Result<()> {
        let bundle_path = match bundle {
            Some(path) => path.to_path_buf(),
            None => {
                let beside_executable = std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(|dir| dir.join(BUNDLE_ARCHIVE_NAME)));

                match beside_executable {
                    Some(path) if path.is_file() => path,
                    _ => {
                        tracing::info!("no staged bundle found, continuing online");
                        self.sink.info("No staged bundle found");
                        return Ok(());
                    }
                }
            }
        };

        if !bundle_path.is_file() {
            tracing::warn!(bundle = %bundle_path.display(), "staged bundle not found");
            self.sink.warning("Staged bundle not found");
            return Ok(());
        }

        extract_zip(&bundle_path, &self.paths.staging_dir)?;
        self.sink.success("Extracted staged bundle");
        Ok(())
    }

    /// Unpack a staged package-manager cache, if present
    pub fn extract_package_cache(&self) -> Result<()> {
        let cache_archive = self.paths.staging_dir.join(CACHE_ARCHIVE_NAME);

        if !cache_archive.is_file() {
            tracing::info!("no staged package cache found");
            self.sink.info("No staged package cache found");
            return Ok(());
        }

        extract_zip(&cache_archive, &self.paths.scoop_cache_dir())?;
        self.sink.success("Extracted staged package cache");
        Ok(())
    }
}
