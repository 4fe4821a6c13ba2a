//! Bundled artifact installer
//!
//! Installs a payload that was shipped out-of-band (license-restricted, or
//! absent from every repository) through the normal package manager: the
//! staged manifest is rewritten to point at the staged archive with a
//! freshly computed content hash, then installed like any networked package
//! with integrity verification intact.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::paths::WorkstationPaths;

/// Installs pre-staged application bundles through the package manager
pub struct BundledArtifactInstaller<'a> {
    executor: &'a CommandExecutor,
    paths: &'a WorkstationPaths,
}

impl<'a> BundledArtifactInstaller<'a> {
    pub fn new(executor: &'a CommandExecutor, paths: &'a WorkstationPaths) -> Self {
        Self { executor, paths }
    }

    /// Install a bundled application by id
    ///
    /// Returns `Ok(false)` when the staged archive or manifest is missing so
    /// the caller can fall back to an alternative package. A failed install
    /// command also reports `Ok(false)` after its output lands in the error
    /// log.
    pub async fn install(&self, app_id: &str) -> Result<bool> {
        let archive = self.paths.staged_archive(app_id);
        let manifest = self.paths.staged_manifest(app_id);

        if !archive.is_file() || !manifest.is_file() {
            tracing::warn!(
                application = app_id,
                "staged bundle files not found, skipping"
            );
            self.executor.error_log().append(
                &format!("bundled install: {}", app_id),
                &format!(
                    "staged archive or manifest not found under {}",
                    self.paths.staging_dir.display()
                ),
            );
            return Ok(false);
        }

        tracing::info!(application = app_id, "installing bundled application");

        self.rewrite_manifest(&archive, &manifest)?;

        // The download accelerator rejects file:// sources; turn it off for
        // just this install.
        self.executor
            .run(
                &CommandSpec::shell("scoop config aria2-enabled false"),
                RunOptions::tolerant(),
            )
            .await?;

        let install = self
            .executor
            .run(
                &CommandSpec::argv([
                    "scoop".to_string(),
                    "install".to_string(),
                    manifest.display().to_string(),
                ]),
                RunOptions::tolerant(),
            )
            .await;

        self.executor
            .run(
                &CommandSpec::shell("scoop config aria2-enabled true"),
                RunOptions::tolerant(),
            )
            .await?;

        Ok(install?.succeeded)
    }

    /// Point the manifest at the staged archive and refresh its hash
    fn rewrite_manifest(&self, archive: &Path, manifest: &Path) -> Result<()> {
        let mut descriptor: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manifest)?)?;

        let url = format!(
            "file://{}",
            archive.display().to_string().replace('\\', "/")
        );
        let digest = sha256_file(archive)?;

        descriptor["url"] = serde_json::Value::String(url);
        descriptor["hash"] = serde_json::Value::String(digest);

        std::fs::write(manifest, serde_json::to_string_pretty(&descriptor)?)?;
        Ok(())
    }
}

/// SHA-256 of a file's bytes, hex-encoded
pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
