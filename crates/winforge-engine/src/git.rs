//! Repository cloning and version-control trust configuration

use winforge_core::types::PackageReference;

use crate::error::Result;
use crate::events::ProgressSink;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::paths::WorkstationPaths;

/// Clones configured repositories and marks bucket checkouts as trusted
pub struct GitManager<'a> {
    executor: &'a CommandExecutor,
    paths: &'a WorkstationPaths,
    sink: &'a dyn ProgressSink,
}

impl<'a> GitManager<'a> {
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

    /// Clone every configured repository under the repositories directory
    pub async fn clone_repositories(&self, repositories: &[PackageReference]) -> Result<()> {
        for repository in repositories {
            self.clone_repository(&repository.id).await?;
        }
        Ok(())
    }

    /// Clone one repository; already-cloned repositories are skipped
    pub async fn clone_repository(&self, url: &str) -> Result<()> {
        let name = repository_name(url);
        let destination = self.paths.repositories_dir.join(&name);

        if destination.is_dir() {
            tracing::info!(repository = %name, "repository already cloned");
            self.sink.info(&format!("Repository {} already cloned", name));
            return Ok(());
        }

        std::fs::create_dir_all(&self.paths.repositories_dir)?;

        let run = self
            .executor
            .run(
                &CommandSpec::argv([
                    "git".to_string(),
                    "clone".to_string(),
                    url.to_string(),
                    destination.display().to_string(),
                ]),
                RunOptions::tolerant(),
            )
            .await?;

        if run.succeeded {
            self.sink.success(&format!("Cloned repository {}", name));
        } else {
            self.sink
                .warning(&format!("Failed to clone repository {}", name));
        }

        Ok(())
    }

    /// Add every bucket checkout to git's safe.directory list
    ///
    /// The provisioner runs elevated, which leaves the bucket checkouts with
    /// mismatched ownership; without this, every bucket operation fails.
    pub async fn mark_buckets_safe(&self) -> Result<()> {
        let buckets_dir = self.paths.buckets_dir();
        if !buckets_dir.is_dir() {
            return Ok(());
        }

        for entry in std::fs::read_dir(&buckets_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }

            let safe_path = entry.path().display().to_string().replace('\\', "/");

            self.executor
                .run(
                    &CommandSpec::argv([
                        "git".to_string(),
                        "config".to_string(),
                        "--global".to_string(),
                        "--add".to_string(),
                        "safe.directory".to_string(),
                        safe_path,
                    ]),
                    RunOptions::tolerant(),
                )
                .await?;
        }

        Ok(())
    }
}

/// Repository directory name from a clone URL
fn repository_name(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .trim_end_matches(".git")
        .to_string()
}
