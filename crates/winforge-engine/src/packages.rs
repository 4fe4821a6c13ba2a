//! Language-ecosystem and editor package installation
//!
//! pip/pipx, npm, editor extensions, and disassembler plugins. All installs
//! here are soft: a missing interpreter or a failed download is logged and
//! reported, never fatal.

use winforge_core::types::{InstallMode, PackageReference, PipPackage};
use winforge_core::utils::resolve_path;

use crate::error::Result;
use crate::events::ProgressSink;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::paths::WorkstationPaths;

/// Disassembler install names probed for a plugins directory
const DISASSEMBLER_APPS: &[&str] = &["ida_pro", "ida-free"];

/// Installs packages through the language-ecosystem managers
pub struct EcosystemInstaller<'a> {
    executor: &'a CommandExecutor,
    paths: &'a WorkstationPaths,
    sink: &'a dyn ProgressSink,
}

impl<'a> EcosystemInstaller<'a> {
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

    /// Install Python packages, routing by install mode
    pub async fn install_pip(&self, packages: &[PipPackage]) -> Result<()> {
        for package in packages {
            let command = match package.mode {
                InstallMode::Library => format!("pip install {}", package.id),
                InstallMode::Application => format!("pipx install {}", package.id),
            };

            let run = self
                .executor
                .run(&CommandSpec::shell(command), RunOptions::tolerant())
                .await?;

            if run.succeeded {
                self.sink
                    .success(&format!("Installed {} (pip)", package.display_name()));
            } else {
                self.sink
                    .warning(&format!("Failed to install {} (pip)", package.display_name()));
            }
        }

        Ok(())
    }

    /// Install npm libraries globally
    pub async fn install_npm(&self, packages: &[PackageReference]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }

        let npm = self.paths.app_current("nodejs").join("npm.cmd");
        if !npm.is_file() {
            tracing::warn!("npm not found, skipping library installation");
            self.sink.warning("No NodeJS package manager found");
            return Ok(());
        }

        for package in packages {
            let run = self
                .executor
                .run(
                    &CommandSpec::argv([
                        npm.display().to_string(),
                        "install".to_string(),
                        "-g".to_string(),
                        package.id.clone(),
                    ]),
                    RunOptions::tolerant(),
                )
                .await?;

            if run.succeeded {
                self.sink
                    .success(&format!("Installed {} (npm)", package.display_name()));
            } else {
                self.sink
                    .warning(&format!("Failed to install {} (npm)", package.display_name()));
            }
        }

        Ok(())
    }

    /// Install editor extensions into every editor variant present
    pub async fn install_editor_extensions(
        &self,
        extensions: &[PackageReference],
    ) -> Result<()> {
        let editors = [
            self.paths.app_current("vscode").join("bin").join("code.cmd"),
            self.paths
                .app_current("vscodium")
                .join("bin")
                .join("codium.cmd"),
        ];

        for editor in editors.iter().filter(|editor| editor.is_file()) {
            for extension in extensions {
                let run = self
                    .executor
                    .run(
                        &CommandSpec::argv([
                            editor.display().to_string(),
                            "--install-extension".to_string(),
                            extension.id.clone(),
                        ]),
                        RunOptions::tolerant(),
                    )
                    .await?;

                if run.succeeded {
                    self.sink
                        .success(&format!("Installed {} (editor)", extension.display_name()));
                }
            }
        }

        Ok(())
    }

    /// Fetch disassembler plugins into every detected plugins directory
    pub async fn install_disassembler_plugins(
        &self,
        plugins: &[PackageReference],
    ) -> Result<()> {
        let plugin_dirs: Vec<_> = DISASSEMBLER_APPS
            .iter()
            .map(|app| self.paths.app_current(app).join("plugins"))
            .filter(|dir| dir.is_dir())
            .collect();

        if plugin_dirs.is_empty() {
            tracing::info!("no disassembler plugin directory found, skipping plugins");
            return Ok(());
        }

        for plugin in plugins {
            let file_name = plugin
                .id
                .rsplit('/')
                .next()
                .unwrap_or(plugin.id.as_str())
                .to_string();

            for plugin_dir in &plugin_dirs {
                let destination = plugin_dir.join(&file_name);

                if destination.is_file() {
                    tracing::info!(plugin = %file_name, "plugin already installed");
                    self.sink
                        .info(&format!("Plugin {} already exists", file_name));
                    continue;
                }

                let run = self
                    .executor
                    .run(
                        &CommandSpec::argv([
                            "curl".to_string(),
                            "-L".to_string(),
                            "-o".to_string(),
                            destination.display().to_string(),
                            plugin.id.clone(),
                        ]),
                        RunOptions::tolerant(),
                    )
                    .await?;

                if run.succeeded {
                    self.sink
                        .success(&format!("Installed plugin {}", file_name));
                }
            }
        }

        Ok(())
    }

    /// Remove the Windows Store app-alias python stubs that shadow the real
    /// interpreter
    pub async fn remove_python_app_aliases(&self) -> Result<()> {
        for alias in ["python.exe", "python3.exe"] {
            let Some(alias_path) =
                resolve_path(&format!(r"%LOCALAPPDATA%\Microsoft\WindowsApps\{}", alias))
            else {
                continue;
            };

            if alias_path.is_file() {
                self.executor
                    .run(
                        &CommandSpec::script(format!(
                            "Remove-Item {}",
                            alias_path.display()
                        )),
                        RunOptions::tolerant(),
                    )
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errlog::ErrorLog;
    use crate::events::{CollectingSink, SinkEvent};
    use crate::process::RecordingRunner;
    use std::sync::Arc;

    struct Fixture {
        runner: Arc<RecordingRunner>,
        executor: CommandExecutor,
        paths: WorkstationPaths,
        sink: CollectingSink,
    }

    fn fixture(temp: &tempfile::TempDir) -> Fixture {
        let runner = Arc::new(RecordingRunner::new());
        let executor = CommandExecutor::new(
            runner.clone(),
            ErrorLog::new(temp.path().join("error.log")),
        )
        .with_policy(winforge_core::retry::RetryPolicy {
            strategy: winforge_core::retry::RetryStrategy::None,
            ..winforge_core::retry::RetryPolicy::default()
        });

        Fixture {
            runner,
            executor,
            paths: WorkstationPaths::rooted_at(temp.path()),
            sink: CollectingSink::new(),
        }
    }

    fn pip(id: &str, mode: InstallMode) -> PipPackage {
        PipPackage {
            id: id.to_string(),
            name: String::new(),
            description: String::new(),
            mode,
        }
    }

    #[tokio::test]
    async fn test_pip_routes_by_install_mode() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);
        let installer = EcosystemInstaller::new(&f.executor, &f.paths, &f.sink);

        installer
            .install_pip(&[
                pip("requests", InstallMode::Library),
                pip("frida-tools", InstallMode::Application),
            ])
            .await
            .unwrap();

        assert_eq!(f.runner.count_matching("pip install requests"), 1);
        assert_eq!(f.runner.count_matching("pipx install frida-tools"), 1);
    }

    #[tokio::test]
    async fn test_pip_failure_is_soft() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);
        f.runner.fail_matching("pip install", 1);
        let installer = EcosystemInstaller::new(&f.executor, &f.paths, &f.sink);

        installer
            .install_pip(&[pip("broken", InstallMode::Library)])
            .await
            .unwrap();

        assert!(f
            .sink
            .events()
            .iter()
            .any(|event| matches!(event, SinkEvent::Warning(_))));
    }

    #[tokio::test]
    async fn test_npm_skipped_without_node() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);
        let installer = EcosystemInstaller::new(&f.executor, &f.paths, &f.sink);

        installer
            .install_npm(&[PackageReference::new("box-js")])
            .await
            .unwrap();

        assert!(f.runner.invocations().is_empty());
        assert!(f
            .sink
            .events()
            .iter()
            .any(|event| matches!(event, SinkEvent::Warning(_))));
    }

    #[tokio::test]
    async fn test_npm_installs_when_node_present() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let node_dir = f.paths.app_current("nodejs");
        std::fs::create_dir_all(&node_dir).unwrap();
        std::fs::write(node_dir.join("npm.cmd"), "").unwrap();

        let installer = EcosystemInstaller::new(&f.executor, &f.paths, &f.sink);
        installer
            .install_npm(&[PackageReference::new("box-js")])
            .await
            .unwrap();

        assert_eq!(f.runner.count_matching("install -g box-js"), 1);
    }

    #[tokio::test]
    async fn test_extensions_install_into_each_present_editor() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let code_bin = f.paths.app_current("vscode").join("bin");
        std::fs::create_dir_all(&code_bin).unwrap();
        std::fs::write(code_bin.join("code.cmd"), "").unwrap();

        let installer = EcosystemInstaller::new(&f.executor, &f.paths, &f.sink);
        installer
            .install_editor_extensions(&[PackageReference::new("ms-python.python")])
            .await
            .unwrap();

        assert_eq!(
            f.runner.count_matching("--install-extension ms-python.python"),
            1
        );
    }

    #[tokio::test]
    async fn test_existing_plugin_not_downloaded_again() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let plugin_dir = f.paths.app_current("ida_pro").join("plugins");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("annotate.py"), "# existing").unwrap();

        let installer = EcosystemInstaller::new(&f.executor, &f.paths, &f.sink);
        installer
            .install_disassembler_plugins(&[PackageReference::new(
                "https://example.com/plugins/annotate.py",
            )])
            .await
            .unwrap();

        assert_eq!(f.runner.count_matching("curl"), 0);
    }

    #[tokio::test]
    async fn test_plugin_downloaded_into_plugin_dir() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let plugin_dir = f.paths.app_current("ida_pro").join("plugins");
        std::fs::create_dir_all(&plugin_dir).unwrap();

        let installer = EcosystemInstaller::new(&f.executor, &f.paths, &f.sink);
        installer
            .install_disassembler_plugins(&[PackageReference::new(
                "https://example.com/plugins/annotate.py",
            )])
            .await
            .unwrap();

        assert_eq!(f.runner.count_matching("curl -L -o"), 1);
        assert_eq!(f.runner.count_matching("annotate.py"), 1);
    }
}
