//! Tool-specific post-install fixups
//!
//! Host power policy, disassembler interpreter rebinding, binary-diffing
//! integration, and the optional shell overlay. Everything here is
//! best-effort; a missing tool skips its fixup.

use std::path::Path;
use std::sync::Arc;

use winforge_core::types::RegistryHive;
use winforge_core::utils::resolve_path;

use crate::error::Result;
use crate::events::ProgressSink;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::paths::WorkstationPaths;
use crate::registry::{RegistryStore, RegistryValue};

/// Registry key the disassembler reads its interpreter binding from
const DISASSEMBLER_KEY: &str = r"Software\Hex-Rays\IDA";

/// Applies tool-specific fixups after package installation
pub struct ToolFixups<'a> {
    executor: &'a CommandExecutor,
    registry: Arc<dyn RegistryStore>,
    paths: &'a WorkstationPaths,
    sink: &'a dyn ProgressSink,
}

impl<'a> ToolFixups<'a> {
    pub fn new(
        executor: &'a CommandExecutor,
        registry: Arc<dyn RegistryStore>,
        paths: &'a WorkstationPaths,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            executor,
            registry,
            paths,
            sink,
        }
    }

    /// Disable sleep, hibernation, and display timeouts for the run
    ///
    /// An unattended provisioning run on a VM must not be interrupted by
    /// the guest going to sleep mid-download.
    pub async fn keep_host_awake(&self) -> Result<()> {
        let script = [
            "powercfg /h off",
            "powercfg -change -standby-timeout-ac 0",
            "powercfg -change -standby-timeout-dc 0",
            "powercfg -change -monitor-timeout-ac 0",
            "powercfg -change -monitor-timeout-dc 0",
        ]
        .join("\n");

        self.executor
            .run(&CommandSpec::script(script), RunOptions::tolerant())
            .await?;

        self.sink.success("Disabled standby mode");
        Ok(())
    }

    /// Rebind the disassembler to the configured Python DLL
    ///
    /// Writes the target DLL into the registry, then drives the vendor's
    /// switch tool over stdin so the binding is effective immediately.
    pub async fn rebind_disassembler_python(&self, python_dll: &str) -> Result<()> {
        if python_dll.trim().is_empty() {
            return Ok(());
        }

        let Some(dll_path) = resolve_path(python_dll) else {
            tracing::warn!("python DLL path did not resolve, skipping rebinding");
            return Ok(());
        };

        self.registry.set_value(
            RegistryHive::CurrentUser,
            DISASSEMBLER_KEY,
            "Python3TargetDLL",
            &RegistryValue::String(dll_path.display().to_string()),
        )?;

        let switch_tool = self.paths.app_current("ida_pro").join("idapyswitch.exe");
        if !switch_tool.is_file() {
            tracing::warn!("idapyswitch not found, registry binding written only");
            return Ok(());
        }

        // The tool presents a numbered menu; the registry entry written
        // above is always the first option.
        self.executor
            .run(
                &CommandSpec::argv([switch_tool.display().to_string()]),
                RunOptions::tolerant().with_stdin("0"),
            )
            .await?;

        self.sink.success("Rebound disassembler Python interpreter");
        Ok(())
    }

    /// Wire the binary-diffing tool into the installed analysis tools
    pub fn wire_binary_diff(&self) -> Result<()> {
        let bindiff_dir = self.paths.app_current("bindiff");
        if !bindiff_dir.is_dir() {
            tracing::warn!("binary-diffing tool not found, skipping integration");
            self.sink.warning("Binary-diffing tool not found, skipping integration");
            return Ok(());
        }

        let descriptor_path = bindiff_dir
            .join("CommonAppData")
            .join("BinDiff")
            .join("bindiff.json");

        if descriptor_path.is_file() {
            let mut descriptor: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(&descriptor_path)?)?;

            descriptor["directory"] =
                serde_json::Value::String(bindiff_dir.display().to_string());
            descriptor["ui"]["java_binary"] = serde_json::Value::String(
                bindiff_dir
                    .join("ProgramFiles")
                    .join("BinDiff")
                    .join("jre")
                    .join("bin")
                    .join("javaw.exe")
                    .display()
                    .to_string(),
            );
            descriptor["ida"]["directory"] =
                serde_json::Value::String(self.paths.app_current("ida_pro").display().to_string());

            std::fs::write(&descriptor_path, serde_json::to_string_pretty(&descriptor)?)?;
        }

        let plugin_sources = [
            (
                bindiff_dir
                    .join("ProgramFiles")
                    .join("BinDiff")
                    .join("Plugins")
                    .join("IDA Pro"),
                resolve_path(r"%APPDATA%\Hex-Rays\IDA Pro\plugins"),
            ),
            (
                bindiff_dir
                    .join("ProgramFiles")
                    .join("BinDiff")
                    .join("Plugins")
                    .join("Binary Ninja"),
                resolve_path(r"%APPDATA%\Binary Ninja\plugins"),
            ),
            (
                bindiff_dir.join("CommonAppData"),
                resolve_path("%APPDATA%"),
            ),
        ];

        for (source, target) in plugin_sources {
            let Some(target) = target else { continue };
            if source.is_dir() {
                copy_tree(&source, &target)?;
            }
        }

        self.sink
            .success("Made binary diffing available to analysis tools");
        Ok(())
    }

    /// Overlay the Zsh shell onto the git installation
    pub async fn install_zsh_over_git(&self) -> Result<()> {
        let zsh_marker = self
            .paths
            .app_current("git")
            .join("usr")
            .join("bin")
            .join("zsh.exe");

        if zsh_marker.is_file() {
            tracing::info!("shell overlay already present");
        } else {
            let source = self.paths.app_current("zsh").display().to_string();
            let target = self.paths.app_current("git").display().to_string();

            let script = [
                format!("$sourceDir = \"{}\"", source),
                format!("$targetDir = \"{}\"", target),
                "Get-ChildItem -Path $sourceDir -Recurse | ForEach-Object {".to_string(),
                "    $targetItemPath = $_.FullName.Replace($sourceDir, $targetDir)".to_string(),
                "    if ($_.PSIsContainer) {".to_string(),
                "        if (-not (Test-Path -Path $targetItemPath)) { New-Item -ItemType Directory -Path $targetItemPath | Out-Null }".to_string(),
                "    } elseif ($_.Name -ne \"install.json\" -and $_.Name -ne \"manifest.json\") {".to_string(),
                "        New-Item -ItemType HardLink -Path $targetItemPath -Value $_.FullName | Out-Null".to_string(),
                "    }".to_string(),
                "}".to_string(),
            ]
            .join("\n");

            self.executor
                .run(&CommandSpec::script(script), RunOptions::tolerant())
                .await?;
        }

        let framework_dir = self.paths.home.join(".oh-my-zsh");
        if !framework_dir.is_dir() {
            self.executor
                .run(
                    &CommandSpec::argv([
                        "git".to_string(),
                        "clone".to_string(),
                        "https://github.com/ohmyzsh/ohmyzsh/".to_string(),
                        framework_dir.display().to_string(),
                    ]),
                    RunOptions::tolerant(),
                )
                .await?;
        }

        let theme_dir = framework_dir
            .join("custom")
            .join("themes")
            .join("powerlevel10k");
        if !theme_dir.is_dir() {
            self.executor
                .run(
                    &CommandSpec::argv([
                        "git".to_string(),
                        "clone".to_string(),
                        "--depth=1".to_string(),
                        "https://github.com/romkatv/powerlevel10k.git".to_string(),
                        theme_dir.display().to_string(),
                    ]),
                    RunOptions::tolerant(),
                )
                .await?;
        }

        self.sink.success("Installed shell overlay");
        Ok(())
    }

    /// Enable the legacy .NET runtime some analysis targets require
    pub async fn enable_legacy_dotnet(&self) -> Result<()> {
        self.executor
            .run(
                &CommandSpec::script("Dism /online /Enable-Feature /FeatureName:NetFx3"),
                RunOptions::tolerant(),
            )
            .await?;

        self.sink.success("Enabled .NET Framework 3.5");
        Ok(())
    }
}

/// Recursively copy a directory tree, merging into existing directories
fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walkdir yields children of its root");
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &destination)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errlog::ErrorLog;
    use crate::events::NullSink;
    use crate::process::RecordingRunner;
    use crate::registry::MemoryRegistry;
    use serial_test::serial;

    struct Fixture {
        runner: Arc<RecordingRunner>,
        executor: CommandExecutor,
        registry: Arc<MemoryRegistry>,
        paths: WorkstationPaths,
    }

    fn fixture(temp: &tempfile::TempDir) -> Fixture {
        let runner = Arc::new(RecordingRunner::new());
        let executor = CommandExecutor::new(
            runner.clone(),
            ErrorLog::new(temp.path().join("error.log")),
        );
        Fixture {
            runner,
            executor,
            registry: Arc::new(MemoryRegistry::new()),
            paths: WorkstationPaths::rooted_at(temp.path()),
        }
    }

    #[tokio::test]
    async fn test_rebind_writes_registry_binding() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let dll = temp.path().join("python311.dll");
        std::fs::write(&dll, "").unwrap();

        let fixups = ToolFixups::new(&f.executor, f.registry.clone(), &f.paths, &NullSink);
        fixups
            .rebind_disassembler_python(&dll.display().to_string())
            .await
            .unwrap();

        let binding = f
            .registry
            .get_value(RegistryHive::CurrentUser, DISASSEMBLER_KEY, "Python3TargetDLL")
            .unwrap()
            .unwrap();
        assert_eq!(binding.as_string(), Some(dll.display().to_string().as_str()));

        // Switch tool absent: no process ran, binding still written.
        assert!(f.runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_rebind_drives_switch_tool_over_stdin() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let tool_dir = f.paths.app_current("ida_pro");
        std::fs::create_dir_all(&tool_dir).unwrap();
        std::fs::write(tool_dir.join("idapyswitch.exe"), "").unwrap();

        let fixups = ToolFixups::new(&f.executor, f.registry.clone(), &f.paths, &NullSink);
        fixups
            .rebind_disassembler_python(r"C:\python\python311.dll")
            .await
            .unwrap();

        let invocations = f.runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].stdin.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_rebind_skipped_for_empty_setting() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let fixups = ToolFixups::new(&f.executor, f.registry.clone(), &f.paths, &NullSink);
        fixups.rebind_disassembler_python("").await.unwrap();

        assert!(f.runner.invocations().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_wire_binary_diff_patches_descriptor_and_copies_plugins() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let appdata = temp.path().join("appdata");
        std::env::set_var("APPDATA", &appdata);

        let bindiff_dir = f.paths.app_current("bindiff");
        let descriptor_dir = bindiff_dir.join("CommonAppData").join("BinDiff");
        std::fs::create_dir_all(&descriptor_dir).unwrap();
        std::fs::write(
            descriptor_dir.join("bindiff.json"),
            r#"{"ui": {}, "ida": {}}"#,
        )
        .unwrap();

        let ida_plugin_dir = bindiff_dir
            .join("ProgramFiles")
            .join("BinDiff")
            .join("Plugins")
            .join("IDA Pro");
        std::fs::create_dir_all(&ida_plugin_dir).unwrap();
        std::fs::write(ida_plugin_dir.join("bindiff_plugin.dll"), "plugin").unwrap();

        let fixups = ToolFixups::new(&f.executor, f.registry.clone(), &f.paths, &NullSink);
        fixups.wire_binary_diff().unwrap();

        let descriptor: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(descriptor_dir.join("bindiff.json")).unwrap(),
        )
        .unwrap();
        assert!(descriptor["directory"].as_str().unwrap().contains("bindiff"));
        assert!(descriptor["ui"]["java_binary"]
            .as_str()
            .unwrap()
            .contains("javaw.exe"));

        assert!(appdata
            .join("Hex-Rays")
            .join("IDA Pro")
            .join("plugins")
            .join("bindiff_plugin.dll")
            .is_file());

        std::env::remove_var("APPDATA");
    }

    #[tokio::test]
    async fn test_zsh_overlay_clones_framework_and_theme() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let fixups = ToolFixups::new(&f.executor, f.registry.clone(), &f.paths, &NullSink);
        fixups.install_zsh_over_git().await.unwrap();

        assert_eq!(f.runner.count_matching("HardLink"), 1);
        assert_eq!(f.runner.count_matching("git clone https://github.com/ohmyzsh"), 1);
        assert_eq!(f.runner.count_matching("powerlevel10k"), 1);
    }

    #[test]
    fn test_copy_tree_merges_into_existing_target() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("source");
        let target = temp.path().join("target");

        std::fs::create_dir_all(source.join("sub")).unwrap();
        std::fs::write(source.join("a.txt"), "a").unwrap();
        std::fs::write(source.join("sub").join("b.txt"), "b").unwrap();
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("existing.txt"), "keep").unwrap();

        copy_tree(&source, &target).unwrap();

        assert_eq!(std::fs::read_to_string(target.join("a.txt")).unwrap(), "a");
        assert_eq!(
            std::fs::read_to_string(target.join("sub").join("b.txt")).unwrap(),
            "b"
        );
        assert_eq!(
            std::fs::read_to_string(target.join("existing.txt")).unwrap(),
            "keep"
        );
    }
}
