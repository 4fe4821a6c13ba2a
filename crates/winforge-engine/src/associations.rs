//! File-type associations
//!
//! An association is only written after the target executable is verified
//! to exist; no partial association is ever left behind for a tool that
//! failed to install.

use std::sync::Arc;

use indexmap::IndexMap;
use winforge_core::types::FileTypeAssociation;
use winforge_core::types::RegistryHive;
use winforge_core::utils::resolve_path;

use crate::error::Result;
use crate::events::ProgressSink;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::paths::WorkstationPaths;
use crate::registry::{RegistryStore, RegistryValue};

/// Writes per-user file-type associations
pub struct AssociationWriter<'a> {
    executor: &'a CommandExecutor,
    registry: Arc<dyn RegistryStore>,
    paths: &'a WorkstationPaths,
    sink: &'a dyn ProgressSink,
}

impl<'a> AssociationWriter<'a> {
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

    /// Apply every configured association; entries whose executable is
    /// missing are skipped whole
    pub async fn apply(&self, associations: &IndexMap<String, FileTypeAssociation>) -> Result<()> {
        for (category, association) in associations {
            let Some(program) = resolve_path(&association.path) else {
                tracing::warn!(category = %category, "program path did not resolve, skipping");
                continue;
            };

            if !program.is_file() {
                tracing::warn!(
                    category = %category,
                    program = %program.display(),
                    "program not found, skipping associations"
                );
                self.sink.warning(&format!(
                    "Skipped file-type associations for {} (program not found)",
                    category
                ));
                continue;
            }

            let program_name = program
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| association.path.clone());

            self.register_open_command(&program_name, &program.display().to_string(), association)?;

            for extension in &association.file_types {
                self.assign_extension(extension, &program_name).await?;
            }

            self.sink.success(&format!(
                "Created file-type associations for {}",
                category
            ));
        }

        Ok(())
    }

    /// Write the application's open command under the per-user classes key
    fn register_open_command(
        &self,
        program_name: &str,
        program_path: &str,
        association: &FileTypeAssociation,
    ) -> Result<()> {
        let key = format!(
            r"Software\Classes\Applications\{}\shell\open\command",
            program_name
        );

        let command = if association.arguments.is_empty() {
            format!("\"{}\" \"%1\"", program_path)
        } else {
            format!(
                "\"{}\" {} \"%1\"",
                program_path,
                association.arguments.join(" ")
            )
        };

        self.registry.set_value(
            RegistryHive::CurrentUser,
            &key,
            "",
            &RegistryValue::String(command),
        )
    }

    /// Route one extension to the program via the association helper tool
    async fn assign_extension(&self, extension: &str, program_name: &str) -> Result<()> {
        let helper = self.paths.app_current("setuserfta").join("setuserfta.exe");
        if !helper.is_file() {
            tracing::warn!("association helper not found, registry entry written only");
            return Ok(());
        }

        self.executor
            .run(
                &CommandSpec::argv([
                    helper.display().to_string(),
                    format!(".{}", extension),
                    format!(r"Applications\{}", program_name),
                ]),
                RunOptions::tolerant(),
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errlog::ErrorLog;
    use crate::events::CollectingSink;
    use crate::process::RecordingRunner;
    use crate::registry::MemoryRegistry;

    struct Fixture {
        runner: Arc<RecordingRunner>,
        executor: CommandExecutor,
        registry: Arc<MemoryRegistry>,
        paths: WorkstationPaths,
        sink: CollectingSink,
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
            sink: CollectingSink::new(),
        }
    }

    fn association(path: &str, extensions: &[&str]) -> IndexMap<String, FileTypeAssociation> {
        let mut associations = IndexMap::new();
        associations.insert(
            "Text".to_string(),
            FileTypeAssociation {
                path: path.to_string(),
                program_name: "Editor".to_string(),
                arguments: Vec::new(),
                file_types: extensions.iter().map(|ext| ext.to_string()).collect(),
            },
        );
        associations
    }

    #[tokio::test]
    async fn test_missing_program_skips_association_entirely() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);
        let writer =
            AssociationWriter::new(&f.executor, f.registry.clone(), &f.paths, &f.sink);

        let missing = temp.path().join("missing.exe");
        writer
            .apply(&association(&missing.display().to_string(), &["txt"]))
            .await
            .unwrap();

        // Nothing written, nothing executed.
        let subkeys = f
            .registry
            .list_subkeys(RegistryHive::CurrentUser, r"Software\Classes\Applications")
            .unwrap();
        assert!(subkeys.is_empty());
        assert!(f.runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_open_command_written_for_existing_program() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let program = temp.path().join("editor.exe");
        std::fs::write(&program, "").unwrap();

        let writer =
            AssociationWriter::new(&f.executor, f.registry.clone(), &f.paths, &f.sink);
        writer
            .apply(&association(&program.display().to_string(), &["txt", "json"]))
            .await
            .unwrap();

        let command = f
            .registry
            .get_value(
                RegistryHive::CurrentUser,
                r"Software\Classes\Applications\editor.exe\shell\open\command",
                "",
            )
            .unwrap()
            .unwrap();

        let command = command.as_string().unwrap();
        assert!(command.contains("editor.exe"));
        assert!(command.ends_with("\"%1\""));
    }

    #[tokio::test]
    async fn test_helper_invoked_per_extension() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let program = temp.path().join("editor.exe");
        std::fs::write(&program, "").unwrap();

        let helper_dir = f.paths.app_current("setuserfta");
        std::fs::create_dir_all(&helper_dir).unwrap();
        std::fs::write(helper_dir.join("setuserfta.exe"), "").unwrap();

        let writer =
            AssociationWriter::new(&f.executor, f.registry.clone(), &f.paths, &f.sink);
        writer
            .apply(&association(&program.display().to_string(), &["txt", "json"]))
            .await
            .unwrap();

        assert_eq!(f.runner.count_matching("setuserfta"), 2);
        assert_eq!(f.runner.count_matching(".txt"), 1);
        assert_eq!(f.runner.count_matching(".json"), 1);
    }

    #[tokio::test]
    async fn test_arguments_inserted_before_file_placeholder() {
        let temp = tempfile::tempdir().unwrap();
        let f = fixture(&temp);

        let program = temp.path().join("viewer.exe");
        std::fs::write(&program, "").unwrap();

        let mut associations = IndexMap::new();
        associations.insert(
            "Viewer".to_string(),
            FileTypeAssociation {
                path: program.display().to_string(),
                program_name: "Viewer".to_string(),
                arguments: vec!["--readonly".to_string()],
                file_types: vec!["bin".to_string()],
            },
        );

        let writer =
            AssociationWriter::new(&f.executor, f.registry.clone(), &f.paths, &f.sink);
        writer.apply(&associations).await.unwrap();

        let command = f
            .registry
            .get_value(
                RegistryHive::CurrentUser,
                r"Software\Classes\Applications\viewer.exe\shell\open\command",
                "",
            )
            .unwrap()
            .unwrap();

        assert!(command.as_string().unwrap().contains("--readonly \"%1\""));
    }
}
