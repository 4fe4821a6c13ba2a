//! Taskbar and shell shortcut configuration
//!
//! Pins are applied through a layout file the shell consumes on next login;
//! unpinning preinstalled shortcuts goes through the shell COM verbs driven
//! from a script.

use winforge_core::types::PackageReference;
use winforge_core::utils::resolve_path;

use crate::error::Result;
use crate::events::ProgressSink;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::paths::WorkstationPaths;

/// Build the layout document pinning the given apps to the taskbar
///
/// Entries starting with `Microsoft` are treated as application ids;
/// everything else resolves to a shortcut path.
pub fn create_start_layout_xml(apps: &[String]) -> String {
    let mut lines = Vec::with_capacity(apps.len());

    for app in apps {
        if app.starts_with("Microsoft") {
            lines.push(format!(
                "\t\t<taskbar:DesktopApp DesktopApplicationID=\"{}\" />",
                app
            ));
        } else {
            let resolved = resolve_path(app)
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| app.clone());
            lines.push(format!(
                "\t\t<taskbar:DesktopApp DesktopApplicationLinkPath=\"{}\" />",
                resolved
            ));
        }
    }

    let content = lines.join("\n");

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<LayoutModificationTemplate
    xmlns="http://schemas.microsoft.com/Start/2014/LayoutModification"
    xmlns:defaultlayout="http://schemas.microsoft.com/Start/2014/FullDefaultLayout"
    xmlns:start="http://schemas.microsoft.com/Start/2014/StartLayout"
    xmlns:taskbar="http://schemas.microsoft.com/Start/2014/TaskbarLayout"
    Version="1">
  <CustomTaskbarLayoutCollection>
    <defaultlayout:TaskbarLayout>
      <taskbar:TaskbarPinList>
{}
      </taskbar:TaskbarPinList>
    </defaultlayout:TaskbarLayout>
 </CustomTaskbarLayoutCollection>
</LayoutModificationTemplate>"#,
        content
    )
}

/// Applies taskbar pins and shell shortcut cleanup
pub struct TaskbarConfigurator<'a> {
    executor: &'a CommandExecutor,
    paths: &'a WorkstationPaths,
    sink: &'a dyn ProgressSink,
}

impl<'a> TaskbarConfigurator<'a> {
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

    /// Write the taskbar layout file; it takes effect on next login
    pub fn pin_apps(&self, pins: &[PackageReference]) -> Result<()> {
        if pins.is_empty() {
            return Ok(());
        }

        let apps: Vec<String> = pins.iter().map(|pin| pin.id.clone()).collect();
        let layout = create_start_layout_xml(&apps);

        std::fs::create_dir_all(&self.paths.documents_dir)?;
        std::fs::write(self.paths.start_layout_file(), layout)?;

        self.sink.success("Wrote taskbar configuration");
        Ok(())
    }

    /// Unpin a named shortcut from the taskbar
    pub async fn remove_pin(&self, app_name: &str) -> Result<()> {
        tracing::info!(app = app_name, "removing taskbar pin");

        let script = [
            format!("$appName = \"{}\"", app_name),
            "$taskbarNamespace = (New-Object -Com Shell.Application).NameSpace(\"shell:::{4234d49b-0245-4df3-b780-3893943456e1}\")".to_string(),
            "$pinnedItem = $taskbarNamespace.Items() | Where-Object { $_.Name -eq $appName }".to_string(),
            "if ($pinnedItem) {".to_string(),
            "   $pinnedItem.Verbs() | Where-Object { $_.Name.replace('&', '') -match 'Unpin from taskbar' } | ForEach-Object { $_.DoIt() }".to_string(),
            "}".to_string(),
        ]
        .join("\n");

        self.executor
            .run(&CommandSpec::script(script), RunOptions::tolerant())
            .await?;

        Ok(())
    }

    /// Pin the user folder to Quick Access and unpin everything else
    pub async fn prepare_quick_access(&self) -> Result<()> {
        tracing::info!("preparing the Quick Access folder");

        let home = self.paths.home.display().to_string();
        let script = [
            "$shell = New-Object -Com Shell.Application".to_string(),
            format!("$shell.NameSpace(\"{}\").Self.InvokeVerb(\"pintohome\")", home),
            "$quickAccess = $shell.NameSpace(\"shell:::{679f85cb-0220-4080-b29b-5540cc05aab6}\")"
                .to_string(),
            "foreach ($item in @($quickAccess.Items())) {".to_string(),
            format!("    if ($item.Path -ne \"{}\") {{", home),
            "        $item.InvokeVerb(\"unpinfromhome\")".to_string(),
            "        $item.InvokeVerb(\"removefromhome\")".to_string(),
            "    }".to_string(),
            "}".to_string(),
        ]
        .join("\n");

        self.executor
            .run(&CommandSpec::script(script), RunOptions::tolerant())
            .await?;

        Ok(())
    }
}
