//! Execution-restriction policy builder
//!
//! Writes the Windows application-execution policy across both the native
//! and compatibility registry views, and registers per-path quarantine
//! rules that place folders into the deny-by-default scope. Policy writes
//! are append-only; removing a quarantine path is out of scope.

use std::sync::Arc;

use uuid::Uuid;
use winforge_core::types::RegistryHive;
use winforge_core::utils::resolve_path;

use crate::error::Result;
use crate::events::ProgressSink;
use crate::registry::{RegistryStore, RegistryValue};

/// Policy roots: native view and the 32-bit compatibility view
pub const POLICY_ROOTS: [&str; 2] = [
    r"SOFTWARE\Policies\Microsoft\Windows\Safer\CodeIdentifiers",
    r"SOFTWARE\WOW6432Node\Policies\Microsoft\Windows\Safer\CodeIdentifiers",
];

/// Rules placed under this level deny execution outright
pub const LEVEL_DISALLOWED: u32 = 0;
const LEVEL_UNTRUSTED: u32 = 4_096;
const LEVEL_BASIC_USER: u32 = 131_072;
/// The unrestricted level normal programs run at
pub const LEVEL_UNRESTRICTED: u32 = 262_144;

/// All restriction levels, pre-created so later rule additions never need
/// to create missing parents
pub const RULE_LEVELS: [u32; 4] = [
    LEVEL_DISALLOWED,
    LEVEL_UNTRUSTED,
    LEVEL_BASIC_USER,
    LEVEL_UNRESTRICTED,
];

/// Rule kinds pre-created under every level
pub const RULE_KINDS: [&str; 3] = ["Paths", "Hashes", "UrlZones"];

/// Default policy level for executables not matched by any rule
pub const DEFAULT_POLICY_LEVEL: u32 = LEVEL_UNRESTRICTED;

/// Fixed last-modified marker written with every rule
const RULE_LAST_MODIFIED: u64 = 133_000_000_000_000_000;

/// Executable categories covered by the policy
const EXECUTABLE_TYPES: &[&str] = &[
    "ADE", "ADP", "BAS", "BAT", "CHM", "CMD", "COM", "CPL", "CRT", "EXE", "HLP", "HTA", "INF",
    "INS", "ISP", "LNK", "MDB", "MDE", "MSC", "MSI", "MSP", "MST", "OCX", "PCD", "PIF", "REG",
    "SCR", "SHS", "URL", "VB", "WSC",
];

/// Builds the execution-restriction policy
pub struct SaferPolicyBuilder<'a> {
    registry: Arc<dyn RegistryStore>,
    sink: &'a dyn ProgressSink,
}

impl<'a> SaferPolicyBuilder<'a> {
    pub fn new(registry: Arc<dyn RegistryStore>, sink: &'a dyn ProgressSink) -> Self {
        Self { registry, sink }
    }

    /// Write the policy scaffolding into both hive views
    pub fn enable_execution_restriction_policy(&self) -> Result<()> {
        let executable_types: Vec<String> = EXECUTABLE_TYPES
            .iter()
            .map(|extension| extension.to_string())
            .collect();

        for root in POLICY_ROOTS {
            self.registry.set_values(
                RegistryHive::LocalMachine,
                root,
                &[
                    (
                        "DefaultLevel".to_string(),
                        RegistryValue::Dword(DEFAULT_POLICY_LEVEL),
                    ),
                    ("TransparentEnabled".to_string(), RegistryValue::Dword(1)),
                    ("PolicyScope".to_string(), RegistryValue::Dword(0)),
                    ("AuthenticodeEnabled".to_string(), RegistryValue::Dword(0)),
                    (
                        "ExecutableTypes".to_string(),
                        RegistryValue::MultiString(executable_types.clone()),
                    ),
                ],
            )?;

            for level in RULE_LEVELS {
                for kind in RULE_KINDS {
                    self.registry.create_key(
                        RegistryHive::LocalMachine,
                        &format!(r"{}\{}\{}", root, level, kind),
                    )?;
                }
            }
        }

        tracing::info!("execution-restriction policy enabled");
        self.sink.success("Enabled execution-restriction policy");
        Ok(())
    }

    /// Add a folder to the deny-by-default scope
    ///
    /// The directory is created when absent and a fresh path rule is written
    /// under the disallowed level in both hive views.
    pub fn register_quarantine_path(&self, folder: &str) -> Result<()> {
        let Some(resolved) = resolve_path(folder) else {
            tracing::warn!(folder = folder, "quarantine folder did not resolve, skipping");
            return Ok(());
        };

        std::fs::create_dir_all(&resolved)?;

        let rule_id = format!("{{{}}}", Uuid::new_v4());
        let item_data = resolved.display().to_string();

        for root in POLICY_ROOTS {
            let rule_key = format!(
                r"{}\{}\Paths\{}",
                root, LEVEL_DISALLOWED, rule_id
            );

            self.registry.set_values(
                RegistryHive::LocalMachine,
                &rule_key,
                &[
                    (
                        "Description".to_string(),
                        RegistryValue::String("Quarantined folder".to_string()),
                    ),
                    (
                        "ItemData".to_string(),
                        RegistryValue::ExpandableString(item_data.clone()),
                    ),
                    ("SaferFlags".to_string(), RegistryValue::Dword(0)),
                    (
                        "LastModified".to_string(),
                        RegistryValue::Qword(RULE_LAST_MODIFIED),
                    ),
                ],
            )?;
        }

        tracing::info!(folder = %item_data, "registered quarantine path");
        self.sink
            .success(&format!("Quarantined folder {}", item_data));
        Ok(())
    }
}
