//! Provisioning plan types
//!
//! The plan is plain data: it is fully materialized before a run starts and
//! never mutated afterwards. Package entries that carry a fallback are a
//! proper tagged variant resolved once at deserialization time, not
//! re-inspected at every use site.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::RegistryChange;

/// A single package known to one of the driven package managers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageReference {
    /// Package-manager-specific identifier. May be bucket-qualified
    /// (`bucket/tool`) or end in `.json` for a bundled-manifest install.
    pub id: String,

    /// Human-readable name shown in progress output
    #[serde(default)]
    pub name: String,

    /// Short description of what the package provides
    #[serde(default)]
    pub description: String,
}

impl PackageReference {
    /// Create a reference with the display name defaulting to the id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
        }
    }

    /// Display name, falling back to the raw id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A package entry: either a plain package or a primary/alternative pair
///
/// The pair form is used where a preferred (often paid or license-gated)
/// tool has a free fallback: the primary is attempted first, the
/// alternative only on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageEntry {
    /// Primary with a fallback attempted when the primary fails
    Alternatives {
        primary: PackageReference,
        alternative: PackageReference,
    },
    /// A single package with no fallback
    Single(PackageReference),
}

impl PackageEntry {
    /// The package attempted first
    pub fn primary(&self) -> &PackageReference {
        match self {
            PackageEntry::Single(reference) => reference,
            PackageEntry::Alternatives { primary, .. } => primary,
        }
    }

    /// The fallback package, if one is declared
    pub fn alternative(&self) -> Option<&PackageReference> {
        match self {
            PackageEntry::Single(_) => None,
            PackageEntry::Alternatives { alternative, .. } => Some(alternative),
        }
    }
}

/// How a Python package is installed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// Library-style install into the interpreter's site-packages (pip)
    #[default]
    Library,
    /// Isolated application install with its own environment (pipx)
    Application,
}

/// A Python package with its install mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipPackage {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub mode: InstallMode,
}

impl PipPackage {
    /// Display name, falling back to the raw id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Scoop section: buckets, required tooling, and categorized optional tools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoopSection {
    /// Source repositories registered before anything optional installs
    #[serde(default)]
    pub buckets: Vec<PackageReference>,

    /// Tools every workstation needs regardless of selection
    #[serde(default)]
    pub required: Vec<PackageEntry>,

    /// Optional tools grouped by category, in file order
    #[serde(default)]
    pub packages: IndexMap<String, Vec<PackageEntry>>,
}

/// Python packages split into required and optional sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipSection {
    #[serde(default)]
    pub required: Vec<PipPackage>,

    #[serde(default)]
    pub packages: Vec<PipPackage>,
}

/// Globally installed npm libraries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpmSection {
    #[serde(default)]
    pub packages: Vec<PackageReference>,
}

/// A file-type association applied through the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeAssociation {
    /// Path to the handling executable; may embed `%VAR%` tokens. The
    /// association is skipped when this does not resolve to an existing
    /// file at apply time.
    pub path: String,

    /// Display name for progress output
    #[serde(default)]
    pub program_name: String,

    /// Arguments inserted before the opened file
    #[serde(default)]
    pub arguments: Vec<String>,

    /// Extensions (without leading dot) routed to the program
    #[serde(default)]
    pub file_types: Vec<String>,
}

/// A group of out-of-band files placed into a target directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiscFileGroup {
    #[serde(default)]
    pub description: String,

    /// Source URLs, each fetched independently
    #[serde(default)]
    pub sources: Vec<String>,

    /// Target directory; created when absent. May embed `%VAR%` tokens.
    pub target: String,
}

/// Scalar run parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Apply the execution-restriction policy after installation
    #[serde(default)]
    pub enable_safer: bool,

    /// Folders placed into the deny-by-default execution scope
    #[serde(default)]
    pub quarantine_folders: Vec<String>,

    /// Python interpreter DLL the disassembler is rebound to
    #[serde(default)]
    pub python_dll: String,

    /// Overlay the Zsh shell onto the git installation
    #[serde(default)]
    pub install_zsh_over_git: bool,

    /// Wire the binary-diffing tool into the installed analysis tools
    #[serde(default)]
    pub make_bindiff_available: bool,

    /// Keep the package-manager download cache after the run
    #[serde(default)]
    pub keep_scoop_cache: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_safer: false,
            quarantine_folders: Vec::new(),
            python_dll: String::new(),
            install_zsh_over_git: false,
            make_bindiff_available: false,
            keep_scoop_cache: false,
        }
    }
}

/// The root provisioning plan
///
/// Unknown top-level keys are rejected so an operator-supplied override that
/// misspells a section fails at load rather than silently provisioning a
/// partial workstation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[serde(default)]
    pub scoop: ScoopSection,

    #[serde(default)]
    pub pip: PipSection,

    #[serde(default)]
    pub npm: NpmSection,

    /// Plugin files fetched into the disassembler's plugin directory
    #[serde(default)]
    pub ida_plugins: Vec<PackageReference>,

    #[serde(default)]
    pub vscode_extensions: Vec<PackageReference>,

    /// Shortcut paths pinned to the taskbar on next login
    #[serde(default)]
    pub taskbar_pins: Vec<PackageReference>,

    /// Repository URLs cloned under the user's repositories directory
    #[serde(default)]
    pub git_repositories: Vec<PackageReference>,

    #[serde(default)]
    pub file_type_associations: IndexMap<String, FileTypeAssociation>,

    /// Registry edits grouped by category, in file order
    #[serde(default)]
    pub registry_changes: IndexMap<String, Vec<RegistryChange>>,

    #[serde(default)]
    pub misc_files: IndexMap<String, Vec<MiscFileGroup>>,

    #[serde(default)]
    pub settings: Settings,
}

impl Configuration {
    /// Validate cross-field invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        for bucket in &self.scoop.buckets {
            if bucket.id.trim().is_empty() {
                return Err(Error::invalid_config("scoop bucket with empty id"));
            }
        }

        for (category, changes) in &self.registry_changes {
            for change in changes {
                change.validate().map_err(|err| {
                    Error::invalid_config(format!(
                        "registry change in category '{}': {}",
                        category, err
                    ))
                })?;
            }
        }

        for (name, association) in &self.file_type_associations {
            if association.path.trim().is_empty() {
                return Err(Error::invalid_config(format!(
                    "file-type association '{}' has no program path",
                    name
                )));
            }
            if association.file_types.is_empty() {
                return Err(Error::invalid_config(format!(
                    "file-type association '{}' lists no extensions",
                    name
                )));
            }
        }

        for (category, groups) in &self.misc_files {
            for group in groups {
                if group.target.trim().is_empty() {
                    return Err(Error::invalid_config(format!(
                        "misc file group in category '{}' has no target directory",
                        category
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_entry_single_from_json() {
        let json = r#"{"id": "yara", "name": "YARA", "description": "Pattern matching"}"#;
        let entry: PackageEntry = serde_json::from_str(json).unwrap();

        assert_eq!(entry.primary().id, "yara");
        assert!(entry.alternative().is_none());
    }

    #[test]
    fn test_package_entry_pair_from_json() {
        let json = r#"{
            "primary": {"id": "bucket/paid_tool", "name": "Paid Tool"},
            "alternative": {"id": "bucket/free_tool", "name": "Free Tool"}
        }"#;
        let entry: PackageEntry = serde_json::from_str(json).unwrap();

        assert_eq!(entry.primary().id, "bucket/paid_tool");
        assert_eq!(entry.alternative().unwrap().id, "bucket/free_tool");
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let reference = PackageReference::new("7zip");
        assert_eq!(reference.display_name(), "7zip");

        let named = PackageReference {
            id: "7zip".to_string(),
            name: "7-Zip".to_string(),
            description: String::new(),
        };
        assert_eq!(named.display_name(), "7-Zip");
    }

    #[test]
    fn test_install_mode_parsing() {
        let package: PipPackage =
            serde_json::from_str(r#"{"id": "frida-tools", "mode": "application"}"#).unwrap();
        assert_eq!(package.mode, InstallMode::Application);

        let package: PipPackage = serde_json::from_str(r#"{"id": "requests"}"#).unwrap();
        assert_eq!(package.mode, InstallMode::Library);
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let json = r#"{"scoop": {}, "unexpected_section": []}"#;
        let result: std::result::Result<Configuration, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_empty_bucket_id() {
        let mut config = Configuration::default();
        config.scoop.buckets.push(PackageReference::new("  "));

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_association_without_extensions() {
        let mut config = Configuration::default();
        config.file_type_associations.insert(
            "editor".to_string(),
            FileTypeAssociation {
                path: r"%USERPROFILE%\tools\editor.exe".to_string(),
                ..FileTypeAssociation::default()
            },
        );

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_category_order_preserved() {
        let json = r#"{
            "scoop": {
                "packages": {
                    "zeta": [],
                    "alpha": [],
                    "middle": []
                }
            }
        }"#;
        let config: Configuration = serde_json::from_str(json).unwrap();
        let categories: Vec<&String> = config.scoop.packages.keys().collect();

        assert_eq!(categories, vec!["zeta", "alpha", "middle"]);
    }
}
