//! Well-known filesystem locations
//!
//! The staging directory holds pre-fetched bundles, manifests, and cache
//! archives named by convention (`<id>.zip`, `<id>.json`); logs live at
//! fixed paths so the operator always knows where to look after an
//! unattended run.

use std::path::{Path, PathBuf};

/// Resolved workstation layout for one provisioning run
#[derive(Debug, Clone)]
pub struct WorkstationPaths {
    /// User profile directory
    pub home: PathBuf,

    /// Scoop root (`<home>\scoop`)
    pub scoop_root: PathBuf,

    /// Staging directory for pre-fetched bundles and manifests
    pub staging_dir: PathBuf,

    /// Append-only install log
    pub install_log: PathBuf,

    /// Append-only error log
    pub error_log: PathBuf,

    /// Documents directory (taskbar layout file)
    pub documents_dir: PathBuf,

    /// Directory repository clones land in
    pub repositories_dir: PathBuf,
}

impl WorkstationPaths {
    /// Discover the layout from the current environment
    pub fn discover() -> Option<Self> {
        let home = dirs::home_dir()?;

        let staging_dir = std::env::var_os("LOCALAPPDATA")
            .map(|local| PathBuf::from(local).join("Temp"))
            .unwrap_or_else(std::env::temp_dir);

        let log_dir = home.join("winforge");

        Some(Self {
            scoop_root: home.join("scoop"),
            staging_dir,
            install_log: log_dir.join("install.log"),
            error_log: log_dir.join("error.log"),
            documents_dir: dirs::document_dir().unwrap_or_else(|| home.join("Documents")),
            repositories_dir: home.join("repositories"),
            home,
        })
    }

    /// A layout with everything under one root, for tests and dry runs
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            home: root.to_path_buf(),
            scoop_root: root.join("scoop"),
            staging_dir: root.join("staging"),
            install_log: root.join("winforge").join("install.log"),
            error_log: root.join("winforge").join("error.log"),
            documents_dir: root.join("Documents"),
            repositories_dir: root.join("repositories"),
        }
    }

    /// Bucket checkouts directory
    pub fn buckets_dir(&self) -> PathBuf {
        self.scoop_root.join("buckets")
    }

    /// Installed applications directory
    pub fn apps_dir(&self) -> PathBuf {
        self.scoop_root.join("apps")
    }

    /// `current` directory of an installed application
    pub fn app_current(&self, app: &str) -> PathBuf {
        self.apps_dir().join(app).join("current")
    }

    /// Package-manager download cache
    pub fn scoop_cache_dir(&self) -> PathBuf {
        self.scoop_root.join("cache")
    }

    /// Shim directory fronting installed executables
    pub fn scoop_shims_dir(&self) -> PathBuf {
        self.scoop_root.join("shims")
    }

    /// Staged archive for a bundled application
    pub fn staged_archive(&self, app_id: &str) -> PathBuf {
        self.staging_dir.join(format!("{}.zip", app_id))
    }

    /// Staged manifest for a bundled application
    pub fn staged_manifest(&self, app_id: &str) -> PathBuf {
        self.staging_dir.join(format!("{}.json", app_id))
    }

    /// Taskbar layout file consumed by the shell on next login
    pub fn start_layout_file(&self) -> PathBuf {
        self.documents_dir.join("StartLayout.xml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_layout_is_self_contained() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());

        assert!(paths.scoop_root.starts_with(temp.path()));
        assert!(paths.staging_dir.starts_with(temp.path()));
        assert!(paths.error_log.starts_with(temp.path()));
    }

    #[test]
    fn test_staged_file_naming_convention() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());

        assert!(paths
            .staged_archive("ida_pro")
            .ends_with("staging/ida_pro.zip"));
        assert!(paths
            .staged_manifest("ida_pro")
            .ends_with("staging/ida_pro.json"));
    }

    #[test]
    fn test_app_current_layout() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());

        assert_eq!(
            paths.app_current("nodejs"),
            temp.path().join("scoop/apps/nodejs/current")
        );
    }
}
