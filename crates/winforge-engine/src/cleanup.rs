//! Disk and log cleanup
//!
//! Transient download and cache directories are always emptied at the end
//! of a run; the package-manager cache is kept only when the operator asked
//! for it. Deletion is content-only and best-effort: the directories
//! themselves stay in place and individual failures are ignored.

use std::path::{Path, PathBuf};

use winforge_core::utils::{normalize_blank_lines, resolve_path};

use crate::error::Result;
use crate::events::ProgressSink;
use crate::paths::WorkstationPaths;

/// Windows-managed transient directories emptied during cleanup
const TRANSIENT_DIRECTORIES: &[&str] = &[
    r"C:\Windows\SoftwareDistribution\Download",
    r"C:\Windows\Temp",
    r"%LOCALAPPDATA%\Microsoft\OneDrive",
    r"C:\ProgramData\Package Cache",
];

/// Cleans up transient artifacts after (and before) a run
pub struct DiskCleaner<'a> {
    paths: &'a WorkstationPaths,
    sink: &'a dyn ProgressSink,
    keep_package_cache: bool,
}

impl<'a> DiskCleaner<'a> {
    pub fn new(
        paths: &'a WorkstationPaths,
        sink: &'a dyn ProgressSink,
        keep_package_cache: bool,
    ) -> Self {
        Self {
            paths,
            sink,
            keep_package_cache,
        }
    }

    /// Remove shims left behind by packages that are no longer installed
    ///
    /// A shim whose target executable vanished (a prior aborted run, a
    /// manually deleted app) breaks `scoop` invocations of that tool.
    pub fn remove_stale_shims(&self) -> Result<()> {
        let shims_dir = self.paths.scoop_shims_dir();
        if !shims_dir.is_dir() {
            return Ok(());
        }

        let mut removed = 0usize;

        for entry in std::fs::read_dir(&shims_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().is_none_or(|extension| extension != "shim") {
                continue;
            }

            if let Some(target) = shim_target(&path) {
                if !target.is_file() {
                    let _ = std::fs::remove_file(&path);
                    let _ = std::fs::remove_file(path.with_extension("exe"));
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            tracing::info!(count = removed, "removed stale shims");
        }

        Ok(())
    }

    /// Empty transient directories; the package cache honors the keep flag
    pub fn clean_disk(&self) -> Result<()> {
        let mut targets: Vec<PathBuf> = vec![self.paths.staging_dir.clone()];

        if !self.keep_package_cache {
            targets.push(self.paths.scoop_cache_dir());
        }

        for directory in TRANSIENT_DIRECTORIES {
            if let Some(resolved) = resolve_path(directory) {
                targets.push(resolved);
            }
        }

        for directory in targets {
            if directory.is_dir() {
                delete_contents(&directory);
            }
        }

        self.sink.success("Cleaned up disk");
        Ok(())
    }

    /// Collapse duplicated blank lines the interleaved process output left
    /// in the install log
    pub fn normalize_install_log(&self) -> Result<()> {
        let log_path = &self.paths.install_log;
        if !log_path.is_file() {
            return Ok(());
        }

        let content = std::fs::read_to_string(log_path)?;
        std::fs::write(log_path, normalize_blank_lines(&content))?;

        Ok(())
    }
}

/// Target executable recorded inside a shim file
fn shim_target(shim: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(shim).ok()?;

    content.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        if key.trim() != "path" {
            return None;
        }
        Some(PathBuf::from(value.trim().trim_matches('"')))
    })
}

/// Delete everything inside a directory, ignoring individual failures
fn delete_contents(directory: &Path) {
    let Ok(entries) = std::fs::read_dir(directory) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };

        if let Err(err) = result {
            tracing::debug!(path = %path.display(), error = %err, "could not delete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;

    #[test]
    fn test_clean_disk_empties_staging_but_keeps_directory() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());

        std::fs::create_dir_all(&paths.staging_dir).unwrap();
        std::fs::write(paths.staging_dir.join("bundle.zip"), "x").unwrap();
        std::fs::create_dir_all(paths.staging_dir.join("nested")).unwrap();

        let cleaner = DiskCleaner::new(&paths, &NullSink, false);
        cleaner.clean_disk().unwrap();

        assert!(paths.staging_dir.is_dir());
        assert_eq!(std::fs::read_dir(&paths.staging_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_keep_package_cache_flag() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());

        std::fs::create_dir_all(paths.scoop_cache_dir()).unwrap();
        std::fs::write(paths.scoop_cache_dir().join("tool.7z"), "cached").unwrap();

        DiskCleaner::new(&paths, &NullSink, true).clean_disk().unwrap();
        assert!(paths.scoop_cache_dir().join("tool.7z").is_file());

        DiskCleaner::new(&paths, &NullSink, false).clean_disk().unwrap();
        assert!(!paths.scoop_cache_dir().join("tool.7z").exists());
    }

    #[test]
    fn test_stale_shim_removed_live_shim_kept() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());
        let shims = paths.scoop_shims_dir();
        std::fs::create_dir_all(&shims).unwrap();

        // Live shim: target exists.
        let live_target = temp.path().join("live.exe");
        std::fs::write(&live_target, "").unwrap();
        std::fs::write(
            shims.join("live.shim"),
            format!("path = \"{}\"\n", live_target.display()),
        )
        .unwrap();

        // Stale shim: target is gone.
        std::fs::write(
            shims.join("stale.shim"),
            format!("path = \"{}\"\n", temp.path().join("gone.exe").display()),
        )
        .unwrap();
        std::fs::write(shims.join("stale.exe"), "").unwrap();

        DiskCleaner::new(&paths, &NullSink, false)
            .remove_stale_shims()
            .unwrap();

        assert!(shims.join("live.shim").is_file());
        assert!(!shims.join("stale.shim").exists());
        assert!(!shims.join("stale.exe").exists());
    }

    #[test]
    fn test_normalize_install_log() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());

        std::fs::create_dir_all(paths.install_log.parent().unwrap()).unwrap();
        std::fs::write(&paths.install_log, "a\n\n\n\nb\n").unwrap();

        DiskCleaner::new(&paths, &NullSink, false)
            .normalize_install_log()
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&paths.install_log).unwrap(),
            "a\n\nb\n"
        );
    }

    #[test]
    fn test_shim_target_parsing() {
        let temp = tempfile::tempdir().unwrap();
        let shim = temp.path().join("tool.shim");
        std::fs::write(&shim, "path = \"C:\\scoop\\apps\\tool\\tool.exe\"\nargs = -q\n").unwrap();

        assert_eq!(
            shim_target(&shim),
            Some(PathBuf::from(r"C:\scoop\apps\tool\tool.exe"))
        );
    }
}
