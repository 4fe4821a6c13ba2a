//! Persistent error log
//!
//! Failures are never silently lost: every failed command attempt and every
//! soft step error lands here as a timestamped block, even when the caller
//! treats the failure as okay. The operator reviews this file after an
//! unattended run; it is the authoritative failure record.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Append-only error log at a fixed path
#[derive(Clone)]
pub struct ErrorLog {
    inner: Arc<Mutex<PathBuf>>,
}

impl ErrorLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(path)),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().unwrap().clone()
    }

    /// Append a timestamped block. Best-effort: a log write failure is
    /// reported through tracing but never surfaces to the caller.
    pub fn append(&self, context: &str, detail: &str) {
        let path = self.inner.lock().unwrap();

        if let Err(err) = Self::write_block(&path, context, detail) {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to append to error log"
            );
        }
    }

    fn write_block(path: &Path, context: &str, detail: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{}] {}", timestamp, context)?;

        let detail = detail.trim_end();
        if !detail.is_empty() {
            writeln!(file, "{}", detail)?;
        }
        writeln!(file)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_creates_file_and_parents() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("logs").join("error.log");
        let log = ErrorLog::new(path.clone());

        log.append("scoop install yara", "exit code 1");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("scoop install yara"));
        assert!(content.contains("exit code 1"));
    }

    #[test]
    fn test_append_accumulates_blocks() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("error.log");
        let log = ErrorLog::new(path.clone());

        log.append("first failure", "detail one");
        log.append("second failure", "detail two");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("first failure"));
        assert!(content.contains("second failure"));
        let first = content.find("first failure").unwrap();
        let second = content.find("second failure").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_clones_share_the_same_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("error.log");
        let log = ErrorLog::new(path.clone());
        let clone = log.clone();

        log.append("from original", "");
        clone.append("from clone", "");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("from original"));
        assert!(content.contains("from clone"));
    }
}
