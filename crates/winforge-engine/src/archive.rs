//! Zip extraction for staged bundles and fetched payloads

use std::path::Path;

use crate::error::{EngineError, Result};

/// Extract a zip archive into a target directory, creating it when absent
pub fn extract_zip(archive: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target)?;

    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|err| EngineError::archive(format!("{}: {}", archive.display(), err)))?;

    zip.extract(target)
        .map_err(|err| EngineError::archive(format!("{}: {}", archive.display(), err)))?;

    tracing::debug!(
        archive = %archive.display(),
        target = %target.display(),
        "extracted archive"
    );

    Ok(())
}
