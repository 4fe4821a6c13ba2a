//! Provisioning plan loading
//!
//! The plan comes from the embedded default catalog or an operator-supplied
//! JSON override validated against the same shape. Either way it is fully
//! materialized and validated before the pipeline sees it.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Configuration;

/// The embedded default catalog
const DEFAULT_CATALOG: &str = include_str!("../assets/default.json");

impl Configuration {
    /// Load the embedded default catalog
    pub fn embedded_default() -> Result<Self> {
        Self::from_json(DEFAULT_CATALOG)
    }

    /// Load a plan from a JSON file, falling back to the embedded default
    /// when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::embedded_default(),
        }
    }

    /// Load and validate a plan from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::config_not_found(path.display().to_string())
            } else {
                Error::Io(err)
            }
        })?;

        Self::from_json(&content)
    }

    /// Parse and validate a plan from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let configuration: Configuration = serde_json::from_str(content)?;
        configuration.validate()?;
        Ok(configuration)
    }
}
