//! Error types for winforge-core

use thiserror::Error;

/// Result type alias using winforge-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Winforge
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration shape or contents
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry data that cannot be converted to its declared type
    #[error("Registry value '{value}' is not valid {data_type} data: {data}")]
    InvalidRegistryData {
        value: String,
        data_type: String,
        data: String,
    },

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid registry data error
    pub fn invalid_registry_data(
        value: impl Into<String>,
        data_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self::InvalidRegistryData {
            value: value.into(),
            data_type: data_type.into(),
            data: data.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}
