//! Error types for configuration loading and editing.

use std::path::PathBuf;

/// Errors that can occur when loading, validating or editing a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading or writing a configuration file.
    #[error("failed to read configuration {}: {source}", path.display())]
    Io {
        /// The configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The YAML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A key that dud does not know about.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    Validation(String),
}
