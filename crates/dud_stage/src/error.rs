//! Error types for stage loading and validation.

use std::path::PathBuf;

/// Errors that can occur when reading, validating or writing a stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage file could not be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        /// The stage file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The stage file is not valid stage YAML.
    #[error("{}: {reason}", path.display())]
    Parse {
        /// The stage file.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// The stage definition is structurally invalid.
    #[error("invalid stage: {reason}")]
    ValidationFailed {
        /// What is wrong, naming the offending artifact where there is one.
        reason: String,
    },

    /// The stage could not be encoded.
    #[error("failed to serialize stage: {0}")]
    Serialization(String),
}

impl StageError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        StageError::ValidationFailed {
            reason: reason.into(),
        }
    }
}
