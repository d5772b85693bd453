//! Error types for index operations.

use std::path::PathBuf;

use dud_cache::CacheError;
use dud_stage::StageError;

/// Errors that can occur while maintaining or traversing the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The stage path is not tracked by the index.
    #[error("unknown stage {stage:?}")]
    UnknownStage {
        /// The requested stage path.
        stage: String,
    },

    /// The stage path is already tracked.
    #[error("stage {stage} already in index")]
    AlreadyPresent {
        /// The stage path being added.
        stage: String,
    },

    /// An output of the stage being added is already owned by another stage.
    #[error("{stage}: artifact {artifact} already owned by {owner}")]
    ArtifactOwned {
        /// The stage path being added.
        stage: String,
        /// The contested artifact path.
        artifact: String,
        /// The stage that already owns it.
        owner: String,
    },

    /// The traversal reached a stage that is still in progress.
    #[error("cycle detected at stage {stage}")]
    CycleDetected {
        /// The stage that closed the cycle.
        stage: String,
    },

    /// A stage command could not be started or exited unsuccessfully.
    #[error("stage {stage}: command failed: {reason}")]
    CommandFailed {
        /// The stage whose command failed.
        stage: String,
        /// Exit status or spawn error.
        reason: String,
    },

    /// The index file could not be read or written.
    #[error("index {}: {source}", path.display())]
    Io {
        /// The index file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A stage could not be loaded or checksummed.
    #[error(transparent)]
    Stage(#[from] StageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_stage() {
        let err = IndexError::UnknownStage {
            stage: "train.yaml".to_string(),
        };
        assert_eq!(err.to_string(), "unknown stage \"train.yaml\"");
    }

    #[test]
    fn display_artifact_owned() {
        let err = IndexError::ArtifactOwned {
            stage: "b.yaml".to_string(),
            artifact: "out.bin".to_string(),
            owner: "a.yaml".to_string(),
        };
        assert_eq!(err.to_string(), "b.yaml: artifact out.bin already owned by a.yaml");
    }

    #[test]
    fn cache_errors_pass_through() {
        let err = IndexError::from(CacheError::Cancelled);
        assert_eq!(err.to_string(), "operation cancelled");
    }
}
