//! Error types for project operations.

use std::path::PathBuf;

use dud_cache::CacheError;
use dud_config::ConfigError;
use dud_index::IndexError;
use dud_stage::StageError;

/// Errors that can occur while opening or operating on a project.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// No `.dud` directory was found above the starting directory.
    #[error("no project root found in {} or any parent directory", start.display())]
    NotInitialized {
        /// Where the search started.
        start: PathBuf,
    },

    /// `init` was run in a directory that already holds a project.
    #[error("project already initialized in {}", root.display())]
    AlreadyInitialized {
        /// The existing project root.
        root: PathBuf,
    },

    /// The operation needs stages but the index has none.
    #[error("index is empty; add stages with `dud stage add`")]
    EmptyIndex,

    /// `fetch`, `push` or `pull` was run without a configured remote.
    #[error("no remote configured; set `remote` in .dud/config")]
    NoRemote,

    /// A path given on the command line lies outside the project.
    #[error("{} is outside of the project root", path.display())]
    OutsideProject {
        /// The offending path.
        path: PathBuf,
    },

    /// Filesystem failure on a project file.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A cache operation failed outside of a stage traversal.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A stage file could not be loaded or written.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// A stage index operation failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl ProjectError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> ProjectError {
        let path = path.into();
        move |source| ProjectError::Io { path, source }
    }

    /// The underlying cache error, if this error came from the cache.
    pub fn cache_error(&self) -> Option<&CacheError> {
        match self {
            ProjectError::Cache(err) | ProjectError::Index(IndexError::Cache(err)) => {
                Some(err.root())
            }
            _ => None,
        }
    }
}
