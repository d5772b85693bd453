//! Error types for cache operations.

use std::io;
use std::path::PathBuf;

use dud_common::FileStatus;

/// Errors that can occur during cache operations.
///
/// Top-level cache entry points wrap whatever went wrong in a single
/// [`CacheError::Context`] naming the operation and artifact; use
/// [`CacheError::root`] to get at the underlying kind.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing the cache or workspace.
    #[error("{}: {source}", path.display())]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// A digest was absent or malformed where one was required.
    #[error("{}", invalid_checksum_message(checksum))]
    InvalidChecksum {
        /// The offending digest (possibly empty).
        checksum: String,
    },

    /// The digest is valid but no blob exists for it in the cache.
    #[error("checksum missing from cache: {checksum:?}")]
    MissingFromCache {
        /// The digest whose blob is missing.
        checksum: String,
    },

    /// Content read back from the cache did not hash to the expected digest.
    #[error("{}: found checksum {actual:?}, expected {expected:?}", path.display())]
    DigestMismatch {
        /// The file whose contents were verified.
        path: PathBuf,
        /// The digest recorded on the artifact.
        expected: String,
        /// The digest actually computed.
        actual: String,
    },

    /// A required workspace entry does not exist.
    #[error("{}: no such file or directory", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A workspace entry exists but is of the wrong kind.
    #[error("{}: expected {expected}, found {found}", path.display())]
    WrongFileType {
        /// The offending path.
        path: PathBuf,
        /// A description of the expected kind.
        expected: &'static str,
        /// What is actually on disk.
        found: FileStatus,
    },

    /// A directory entry's name cannot be recorded in a manifest.
    #[error("{}: file name is not valid UTF-8", path.display())]
    InvalidFileName {
        /// The entry with the offending name.
        path: PathBuf,
    },

    /// A checkout destination already exists.
    #[error("{}: file exists", path.display())]
    AlreadyExists {
        /// The destination path.
        path: PathBuf,
    },

    /// A directory manifest could not be read or written.
    #[error("directory manifest {}: {reason}", path.display())]
    ManifestParse {
        /// The manifest blob path.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// The remote-copy collaborator failed.
    #[error("remote copy failed: {reason}")]
    RemoteFailure {
        /// Description of the failure.
        reason: String,
    },

    /// Work was abandoned because a sibling task failed.
    #[error("operation cancelled")]
    Cancelled,

    /// An error annotated with the operation that produced it.
    #[error("{op}: {source}")]
    Context {
        /// The operation, e.g. `"commit data/raw"`.
        op: String,
        /// The underlying error.
        source: Box<CacheError>,
    },
}

fn invalid_checksum_message(checksum: &str) -> String {
    if checksum.is_empty() {
        "no checksum".to_string()
    } else {
        format!("invalid checksum: {checksum:?}")
    }
}

impl CacheError {
    /// Returns the innermost error, skipping any [`CacheError::Context`] layers.
    pub fn root(&self) -> &CacheError {
        let mut err = self;
        while let CacheError::Context { source, .. } = err {
            err = source;
        }
        err
    }

    /// Wraps this error with the name of the operation that produced it.
    pub fn context(self, op: impl Into<String>) -> CacheError {
        CacheError::Context {
            op: op.into(),
            source: Box::new(self),
        }
    }

    /// Returns a closure that converts an [`io::Error`] on `path`.
    ///
    /// Not-found and already-exists errors map onto their dedicated variants.
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> CacheError {
        let path = path.into();
        move |source| match source.kind() {
            io::ErrorKind::NotFound => CacheError::NotFound { path },
            io::ErrorKind::AlreadyExists => CacheError::AlreadyExists { path },
            _ => CacheError::Io { path, source },
        }
    }
}
