//! The content-addressed cache.
//!
//! [`LocalCache`] stores every committed blob at `<dir>/<d[0:2]>/<d[2:]>`, where
//! `d` is the hex digest of its contents. Blobs are read-only (mode `0444`),
//! so a workspace symlink into the cache cannot be used to modify it. The
//! [`Cache`] trait is the seam the stage index works against, so tests can
//! substitute an in-memory double.

use std::fs::{self, DirBuilder, Permissions};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use dud_common::{fsutil, CheckoutStrategy};

use crate::artifact::{Artifact, ArtifactStatus};
use crate::error::CacheError;
use crate::progress::{stderr_is_terminal, Progress};
use crate::remote::{Rclone, RemoteCopy};
use crate::workers::{CancelToken, WorkerPool, MAX_DEDICATED_WORKERS, MAX_SHARED_WORKERS};
use crate::{checkout, commit, remote, status};

/// Mode applied to every blob written into the cache.
pub(crate) const BLOB_MODE: u32 = 0o444;

/// Mode applied to directories created in the cache or workspace.
pub(crate) const DIR_MODE: u32 = 0o755;

/// Operations on a content-addressed artifact cache.
pub trait Cache {
    /// Stores the workspace contents of `artifact` and records the new digest
    /// on it.
    ///
    /// `workspace_dir` is the directory `artifact.path` is relative to. Under
    /// [`CheckoutStrategy::Link`] the workspace copy is replaced by a link into
    /// the cache.
    fn commit(
        &self,
        workspace_dir: &Path,
        artifact: &mut Artifact,
        strategy: CheckoutStrategy,
    ) -> Result<(), CacheError>;

    /// Materializes a committed artifact in the workspace.
    fn checkout(
        &self,
        workspace_dir: &Path,
        artifact: &Artifact,
        strategy: CheckoutStrategy,
    ) -> Result<(), CacheError>;

    /// Reports how the workspace copy of `artifact` relates to the cache.
    ///
    /// With `short_circuit`, a directory scan stops at the first mismatch; only
    /// [`ArtifactStatus::contents_match`] is then meaningful.
    fn status(
        &self,
        workspace_dir: &Path,
        artifact: &Artifact,
        short_circuit: bool,
    ) -> Result<ArtifactStatus, CacheError>;

    /// Downloads any blobs reachable from `artifacts` that are missing locally.
    fn fetch(&self, remote: &str, artifacts: &[&Artifact]) -> Result<(), CacheError>;

    /// Uploads every blob reachable from `artifacts` to `remote`.
    fn push(&self, remote: &str, artifacts: &[&Artifact]) -> Result<(), CacheError>;

    /// Returns the blob location of `digest`, relative to the cache root.
    fn path_for_digest(&self, digest: &str) -> Result<PathBuf, CacheError>;
}

/// A cache rooted in a local directory.
pub struct LocalCache {
    dir: PathBuf,
    remote: Box<dyn RemoteCopy>,
    pub(crate) shared: WorkerPool,
    pub(crate) dedicated_limit: usize,
    show_progress: bool,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").field("dir", &self.dir).finish()
    }
}

impl LocalCache {
    /// Opens a cache rooted at `dir`, resolved to an absolute path.
    ///
    /// The directory itself is created lazily on first commit. Remote
    /// transfers go through `rclone` with its default configuration.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref();
        let dir = fsutil::absolute(dir).map_err(CacheError::io(dir))?;
        Ok(Self {
            dir,
            remote: Box::new(Rclone::default()),
            shared: WorkerPool::new(MAX_SHARED_WORKERS),
            dedicated_limit: MAX_DEDICATED_WORKERS,
            show_progress: stderr_is_terminal(),
        })
    }

    /// Replaces the remote-copy collaborator.
    pub fn with_remote(mut self, remote: impl RemoteCopy + 'static) -> Self {
        self.remote = Box::new(remote);
        self
    }

    /// Overrides the shared and per-directory worker limits used by commit.
    pub fn with_worker_limits(mut self, shared: usize, dedicated: usize) -> Self {
        self.shared = WorkerPool::new(shared);
        self.dedicated_limit = dedicated;
        self
    }

    /// Turns the stderr progress report on or off. It defaults to on when
    /// stderr is a terminal.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Starts a progress report for one operation.
    pub(crate) fn progress(&self, prefix: impl Into<String>) -> Progress {
        Progress::new(prefix, self.show_progress)
    }

    /// The absolute cache root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the absolute blob path for `digest`.
    pub(crate) fn blob_path(&self, digest: &str) -> Result<PathBuf, CacheError> {
        Ok(self.dir.join(digest_path(digest)?))
    }

    /// Creates the cache root if it does not exist yet.
    pub(crate) fn ensure_dir(&self) -> Result<(), CacheError> {
        create_dirs(&self.dir)
    }
}

/// Splits a digest into its `<d[0:2]>/<d[2:]>` blob location.
///
/// Any digest of three or more characters is accepted; shorter (including
/// empty) digests are rejected as [`CacheError::InvalidChecksum`].
pub fn digest_path(digest: &str) -> Result<PathBuf, CacheError> {
    if digest.len() < 3 || !digest.is_char_boundary(2) {
        return Err(CacheError::InvalidChecksum {
            checksum: digest.to_string(),
        });
    }
    let (prefix, rest) = digest.split_at(2);
    Ok(Path::new(prefix).join(rest))
}

/// Creates `dir` and its parents with the standard directory mode.
pub(crate) fn create_dirs(dir: &Path) -> Result<(), CacheError> {
    DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(dir)
        .map_err(CacheError::io(dir))
}

/// Marks a freshly written blob read-only.
pub(crate) fn seal_blob(path: &Path) -> Result<(), CacheError> {
    fs::set_permissions(path, Permissions::from_mode(BLOB_MODE)).map_err(CacheError::io(path))
}

impl Cache for LocalCache {
    fn commit(
        &self,
        workspace_dir: &Path,
        artifact: &mut Artifact,
        strategy: CheckoutStrategy,
    ) -> Result<(), CacheError> {
        let op = format!("commit {}", artifact.path);
        let progress = self.progress(&op);
        let result = if artifact.is_dir {
            let cancel = CancelToken::new();
            commit::commit_dir(self, workspace_dir, artifact, strategy, &cancel, &progress)
        } else {
            progress.add_files(1);
            commit::commit_file(self, workspace_dir, artifact, strategy, &progress)
                .map(|()| progress.done_file())
        };
        progress.finish();
        result.map_err(|e| e.context(op))
    }

    fn checkout(
        &self,
        workspace_dir: &Path,
        artifact: &Artifact,
        strategy: CheckoutStrategy,
    ) -> Result<(), CacheError> {
        let op = format!("checkout {}", artifact.path);
        let progress = self.progress(&op);
        if !artifact.is_dir {
            progress.add_files(1);
        }
        let result = checkout::checkout(self, workspace_dir, artifact, strategy, &progress);
        if result.is_ok() && !artifact.is_dir {
            progress.done_file();
        }
        progress.finish();
        result.map_err(|e| e.context(op))
    }

    fn status(
        &self,
        workspace_dir: &Path,
        artifact: &Artifact,
        short_circuit: bool,
    ) -> Result<ArtifactStatus, CacheError> {
        status::status(self, workspace_dir, artifact, short_circuit)
            .map_err(|e| e.context(format!("status {}", artifact.path)))
    }

    fn fetch(&self, remote: &str, artifacts: &[&Artifact]) -> Result<(), CacheError> {
        remote::fetch(self, self.remote.as_ref(), remote, artifacts)
            .map_err(|e| e.context("fetch"))
    }

    fn push(&self, remote: &str, artifacts: &[&Artifact]) -> Result<(), CacheError> {
        remote::push(self, self.remote.as_ref(), remote, artifacts).map_err(|e| e.context("push"))
    }

    fn path_for_digest(&self, digest: &str) -> Result<PathBuf, CacheError> {
        digest_path(digest)
    }
}
