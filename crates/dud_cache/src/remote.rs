//! Synchronizing cache blobs with a remote.
//!
//! The transfer itself is delegated to a [`RemoteCopy`] collaborator that copies
//! a named set of blob paths between two cache roots. The default is `rclone`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use dud_common::fsutil;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::cache::{digest_path, LocalCache, BLOB_MODE};
use crate::error::CacheError;
use crate::manifest::DirectoryManifest;
use crate::progress::Progress;

/// Copies a set of files between two storage locations.
pub trait RemoteCopy: Send + Sync {
    /// Copies each path in `files` (relative to both roots) from `src` to
    /// `dst`.
    fn copy(&self, src: &str, dst: &str, files: &BTreeSet<String>) -> Result<(), CacheError>;
}

/// Transfers blobs by shelling out to `rclone`.
#[derive(Clone, Debug)]
pub struct Rclone {
    config: PathBuf,
}

impl Rclone {
    /// Uses the rclone configuration file at `config`.
    pub fn new(config: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
        }
    }
}

impl Default for Rclone {
    fn default() -> Self {
        Self::new(".dud/rclone.conf")
    }
}

impl RemoteCopy for Rclone {
    fn copy(&self, src: &str, dst: &str, files: &BTreeSet<String>) -> Result<(), CacheError> {
        let failure = |e: io::Error| CacheError::RemoteFailure {
            reason: format!("rclone: {e}"),
        };
        let mut child = Command::new("rclone")
            .arg("--config")
            .arg(&self.config)
            .args(["--progress", "--immutable", "--size-only", "copy", "--files-from", "-"])
            .arg(src)
            .arg(dst)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(failure)?;
        if let Some(mut stdin) = child.stdin.take() {
            for file in files {
                writeln!(stdin, "{file}").map_err(failure)?;
            }
        }
        let status = child.wait().map_err(failure)?;
        if !status.success() {
            return Err(CacheError::RemoteFailure {
                reason: format!("rclone exited with {status}"),
            });
        }
        Ok(())
    }
}

/// Marks each of `files` under `root` as a read-only blob.
///
/// Missing files are skipped, since `root` may not be a local path at all.
fn seal_all(
    root: &Path,
    files: &BTreeSet<String>,
    progress: &Progress,
) -> Result<(), CacheError> {
    progress.add_files(files.len() as u64);
    files.par_iter().try_for_each(|file| {
        let path = root.join(file);
        if let Err(e) = fs::set_permissions(&path, Permissions::from_mode(BLOB_MODE)) {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(CacheError::io(path)(e));
            }
        }
        progress.done_file();
        Ok(())
    })
}

pub(crate) fn fetch(
    cache: &LocalCache,
    copier: &dyn RemoteCopy,
    remote: &str,
    artifacts: &[&Artifact],
) -> Result<(), CacheError> {
    let cache_root = cache.dir().to_string_lossy().into_owned();
    let mut pending: Vec<Artifact> = artifacts
        .iter()
        .filter(|art| !art.skip_cache)
        .map(|art| (*art).clone())
        .collect();

    // Each round fetches one level of directory manifests.
    while !pending.is_empty() {
        let mut missing = BTreeSet::new();
        for art in &pending {
            let rel = digest_path(&art.digest)?;
            let blob = cache.dir().join(&rel);
            if !fsutil::exists(&blob, true).map_err(CacheError::io(&blob))? {
                missing.insert(rel.to_string_lossy().into_owned());
            }
        }
        if !missing.is_empty() {
            info!(count = missing.len(), %remote, "fetching blobs");
            copier.copy(remote, &cache_root, &missing)?;
            let progress = cache.progress("fixing permissions");
            let sealed = seal_all(cache.dir(), &missing, &progress);
            progress.finish();
            sealed?;
        }

        let mut children: BTreeMap<String, Artifact> = BTreeMap::new();
        for art in pending.iter().filter(|art| art.is_dir) {
            let manifest = DirectoryManifest::load(&cache.blob_path(&art.digest)?)?;
            for child in manifest.contents.into_values() {
                if !child.skip_cache {
                    children.insert(child.digest.clone(), child);
                }
            }
        }
        pending = children.into_values().collect();
    }
    Ok(())
}

pub(crate) fn push(
    cache: &LocalCache,
    copier: &dyn RemoteCopy,
    remote: &str,
    artifacts: &[&Artifact],
) -> Result<(), CacheError> {
    let mut files = BTreeSet::new();
    let progress = cache.progress("gathering files");
    let gathered = artifacts
        .iter()
        .try_for_each(|art| collect_blobs(cache, art, &mut files, &progress));
    progress.finish();
    gathered?;
    if files.is_empty() {
        debug!("nothing to push");
        return Ok(());
    }
    info!(count = files.len(), %remote, "pushing blobs");
    let cache_root = cache.dir().to_string_lossy().into_owned();
    copier.copy(&cache_root, remote, &files)?;
    let progress = cache.progress("fixing permissions");
    let sealed = seal_all(Path::new(remote), &files, &progress);
    progress.finish();
    sealed
}

/// Adds the blob of `artifact`, and of everything under it, to `files`.
fn collect_blobs(
    cache: &LocalCache,
    artifact: &Artifact,
    files: &mut BTreeSet<String>,
    progress: &Progress,
) -> Result<(), CacheError> {
    if artifact.skip_cache {
        return Ok(());
    }
    let rel = digest_path(&artifact.digest)?;
    let blob = cache.dir().join(&rel);
    if !fsutil::exists(&blob, true).map_err(CacheError::io(&blob))? {
        return Err(CacheError::MissingFromCache {
            checksum: artifact.digest.clone(),
        });
    }
    if artifact.is_dir {
        let manifest = DirectoryManifest::load(&blob)?;
        for child in manifest.contents.values() {
            collect_blobs(cache, child, files, progress)?;
        }
    }
    if files.insert(rel.to_string_lossy().into_owned()) {
        progress.add_files(1);
        progress.done_file();
    }
    Ok(())
}
