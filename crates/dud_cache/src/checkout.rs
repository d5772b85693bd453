//! Materializing cached artifacts in the workspace.

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::symlink;
use std::path::Path;

use dud_common::{checksum_copy, fsutil, CheckoutStrategy, FileStatus};
use tracing::debug;

use crate::artifact::Artifact;
use crate::cache::{create_dirs, LocalCache};
use crate::error::CacheError;
use crate::manifest::DirectoryManifest;
use crate::progress::Progress;
use crate::status::probe;

pub(crate) fn checkout(
    cache: &LocalCache,
    workspace_dir: &Path,
    artifact: &Artifact,
    strategy: CheckoutStrategy,
    progress: &Progress,
) -> Result<(), CacheError> {
    if artifact.skip_cache {
        return Ok(());
    }
    if artifact.is_dir {
        checkout_dir(cache, workspace_dir, artifact, strategy, progress)
    } else {
        checkout_file(cache, workspace_dir, artifact, strategy, progress)
    }
}

pub(crate) fn checkout_file(
    cache: &LocalCache,
    workspace_dir: &Path,
    artifact: &Artifact,
    strategy: CheckoutStrategy,
    progress: &Progress,
) -> Result<(), CacheError> {
    let probe = probe(cache, workspace_dir, artifact)?;
    let Some(blob) = probe.blob_path else {
        return Err(CacheError::InvalidChecksum {
            checksum: artifact.digest.clone(),
        });
    };
    if !probe.status.digest_in_cache {
        return Err(CacheError::MissingFromCache {
            checksum: artifact.digest.clone(),
        });
    }
    let work_path = probe.work_path;
    if let Some(parent) = work_path.parent() {
        create_dirs(parent)?;
    }

    match strategy {
        CheckoutStrategy::Copy => {
            // A correct link is replaced by a real copy of its target.
            if probe.status.contents_match {
                fs::remove_file(&work_path).map_err(CacheError::io(&work_path))?;
            }
            let dest = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&work_path)
                .map_err(CacheError::io(&work_path))?;
            let src = File::open(&blob).map_err(CacheError::io(&blob))?;
            progress.add_bytes(src.metadata().map_err(CacheError::io(&blob))?.len());
            let actual =
                checksum_copy(progress.reader(src), dest).map_err(CacheError::io(&work_path))?;
            if actual != artifact.digest {
                fs::remove_file(&work_path).map_err(CacheError::io(&work_path))?;
                return Err(CacheError::DigestMismatch {
                    path: work_path,
                    expected: artifact.digest.clone(),
                    actual,
                });
            }
        }
        CheckoutStrategy::Link => {
            if probe.status.contents_match {
                return Ok(());
            }
            let abs_work = fsutil::absolute(&work_path).map_err(CacheError::io(&work_path))?;
            let parent = abs_work.parent().unwrap_or(Path::new("/"));
            let target = fsutil::relative_path(parent, &blob);
            symlink(&target, &work_path).map_err(CacheError::io(&work_path))?;
        }
    }
    debug!(path = %work_path.display(), %strategy, "checked out file");
    Ok(())
}

fn checkout_dir(
    cache: &LocalCache,
    workspace_dir: &Path,
    artifact: &Artifact,
    strategy: CheckoutStrategy,
    progress: &Progress,
) -> Result<(), CacheError> {
    let probe = probe(cache, workspace_dir, artifact)?;
    let Some(blob) = probe.blob_path else {
        return Err(CacheError::InvalidChecksum {
            checksum: artifact.digest.clone(),
        });
    };
    if !probe.status.digest_in_cache {
        return Err(CacheError::MissingFromCache {
            checksum: artifact.digest.clone(),
        });
    }
    let work_path = probe.work_path;
    match probe.status.workspace_status {
        FileStatus::Absent | FileStatus::Directory => {}
        found => {
            return Err(CacheError::WrongFileType {
                path: work_path,
                expected: "directory",
                found,
            })
        }
    }

    let manifest = DirectoryManifest::load(&blob)?;
    create_dirs(&work_path)?;
    progress.add_files(manifest.contents.values().filter(|child| !child.is_dir).count() as u64);
    for child in manifest.contents.values() {
        checkout(cache, &work_path, child, strategy, progress)?;
        if !child.is_dir {
            progress.done_file();
        }
    }
    Ok(())
}
