//! Comparing workspace artifacts against the cache.

use std::fs;
use std::path::{Path, PathBuf};

use dud_common::{checksum_file, fsutil, FileStatus};

use crate::artifact::{Artifact, ArtifactStatus};
use crate::cache::LocalCache;
use crate::error::CacheError;
use crate::manifest::DirectoryManifest;

/// The result of a cheap, metadata-only look at an artifact.
#[derive(Debug)]
pub(crate) struct Probe {
    pub status: ArtifactStatus,
    pub work_path: PathBuf,
    /// Absolute blob path; `None` when the artifact has no valid digest.
    pub blob_path: Option<PathBuf>,
}

/// Classifies the workspace entry and checks the digest against the cache.
///
/// Contents are only considered matching here when the workspace entry is a
/// symlink resolving to the artifact's blob.
pub(crate) fn probe(
    cache: &LocalCache,
    workspace_dir: &Path,
    artifact: &Artifact,
) -> Result<Probe, CacheError> {
    let work_path = workspace_dir.join(&artifact.path);
    let mut status = ArtifactStatus::new(artifact.clone());

    let blob_path = match cache.blob_path(&artifact.digest) {
        Ok(path) => Some(path),
        Err(CacheError::InvalidChecksum { .. }) => None,
        Err(e) => return Err(e),
    };
    if let Some(blob) = &blob_path {
        status.has_digest = true;
        status.digest_in_cache = fsutil::exists(blob, true).map_err(CacheError::io(blob))?;
    }

    status.workspace_status = fsutil::file_status(&work_path).map_err(CacheError::io(&work_path))?;

    if let (Some(blob), true, FileStatus::Link) = (
        &blob_path,
        status.digest_in_cache,
        status.workspace_status,
    ) {
        status.contents_match = fsutil::same_file(&work_path, blob).map_err(CacheError::io(&work_path))?;
    }

    Ok(Probe {
        status,
        work_path,
        blob_path,
    })
}

pub(crate) fn status(
    cache: &LocalCache,
    workspace_dir: &Path,
    artifact: &Artifact,
    short_circuit: bool,
) -> Result<ArtifactStatus, CacheError> {
    if artifact.is_dir {
        dir_status(cache, workspace_dir, artifact, short_circuit)
    } else {
        file_status(cache, workspace_dir, artifact)
    }
}

/// File status always inspects contents when the workspace holds a regular
/// file: by rehashing for uncached artifacts, by byte comparison otherwise.
fn file_status(
    cache: &LocalCache,
    workspace_dir: &Path,
    artifact: &Artifact,
) -> Result<ArtifactStatus, CacheError> {
    let Probe {
        mut status,
        work_path,
        blob_path,
    } = probe(cache, workspace_dir, artifact)?;

    if status.workspace_status != FileStatus::RegularFile {
        return Ok(status);
    }
    if artifact.skip_cache {
        if status.has_digest {
            let digest = checksum_file(&work_path).map_err(CacheError::io(&work_path))?;
            status.contents_match = digest == artifact.digest;
        }
    } else if let (Some(blob), true) = (&blob_path, status.digest_in_cache) {
        status.contents_match =
            fsutil::same_contents(&work_path, blob).map_err(CacheError::io(&work_path))?;
    }
    Ok(status)
}

fn dir_status(
    cache: &LocalCache,
    workspace_dir: &Path,
    artifact: &Artifact,
    short_circuit: bool,
) -> Result<ArtifactStatus, CacheError> {
    let Probe {
        mut status,
        work_path,
        blob_path,
    } = probe(cache, workspace_dir, artifact)?;

    let committed = status.has_digest && status.digest_in_cache;
    if short_circuit && !committed {
        return Ok(status);
    }
    if status.workspace_status != FileStatus::Directory {
        return Ok(status);
    }

    status.contents_match = committed;
    let manifest = match (&blob_path, committed) {
        (Some(blob), true) => DirectoryManifest::load(blob)?,
        _ => DirectoryManifest::default(),
    };

    for (name, child) in &manifest.contents {
        let child_status = self::status(cache, &work_path, child, short_circuit)?;
        let matches = child_status.contents_match;
        status.children.insert(name.clone(), child_status);
        if !matches {
            status.contents_match = false;
            if short_circuit {
                return Ok(status);
            }
        }
    }

    let untracked: Vec<DirEntry> = read_dir(&work_path, artifact.disable_recursion)?
        .into_iter()
        .filter(|entry| !manifest.contents.contains_key(&entry.name))
        .collect();
    if untracked.is_empty() {
        return Ok(status);
    }
    status.contents_match = false;
    if short_circuit {
        return Ok(status);
    }
    for entry in untracked {
        let child = if entry.is_dir {
            Artifact::dir(&entry.name)
        } else {
            Artifact::file(&entry.name)
        };
        let child_status = self::status(cache, &work_path, &child, false)?;
        status.children.insert(entry.name, child_status);
    }
    Ok(status)
}

/// One entry of a workspace directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Lists `dir` without following symlinks, sorted by name.
///
/// With `exclude_dirs`, subdirectories are left out. Names that are not valid
/// UTF-8 are rejected.
pub(crate) fn read_dir(dir: &Path, exclude_dirs: bool) -> Result<Vec<DirEntry>, CacheError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(CacheError::io(dir))? {
        let entry = entry.map_err(CacheError::io(dir))?;
        let is_dir = entry
            .file_type()
            .map_err(CacheError::io(entry.path()))?
            .is_dir();
        if is_dir && exclude_dirs {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| CacheError::InvalidFileName { path: entry.path() })?;
        entries.push(DirEntry { name, is_dir });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use dud_common::CheckoutStrategy;
    use std::os::unix::fs::symlink;

    struct Fixture {
        _tmp: tempfile::TempDir,
        work: PathBuf,
        cache: LocalCache,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        fs::create_dir(&work).unwrap();
        let cache = LocalCache::new(tmp.path().join("cache")).unwrap();
        Fixture {
            _tmp: tmp,
            work,
            cache,
        }
    }

    #[test]
    fn uncommitted_file() {
        let fx = fixture();
        fs::write(fx.work.join("a.txt"), "a").unwrap();
        let status = fx
            .cache
            .status(&fx.work, &Artifact::file("a.txt"), false)
            .unwrap();
        assert_eq!(status.workspace_status, FileStatus::RegularFile);
        assert!(!status.has_digest);
        assert_eq!(status.to_string(), "not committed");
    }

    #[test]
    fn committed_link_is_up_to_date() {
        let fx = fixture();
        fs::write(fx.work.join("a.txt"), "a").unwrap();
        let mut art = Artifact::file("a.txt");
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        let status = fx.cache.status(&fx.work, &art, false).unwrap();
        assert!(status.contents_match);
        assert_eq!(status.to_string(), "up-to-date (link)");
    }

    #[test]
    fn link_to_elsewhere_is_incorrect() {
        let fx = fixture();
        fs::write(fx.work.join("a.txt"), "a").unwrap();
        let mut art = Artifact::file("a.txt");
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        fs::remove_file(fx.work.join("a.txt")).unwrap();
        fs::write(fx.work.join("other"), "a").unwrap();
        symlink(fx.work.join("other"), fx.work.join("a.txt")).unwrap();
        let status = fx.cache.status(&fx.work, &art, false).unwrap();
        assert_eq!(status.to_string(), "incorrect link");
    }

    #[test]
    fn copied_file_compares_contents() {
        let fx = fixture();
        fs::write(fx.work.join("a.txt"), "a").unwrap();
        let mut art = Artifact::file("a.txt");
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Copy)
            .unwrap();
        let status = fx.cache.status(&fx.work, &art, false).unwrap();
        assert_eq!(status.to_string(), "up-to-date");

        fs::write(fx.work.join("a.txt"), "changed").unwrap();
        let status = fx.cache.status(&fx.work, &art, false).unwrap();
        assert_eq!(status.to_string(), "modified");
    }

    #[test]
    fn skip_cache_rehashes() {
        let fx = fixture();
        fs::write(fx.work.join("in.csv"), "1,2,3").unwrap();
        let mut art = Artifact {
            skip_cache: true,
            ..Artifact::file("in.csv")
        };
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        let status = fx.cache.status(&fx.work, &art, false).unwrap();
        assert!(status.contents_match);
        assert_eq!(status.to_string(), "up-to-date (not cached)");

        fs::write(fx.work.join("in.csv"), "4,5,6").unwrap();
        let status = fx.cache.status(&fx.work, &art, false).unwrap();
        assert!(!status.contents_match);
    }

    #[test]
    fn directory_with_new_file_is_modified() {
        let fx = fixture();
        let data = fx.work.join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("a"), "a").unwrap();
        let mut art = Artifact::dir("data");
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        assert!(fx.cache.status(&fx.work, &art, false).unwrap().contents_match);

        fs::write(data.join("b"), "b").unwrap();
        let status = fx.cache.status(&fx.work, &art, false).unwrap();
        assert!(!status.contents_match);
        assert_eq!(status.to_string(), "modified");
        assert_eq!(status.children["b"].to_string(), "not committed");
        assert_eq!(status.children["a"].to_string(), "up-to-date (link)");
    }

    #[test]
    fn non_recursive_directory_ignores_subdirs() {
        let fx = fixture();
        let data = fx.work.join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("a"), "a").unwrap();
        let mut art = Artifact {
            disable_recursion: true,
            ..Artifact::dir("data")
        };
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        fs::create_dir(data.join("nested")).unwrap();
        fs::write(data.join("nested").join("x"), "x").unwrap();
        assert!(fx.cache.status(&fx.work, &art, true).unwrap().contents_match);
    }

    #[test]
    fn short_circuit_on_uncommitted_directory() {
        let fx = fixture();
        fs::create_dir(fx.work.join("data")).unwrap();
        let status = fx
            .cache
            .status(&fx.work, &Artifact::dir("data"), true)
            .unwrap();
        assert!(!status.contents_match);
        assert!(status.children.is_empty());
    }

    #[test]
    fn absent_entries() {
        let fx = fixture();
        let status = fx
            .cache
            .status(&fx.work, &Artifact::file("nope"), false)
            .unwrap();
        assert_eq!(status.to_string(), "unknown artifact");

        let art = Artifact {
            digest: "0123456789".to_string(),
            ..Artifact::file("nope")
        };
        let status = fx.cache.status(&fx.work, &art, false).unwrap();
        assert_eq!(status.to_string(), "missing from cache and workspace");
    }

    #[test]
    fn read_dir_sorts_and_filters() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b"), "").unwrap();
        fs::write(tmp.path().join("a"), "").unwrap();
        fs::create_dir(tmp.path().join("c")).unwrap();
        let all = read_dir(tmp.path(), false).unwrap();
        let names: Vec<&str> = all.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(all[2].is_dir);
        assert_eq!(read_dir(tmp.path(), true).unwrap().len(), 2);
    }

    #[test]
    fn non_utf8_names_are_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let fx = fixture();
        let data = fx.work.join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("ok.txt"), "ok").unwrap();
        let bad = data.join(OsStr::from_bytes(b"bad\xffname"));
        fs::write(&bad, "bad").unwrap();

        let err = read_dir(&data, false).unwrap_err();
        assert!(matches!(err, CacheError::InvalidFileName { ref path } if *path == bad));

        let err = fx
            .cache
            .status(&fx.work, &Artifact::dir("data"), false)
            .unwrap_err();
        assert!(matches!(err.root(), CacheError::InvalidFileName { .. }));
    }
}
