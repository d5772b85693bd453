//! Storing workspace artifacts in the cache.
//!
//! Directory commits fan out over a worker tree: every directory level gets
//! its own dedicated worker and competes for slots in the cache-wide shared
//! pool. The first failure anywhere cancels the whole commit.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::thread;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use dud_common::{checksum_copy, checksum_file, fsutil, CheckoutStrategy, FileStatus};
use tracing::debug;

use crate::artifact::Artifact;
use crate::cache::{create_dirs, seal_blob, LocalCache};
use crate::checkout;
use crate::error::CacheError;
use crate::manifest::DirectoryManifest;
use crate::progress::Progress;
use crate::status::{probe, read_dir, DirEntry};
use crate::workers::{CancelToken, TaskGroup, WorkerPool};

pub(crate) fn commit_file(
    cache: &LocalCache,
    workspace_dir: &Path,
    artifact: &mut Artifact,
    strategy: CheckoutStrategy,
    progress: &Progress,
) -> Result<(), CacheError> {
    let probe = probe(cache, workspace_dir, artifact)?;
    let work_path = probe.work_path;
    match probe.status.workspace_status {
        FileStatus::Absent => return Err(CacheError::NotFound { path: work_path }),
        _ if probe.status.contents_match => return Ok(()),
        FileStatus::RegularFile => {}
        found => {
            return Err(CacheError::WrongFileType {
                path: work_path,
                expected: "regular file",
                found,
            })
        }
    }

    if artifact.skip_cache {
        artifact.digest = checksum_file(&work_path).map_err(CacheError::io(&work_path))?;
        return Ok(());
    }

    cache.ensure_dir()?;
    let file = File::open(&work_path).map_err(CacheError::io(&work_path))?;
    let size = file.metadata().map_err(CacheError::io(&work_path))?.len();
    progress.add_bytes(size);
    let can_move = strategy == CheckoutStrategy::Link
        && fsutil::same_filesystem(&work_path, cache.dir()).map_err(CacheError::io(&work_path))?;
    if can_move {
        let digest =
            checksum_copy(progress.reader(file), io::sink()).map_err(CacheError::io(&work_path))?;
        move_into_cache(cache, &work_path, &digest)?;
        artifact.digest = digest;
    } else {
        artifact.digest = copy_into_cache(cache, progress.reader(file))?;
        if strategy == CheckoutStrategy::Link {
            fs::remove_file(&work_path).map_err(CacheError::io(&work_path))?;
        }
    }
    debug!(path = %work_path.display(), digest = %artifact.digest, "committed file");

    if strategy == CheckoutStrategy::Link {
        checkout::checkout_file(cache, workspace_dir, artifact, strategy, progress)?;
    }
    Ok(())
}

/// Renames a workspace file onto its blob location.
fn move_into_cache(cache: &LocalCache, work_path: &Path, digest: &str) -> Result<(), CacheError> {
    let blob = cache.blob_path(digest)?;
    if let Some(parent) = blob.parent() {
        create_dirs(parent)?;
    }
    fs::rename(work_path, &blob).map_err(CacheError::io(work_path))?;
    seal_blob(&blob)
}

/// Streams `reader` into the cache, returning the digest of its bytes.
///
/// The bytes land in a temporary file inside the cache directory first, so a
/// partially written blob is never visible under a digest name.
pub(crate) fn copy_into_cache<R: Read>(cache: &LocalCache, reader: R) -> Result<String, CacheError> {
    cache.ensure_dir()?;
    let mut temp =
        tempfile::NamedTempFile::new_in(cache.dir()).map_err(CacheError::io(cache.dir()))?;
    let digest = checksum_copy(reader, temp.as_file_mut()).map_err(CacheError::io(temp.path()))?;
    let blob = cache.blob_path(&digest)?;
    if let Some(parent) = blob.parent() {
        create_dirs(parent)?;
    }
    temp.persist(&blob)
        .map_err(|e| CacheError::io(&blob)(e.error))?;
    seal_blob(&blob)?;
    Ok(digest)
}

pub(crate) fn commit_dir(
    cache: &LocalCache,
    workspace_dir: &Path,
    artifact: &mut Artifact,
    strategy: CheckoutStrategy,
    cancel: &CancelToken,
    progress: &Progress,
) -> Result<(), CacheError> {
    let probe = probe(cache, workspace_dir, artifact)?;
    let base_dir = probe.work_path;
    match probe.status.workspace_status {
        FileStatus::Directory => {}
        FileStatus::Absent => return Err(CacheError::NotFound { path: base_dir }),
        found => {
            return Err(CacheError::WrongFileType {
                path: base_dir,
                expected: "directory",
                found,
            })
        }
    }

    let previous = match (&probe.blob_path, probe.status.digest_in_cache) {
        (Some(blob), true) => DirectoryManifest::load(blob)?,
        _ => DirectoryManifest::default(),
    };
    let entries = read_dir(&base_dir, artifact.disable_recursion)?;
    let total = entries.len();
    progress.add_files(entries.iter().filter(|entry| !entry.is_dir).count() as u64);

    let (entry_tx, entry_rx) = unbounded();
    for entry in entries {
        // The receiver is alive until the end of this function.
        let _ = entry_tx.send(entry);
    }
    drop(entry_tx);

    let (child_tx, child_rx) = bounded::<Artifact>(0);
    let (ready_tx, ready_rx) = bounded::<()>(0);
    let dedicated = WorkerPool::new(cache.dedicated_limit);
    let group = TaskGroup::new(cancel.clone());
    let dir_path = artifact.path.clone();

    let worker = DirWorker {
        cache,
        base_dir: &base_dir,
        previous: &previous,
        strategy,
        entries: &entry_rx,
        children: &child_tx,
        cancel,
        progress,
    };

    let collected = thread::scope(|scope| {
        let collector = scope.spawn(move || {
            let mut manifest = DirectoryManifest::new(dir_path);
            for _ in 0..total {
                select! {
                    recv(child_rx) -> child => match child {
                        Ok(child) => {
                            manifest.contents.insert(child.path.clone(), child);
                        }
                        Err(_) => return None,
                    },
                    recv(cancel.signal()) -> _ => return None,
                }
            }
            drop(ready_tx);
            Some(manifest)
        });

        let worker = &worker;
        let group = &group;
        for _ in 0..total {
            let permit = select! {
                send(cache.shared.slots(), ()) -> sent => match sent {
                    Ok(()) => cache.shared.permit(),
                    Err(_) => break,
                },
                send(dedicated.slots(), ()) -> sent => match sent {
                    Ok(()) => dedicated.permit(),
                    Err(_) => break,
                },
                recv(ready_rx) -> _ => break,
                recv(cancel.signal()) -> _ => break,
            };
            scope.spawn(move || {
                let _permit = permit;
                if let Err(e) = worker.run() {
                    group.fail(e);
                }
            });
        }
        collector.join().unwrap_or(None)
    });
    drop(child_tx);

    group.finish()?;
    let manifest = collected.ok_or(CacheError::Cancelled)?;
    let manifest_path = manifest.path.clone();
    artifact.digest = copy_into_cache(cache, &manifest.to_canonical_bytes()?[..])?;
    debug!(
        path = %manifest_path,
        entries = manifest.contents.len(),
        digest = %artifact.digest,
        "committed directory"
    );
    Ok(())
}

/// Shared state for the workers committing one directory level.
struct DirWorker<'a> {
    cache: &'a LocalCache,
    base_dir: &'a Path,
    previous: &'a DirectoryManifest,
    strategy: CheckoutStrategy,
    entries: &'a Receiver<DirEntry>,
    children: &'a Sender<Artifact>,
    cancel: &'a CancelToken,
    progress: &'a Progress,
}

impl DirWorker<'_> {
    /// Commits entries until the queue drains or the commit is cancelled.
    fn run(&self) -> Result<(), CacheError> {
        loop {
            let entry = select! {
                recv(self.entries) -> entry => match entry {
                    Ok(entry) => entry,
                    Err(_) => return Ok(()),
                },
                recv(self.cancel.signal()) -> _ => return Err(CacheError::Cancelled),
            };

            let mut child = match self.previous.contents.get(&entry.name) {
                Some(prev) if prev.is_dir == entry.is_dir => prev.clone(),
                _ => Artifact::default(),
            };
            child.path = entry.name;
            child.is_dir = entry.is_dir;
            if child.is_dir {
                commit_dir(
                    self.cache,
                    self.base_dir,
                    &mut child,
                    self.strategy,
                    self.cancel,
                    self.progress,
                )?;
            } else {
                commit_file(self.cache, self.base_dir, &mut child, self.strategy, self.progress)?;
                self.progress.done_file();
            }

            select! {
                send(self.children, child) -> sent => if sent.is_err() {
                    return Err(CacheError::Cancelled);
                },
                recv(self.cancel.signal()) -> _ => return Err(CacheError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

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

    fn mode(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn commit_file_with_link_strategy() {
        let fx = fixture();
        let work_file = fx.work.join("foo.bin");
        fs::write(&work_file, "foo contents").unwrap();
        let expected = dud_common::checksum_bytes(b"foo contents");

        let mut art = Artifact::file("foo.bin");
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();

        assert_eq!(art.digest, expected);
        let blob = fx.cache.blob_path(&expected).unwrap();
        assert_eq!(fs::read(&blob).unwrap(), b"foo contents");
        assert_eq!(mode(&blob), 0o444);
        assert_eq!(
            fsutil::file_status(&work_file).unwrap(),
            FileStatus::Link
        );
        assert!(fsutil::same_file(&work_file, &blob).unwrap());
        // Links are relative so the project can be moved as a whole.
        assert!(fs::read_link(&work_file).unwrap().is_relative());
    }

    #[test]
    fn commit_file_with_copy_strategy_leaves_workspace() {
        let fx = fixture();
        let work_file = fx.work.join("foo.bin");
        fs::write(&work_file, "foo contents").unwrap();

        let mut art = Artifact::file("foo.bin");
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Copy)
            .unwrap();

        assert_eq!(
            fsutil::file_status(&work_file).unwrap(),
            FileStatus::RegularFile
        );
        let blob = fx.cache.blob_path(&art.digest).unwrap();
        assert!(fsutil::same_contents(&work_file, &blob).unwrap());
    }

    #[test]
    fn commit_twice_is_idempotent() {
        let fx = fixture();
        fs::write(fx.work.join("foo.bin"), "foo").unwrap();
        let mut art = Artifact::file("foo.bin");
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        let first = art.clone();
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        assert_eq!(art, first);
    }

    #[test]
    fn skip_cache_only_records_digest() {
        let fx = fixture();
        fs::write(fx.work.join("in.csv"), "a,b").unwrap();
        let mut art = Artifact {
            skip_cache: true,
            ..Artifact::file("in.csv")
        };
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        assert_eq!(art.digest, dud_common::checksum_bytes(b"a,b"));
        assert!(!fx.cache.blob_path(&art.digest).unwrap().exists());
        assert_eq!(
            fsutil::file_status(&fx.work.join("in.csv")).unwrap(),
            FileStatus::RegularFile
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let fx = fixture();
        let mut art = Artifact::file("nope");
        let err = fx
            .cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap_err();
        assert!(matches!(err.root(), CacheError::NotFound { .. }));
        assert!(err.to_string().starts_with("commit nope: "));
    }

    #[test]
    fn directory_in_place_of_file_is_wrong_type() {
        let fx = fixture();
        fs::create_dir(fx.work.join("foo")).unwrap();
        let mut art = Artifact::file("foo");
        let err = fx
            .cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap_err();
        assert!(matches!(err.root(), CacheError::WrongFileType { .. }));
    }

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("sub").join("deeper")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("sub").join("c.txt"), "c").unwrap();
        fs::write(root.join("sub").join("deeper").join("d.txt"), "d").unwrap();
    }

    #[test]
    fn commit_directory_tree() {
        let fx = fixture();
        build_tree(&fx.work.join("data"));
        let mut art = Artifact::dir("data");
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();

        let manifest = DirectoryManifest::load(&fx.cache.blob_path(&art.digest).unwrap()).unwrap();
        assert_eq!(manifest.path, "data");
        let names: Vec<&str> = manifest.contents.keys().map(String::as_str).collect();
        assert_eq!(names, ["a.txt", "b.txt", "sub"]);
        assert!(manifest.contents["sub"].is_dir);
        assert_eq!(
            manifest.contents["a.txt"].digest,
            dud_common::checksum_bytes(b"a")
        );
        assert_eq!(
            fsutil::file_status(&fx.work.join("data").join("sub").join("c.txt")).unwrap(),
            FileStatus::Link
        );
        assert!(fx.cache.status(&fx.work, &art, false).unwrap().contents_match);
    }

    #[test]
    fn directory_digest_is_deterministic() {
        let first = fixture();
        build_tree(&first.work.join("data"));
        let mut a = Artifact::dir("data");
        first
            .cache
            .commit(&first.work, &mut a, CheckoutStrategy::Copy)
            .unwrap();

        let second = fixture();
        let cache = LocalCache::new(second.cache.dir())
            .unwrap()
            .with_worker_limits(1, 1);
        build_tree(&second.work.join("data"));
        let mut b = Artifact::dir("data");
        cache
            .commit(&second.work, &mut b, CheckoutStrategy::Copy)
            .unwrap();

        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn non_recursive_directory_skips_subdirs() {
        let fx = fixture();
        build_tree(&fx.work.join("data"));
        let mut art = Artifact {
            disable_recursion: true,
            ..Artifact::dir("data")
        };
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        let manifest = DirectoryManifest::load(&fx.cache.blob_path(&art.digest).unwrap()).unwrap();
        assert!(!manifest.contents.contains_key("sub"));
        assert_eq!(
            fsutil::file_status(&fx.work.join("data").join("sub").join("c.txt")).unwrap(),
            FileStatus::RegularFile
        );
    }

    #[test]
    fn empty_directory_commits() {
        let fx = fixture();
        fs::create_dir(fx.work.join("empty")).unwrap();
        let mut art = Artifact::dir("empty");
        fx.cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Link)
            .unwrap();
        assert!(art.has_digest());
    }

    #[test]
    fn failure_in_tree_cancels_commit() {
        let fx = fixture();
        let cache = LocalCache::new(fx.cache.dir())
            .unwrap()
            .with_worker_limits(2, 1);
        let data = fx.work.join("data");
        build_tree(&data);
        for i in 0..20 {
            fs::write(data.join(format!("f{i:02}")), format!("{i}")).unwrap();
        }
        // A dangling link cannot be committed as a regular file.
        std::os::unix::fs::symlink(data.join("nowhere"), data.join("sub").join("bad")).unwrap();

        let mut art = Artifact::dir("data");
        let err = cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Copy)
            .unwrap_err();
        assert!(matches!(err.root(), CacheError::WrongFileType { .. }), "{err}");
        assert!(!art.has_digest());
    }

    #[test]
    fn wide_tree_with_small_pools() {
        let fx = fixture();
        let cache = LocalCache::new(fx.cache.dir())
            .unwrap()
            .with_worker_limits(2, 1);
        let data = fx.work.join("data");
        for d in 0..30 {
            let sub = data.join(format!("d{d:02}"));
            fs::create_dir_all(&sub).unwrap();
            for f in 0..30 {
                fs::write(sub.join(format!("f{f:02}")), format!("{d}/{f}")).unwrap();
            }
        }

        let mut art = Artifact::dir("data");
        cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Copy)
            .unwrap();
        let status = cache.status(&fx.work, &art, false).unwrap();
        assert!(status.contents_match);
        assert_eq!(status.children.len(), 30);
    }

    #[test]
    fn non_utf8_name_fails_commit() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let fx = fixture();
        let data = fx.work.join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("ok.txt"), "ok").unwrap();
        fs::write(data.join(OsStr::from_bytes(b"bad\xffname")), "bad").unwrap();

        let mut art = Artifact::dir("data");
        let err = fx
            .cache
            .commit(&fx.work, &mut art, CheckoutStrategy::Copy)
            .unwrap_err();
        assert!(matches!(err.root(), CacheError::InvalidFileName { .. }), "{err}");
        assert!(!art.has_digest());
    }

    #[test]
    fn directory_commit_reports_progress() {
        let fx = fixture();
        let data = fx.work.join("data");
        fs::create_dir_all(data.join("sub")).unwrap();
        fs::write(data.join("a.txt"), "aaaa").unwrap();
        fs::write(data.join("sub").join("b.txt"), "bb").unwrap();

        let progress = Progress::hidden();
        let mut art = Artifact::dir("data");
        commit_dir(
            &fx.cache,
            &fx.work,
            &mut art,
            CheckoutStrategy::Copy,
            &CancelToken::new(),
            &progress,
        )
        .unwrap();
        assert_eq!(progress.files_total(), 2);
        assert_eq!(progress.files_done(), 2);
        assert_eq!(progress.bytes_done(), 6);
    }
}
